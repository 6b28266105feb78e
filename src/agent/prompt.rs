//! System prompt assembly.

use crate::data::{LocalTables, RemoteLayers};

/// Build the system prompt from the configured data sources.
///
/// The tool declarations themselves travel separately as function schemas;
/// the prompt gives the reasoning backend the data-source overview and the
/// ground rules for using them.
pub fn build_system_prompt(remote: &RemoteLayers, tables: &LocalTables) -> String {
    let mut prompt = String::from(
        "You are a geospatial data analyst. You answer questions using the data \
         sources below, queried through the available tools.\n\nData sources:\n",
    );

    for id in remote.layer_ids() {
        prompt.push_str(&format!(
            "- Remote feature layer '{}' (use describe_layer to learn its fields, then query_layer)\n",
            id
        ));
    }
    for (name, fields) in tables.catalog() {
        prompt.push_str(&format!(
            "- Local table '{}' with fields: {} (use query_table)\n",
            name,
            fields.join(", ")
        ));
    }

    prompt.push_str(
        "\nWhen answering:\n\
         - Use the tool that matches the data source being asked about.\n\
         - For schema questions, call describe_layer before querying.\n\
         - Present multiple records as a concise markdown table.\n\
         - Never fabricate data. If a query returns nothing, say so and suggest alternatives.\n\
         - If a tool reports an error, adjust the arguments, try another source, \
           or explain the limitation to the user.\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn prompt_lists_configured_sources() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("events.csv");
        let mut file = std::fs::File::create(&path).expect("create csv");
        writeln!(file, "event_name,city,country").expect("write header");
        writeln!(file, "City Marathon,Berlin,Germany").expect("write row");
        drop(file);
        let tables = LocalTables::load(&[("events".to_string(), path)]).expect("load tables");

        let remote = RemoteLayers::new(
            &[("stores".to_string(), "http://127.0.0.1:9/FeatureServer/0".to_string())],
            None,
            Duration::from_secs(2),
        )
        .expect("build client");

        let prompt = build_system_prompt(&remote, &tables);
        assert!(prompt.contains("'stores'"));
        assert!(prompt.contains("'events'"));
        assert!(prompt.contains("event_name"));
        assert!(prompt.contains("Never fabricate data"));
    }
}
