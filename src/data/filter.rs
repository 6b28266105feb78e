//! Validation of filter expressions sent to remote layers.
//!
//! The agent supplies SQL-ish `WHERE` predicates. Before an expression goes
//! anywhere near the wire it must pass this validator, which accepts only a
//! closed grammar: comparisons between an identifier and a literal, combined
//! with `AND`/`OR`/`NOT` and parentheses. Anything else (statement
//! separators, subqueries, function calls) is rejected.
//!
//! ```text
//! expr       := term (OR term)*
//! term       := factor (AND factor)*
//! factor     := NOT factor | '(' expr ')' | comparison
//! comparison := operand op operand        op: = <> > >= < <= LIKE
//! operand    := identifier | 'string' | number
//! ```

use super::DataError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    StringLit,
    Number,
    Op(&'static str),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Like,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::StringLit => "string literal".to_string(),
            Token::Number => "number".to_string(),
            Token::Op(op) => format!("operator '{}'", op),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "'AND'".to_string(),
            Token::Or => "'OR'".to_string(),
            Token::Not => "'NOT'".to_string(),
            Token::Like => "'LIKE'".to_string(),
        }
    }
}

/// Validate a filter expression against the constrained predicate grammar.
pub fn validate(expression: &str) -> Result<(), DataError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(DataError::InvalidFilter("empty filter expression".to_string()));
    }
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(DataError::InvalidFilter(format!(
            "unexpected {} after end of expression",
            tokens[parser.pos].describe()
        )));
    }
    Ok(())
}

fn tokenize(input: &str) -> Result<Vec<Token>, DataError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op("="));
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '>')) => {
                        chars.next();
                        tokens.push(Token::Op("<>"));
                    }
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Op("<="));
                    }
                    _ => tokens.push(Token::Op("<")),
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Op(">="));
                } else {
                    tokens.push(Token::Op(">"));
                }
            }
            '\'' => {
                chars.next();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\'' {
                        // doubled quote is an escaped quote inside the literal
                        if let Some(&(_, '\'')) = chars.peek() {
                            chars.next();
                        } else {
                            closed = true;
                            break;
                        }
                    }
                }
                if !closed {
                    return Err(DataError::InvalidFilter(
                        "unterminated string literal".to_string(),
                    ));
                }
                tokens.push(Token::StringLit);
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = pos;
                let mut end = pos;
                while let Some(&(p, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == '-' {
                        end = p + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                if text.parse::<f64>().is_err() {
                    return Err(DataError::InvalidFilter(format!("malformed number: {}", text)));
                }
                tokens.push(Token::Number);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                let mut end = pos;
                while let Some(&(p, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = p + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &input[start..end];
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "LIKE" => Token::Like,
                    _ => Token::Ident(word.to_string()),
                });
            }
            other => {
                return Err(DataError::InvalidFilter(format!(
                    "unexpected character '{}' in filter",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> Result<(), DataError> {
        self.term()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            self.term()?;
        }
        Ok(())
    }

    fn term(&mut self) -> Result<(), DataError> {
        self.factor()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            self.factor()?;
        }
        Ok(())
    }

    fn factor(&mut self) -> Result<(), DataError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                self.factor()
            }
            Some(Token::LParen) => {
                self.pos += 1;
                self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(())
                    }
                    _ => Err(DataError::InvalidFilter("missing closing parenthesis".to_string())),
                }
            }
            _ => self.comparison(),
        }
    }

    fn comparison(&mut self) -> Result<(), DataError> {
        self.operand()?;
        match self.peek() {
            Some(Token::Op(_)) | Some(Token::Like) => {
                self.pos += 1;
            }
            Some(other) => {
                return Err(DataError::InvalidFilter(format!(
                    "expected comparison operator, found {}",
                    other.describe()
                )));
            }
            None => {
                return Err(DataError::InvalidFilter(
                    "expected comparison operator at end of expression".to_string(),
                ));
            }
        }
        self.operand()
    }

    fn operand(&mut self) -> Result<(), DataError> {
        match self.peek() {
            Some(Token::Ident(_)) | Some(Token::StringLit) | Some(Token::Number) => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(DataError::InvalidFilter(format!(
                "expected field or literal, found {}",
                other.describe()
            ))),
            None => Err(DataError::InvalidFilter(
                "expected field or literal at end of expression".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(expr: &str) {
        validate(expr).unwrap_or_else(|e| panic!("expected '{}' to validate: {}", expr, e));
    }

    fn assert_invalid(expr: &str) {
        assert!(
            matches!(validate(expr), Err(DataError::InvalidFilter(_))),
            "expected '{}' to be rejected",
            expr
        );
    }

    #[test]
    fn accepts_match_all() {
        assert_valid("1=1");
    }

    #[test]
    fn accepts_simple_comparisons() {
        assert_valid("country = 'France'");
        assert_valid("capacity >= 50000");
        assert_valid("region <> 'Europe'");
        assert_valid("city LIKE '%Paris%'");
    }

    #[test]
    fn accepts_boolean_composition() {
        assert_valid("country = 'France' AND sport = 'Soccer'");
        assert_valid("(lat > 40 OR lat < -40) AND NOT region = 'Test'");
        assert_valid("NOT (a = 1 OR b = 2)");
    }

    #[test]
    fn accepts_escaped_quote_in_literal() {
        assert_valid("city = 'L''Aquila'");
    }

    #[test]
    fn rejects_empty_expression() {
        assert_invalid("");
        assert_invalid("   ");
    }

    #[test]
    fn rejects_statement_separators() {
        assert_invalid("1=1; DROP TABLE stores");
    }

    #[test]
    fn rejects_unterminated_string() {
        assert_invalid("country = 'France");
    }

    #[test]
    fn rejects_dangling_operator() {
        assert_invalid("country =");
        assert_invalid("= 'France'");
        assert_invalid("country = 'France' AND");
    }

    #[test]
    fn rejects_bare_identifier() {
        assert_invalid("country");
    }

    #[test]
    fn rejects_function_call_shapes() {
        assert_invalid("LOWER(country) = 'france'");
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert_invalid("a = 1 b = 2");
    }
}
