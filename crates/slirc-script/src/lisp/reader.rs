//! S-expression reader.
//!
//! Turns a source string into a sequence of [`Value`] forms. The reader is
//! deliberately small: lists, symbols, numbers, strings with `\"` and `\\`
//! escapes, booleans, `nil`, and `'x` as sugar for `(quote x)`.

use super::eval::{LispError, Value};

/// Nesting depth allowed while reading.
const MAX_READ_DEPTH: usize = 512;

/// Parse every form in `source`.
pub fn read(source: &str) -> Result<Vec<Value>, LispError> {
    let mut reader = Reader {
        chars: source.chars().collect(),
        pos: 0,
    };
    let mut forms = Vec::new();
    loop {
        reader.skip_whitespace();
        if reader.at_end() {
            return Ok(forms);
        }
        forms.push(reader.form(0)?);
    }
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == ';' {
                // comment to end of line
                while let Some(c) = self.next() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn form(&mut self, depth: usize) -> Result<Value, LispError> {
        if depth > MAX_READ_DEPTH {
            return Err(LispError::Parse("form nested too deeply".to_string()));
        }
        self.skip_whitespace();
        match self.peek() {
            None => Err(LispError::Parse("unexpected end of input".to_string())),
            Some('(') => self.list(depth),
            Some(')') => Err(LispError::Parse("unexpected ')'".to_string())),
            Some('"') => self.string(),
            Some('\'') => {
                self.pos += 1;
                let quoted = self.form(depth + 1)?;
                Ok(Value::List(vec![Value::Sym("quote".to_string()), quoted]))
            }
            Some(_) => self.atom(),
        }
    }

    fn list(&mut self, depth: usize) -> Result<Value, LispError> {
        self.pos += 1; // consume '('
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(LispError::Parse("unterminated list".to_string())),
                Some(')') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                Some(_) => items.push(self.form(depth + 1)?),
            }
        }
    }

    fn string(&mut self) -> Result<Value, LispError> {
        self.pos += 1; // consume opening quote
        let mut text = String::new();
        loop {
            match self.next() {
                None => return Err(LispError::Parse("unterminated string".to_string())),
                Some('"') => return Ok(Value::Str(text)),
                Some('\\') => match self.next() {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some(other) => {
                        return Err(LispError::Parse(format!("unknown escape '\\{other}'")))
                    }
                    None => return Err(LispError::Parse("unterminated string".to_string())),
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn atom(&mut self) -> Result<Value, LispError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                break;
            }
            text.push(c);
            self.pos += 1;
        }
        if let Ok(n) = text.parse::<f64>() {
            return Ok(Value::Num(n));
        }
        match text.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "nil" => Ok(Value::Nil),
            _ => Ok(Value::Sym(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(source: &str) -> Value {
        let mut forms = read(source).unwrap();
        assert_eq!(forms.len(), 1, "expected a single form in {source:?}");
        forms.remove(0)
    }

    #[test]
    fn reads_atoms() {
        assert!(matches!(one("42"), Value::Num(n) if n == 42.0));
        assert!(matches!(one("-1.5"), Value::Num(n) if n == -1.5));
        assert!(matches!(one("true"), Value::Bool(true)));
        assert!(matches!(one("nil"), Value::Nil));
        assert!(matches!(one("foo"), Value::Sym(s) if s == "foo"));
    }

    #[test]
    fn reads_strings_with_escapes() {
        assert!(matches!(one(r#""a \"b\" \\c""#), Value::Str(s) if s == "a \"b\" \\c"));
    }

    #[test]
    fn reads_nested_lists() {
        let form = one("(a (b 1) \"x\")");
        let Value::List(items) = form else {
            panic!("expected list")
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[1], Value::List(inner) if inner.len() == 2));
    }

    #[test]
    fn quote_sugar_expands() {
        let form = one("'x");
        let Value::List(items) = form else {
            panic!("expected list")
        };
        assert!(matches!(&items[0], Value::Sym(s) if s == "quote"));
    }

    #[test]
    fn reads_multiple_forms_and_comments() {
        let forms = read("(a) ; comment\n(b)").unwrap();
        assert_eq!(forms.len(), 2);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(read("(a b").is_err());
        assert!(read(")").is_err());
        assert!(read("\"oops").is_err());
    }
}
