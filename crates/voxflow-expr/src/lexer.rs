use crate::error::ExprError;

/// A single token of the expression language.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Or,
    And,
    Not,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    LParen,
    RParen,
    True,
    False,
    None,
    Int(i64),
    Str(String),
    Ident(String),
}

impl Token {
    /// Display form used in parse-error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Or => "'OR'".to_string(),
            Token::And => "'AND'".to_string(),
            Token::Not => "'NOT'".to_string(),
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::True => "'True'".to_string(),
            Token::False => "'False'".to_string(),
            Token::None => "'None'".to_string(),
            Token::Int(i) => format!("integer {}", i),
            Token::Str(s) => format!("string {:?}", s),
            Token::Ident(name) => format!("identifier '{}'", name),
        }
    }
}

/// Tokenize an expression. Whitespace-insensitive; keywords are
/// case-sensitive (`OR`, `AND`, `NOT`, `True`, `False`, `None`), any
/// other word is an identifier.
pub fn lex(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        match ch {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch, offset: i });
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar { ch, offset: i });
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let (token, next) = lex_string(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            '-' => {
                if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                    let (token, next) = lex_int(&chars, i)?;
                    tokens.push(token);
                    i = next;
                } else {
                    return Err(ExprError::UnexpectedChar { ch, offset: i });
                }
            }
            c if c.is_ascii_digit() => {
                let (token, next) = lex_int(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let (token, next) = lex_word(&chars, i);
                tokens.push(token);
                i = next;
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, offset: i }),
        }
    }

    Ok(tokens)
}

/// Quoted string starting at `start`. A backslash escapes the quote
/// character (and a backslash); anything else after a backslash is kept
/// verbatim.
fn lex_string(chars: &[char], start: usize) -> Result<(Token, usize), ExprError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' {
            match chars.get(i + 1) {
                Some(&next) if next == quote || next == '\\' => {
                    out.push(next);
                    i += 2;
                }
                Some(&next) => {
                    out.push('\\');
                    out.push(next);
                    i += 2;
                }
                None => return Err(ExprError::UnterminatedString),
            }
        } else if ch == quote {
            return Ok((Token::Str(out), i + 1));
        } else {
            out.push(ch);
            i += 1;
        }
    }

    Err(ExprError::UnterminatedString)
}

fn lex_int(chars: &[char], start: usize) -> Result<(Token, usize), ExprError> {
    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let text: String = chars[start..i].iter().collect();
    let value = text
        .parse::<i64>()
        .map_err(|_| ExprError::IntOutOfRange(text))?;
    Ok((Token::Int(value), i))
}

fn lex_word(chars: &[char], start: usize) -> (Token, usize) {
    let mut i = start;
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    let word: String = chars[start..i].iter().collect();
    let token = match word.as_str() {
        "OR" => Token::Or,
        "AND" => Token::And,
        "NOT" => Token::Not,
        "True" => Token::True,
        "False" => Token::False,
        "None" => Token::None,
        _ => Token::Ident(word),
    };
    (token, i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_operators_and_keywords() {
        let tokens = lex("a == True AND NOT (b != None)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::True,
                Token::And,
                Token::Not,
                Token::LParen,
                Token::Ident("b".into()),
                Token::Ne,
                Token::None,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_lex_comparison_operators() {
        assert_eq!(
            lex(">= <= > < == !=").unwrap(),
            vec![Token::Ge, Token::Le, Token::Gt, Token::Lt, Token::Eq, Token::Ne]
        );
    }

    #[test]
    fn test_lex_integers() {
        assert_eq!(
            lex("0 42 -7").unwrap(),
            vec![Token::Int(0), Token::Int(42), Token::Int(-7)]
        );
    }

    #[test]
    fn test_lex_whitespace_insensitive() {
        assert_eq!(lex("a==1").unwrap(), lex("  a  ==  1  ").unwrap());
    }

    #[test]
    fn test_lex_double_quoted_string() {
        assert_eq!(lex(r#""hello there""#).unwrap(), vec![Token::Str("hello there".into())]);
    }

    #[test]
    fn test_lex_single_quoted_string() {
        assert_eq!(lex("'yes'").unwrap(), vec![Token::Str("yes".into())]);
    }

    #[test]
    fn test_lex_escaped_quote() {
        assert_eq!(
            lex(r#""she said \"hi\"""#).unwrap(),
            vec![Token::Str(r#"she said "hi""#.into())]
        );
        assert_eq!(lex(r"'it\'s'").unwrap(), vec![Token::Str("it's".into())]);
    }

    #[test]
    fn test_lex_quote_kind_not_escaped_inside_other() {
        assert_eq!(lex(r#""it's fine""#).unwrap(), vec![Token::Str("it's fine".into())]);
    }

    #[test]
    fn test_lex_unterminated_string() {
        assert_eq!(lex("\"open"), Err(ExprError::UnterminatedString));
        assert_eq!(lex("'open\\"), Err(ExprError::UnterminatedString));
    }

    #[test]
    fn test_lex_keywords_are_case_sensitive() {
        // Lowercase "or" is an identifier, not the operator.
        assert_eq!(
            lex("or true none").unwrap(),
            vec![
                Token::Ident("or".into()),
                Token::Ident("true".into()),
                Token::Ident("none".into()),
            ]
        );
    }

    #[test]
    fn test_lex_identifier_with_digits_and_underscores() {
        assert_eq!(
            lex("greet_turn_count2").unwrap(),
            vec![Token::Ident("greet_turn_count2".into())]
        );
    }

    #[test]
    fn test_lex_rejects_single_equals() {
        assert!(matches!(
            lex("a = 1"),
            Err(ExprError::UnexpectedChar { ch: '=', .. })
        ));
    }

    #[test]
    fn test_lex_rejects_bare_bang() {
        assert!(matches!(
            lex("!a"),
            Err(ExprError::UnexpectedChar { ch: '!', .. })
        ));
    }

    #[test]
    fn test_lex_rejects_stray_symbol() {
        assert!(matches!(
            lex("a # b"),
            Err(ExprError::UnexpectedChar { ch: '#', .. })
        ));
    }

    #[test]
    fn test_lex_rejects_lone_minus() {
        assert!(matches!(
            lex("a - b"),
            Err(ExprError::UnexpectedChar { ch: '-', .. })
        ));
    }

    #[test]
    fn test_lex_empty_input() {
        assert_eq!(lex("").unwrap(), Vec::new());
        assert_eq!(lex("   ").unwrap(), Vec::new());
    }

    #[test]
    fn test_lex_int_out_of_range() {
        assert!(matches!(
            lex("99999999999999999999"),
            Err(ExprError::IntOutOfRange(_))
        ));
    }
}
