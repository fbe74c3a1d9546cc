use crate::error::ExprError;
use crate::lexer::{lex, Token};
use crate::value::Value;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(Box<Expr>, CmpOp, Box<Expr>),
    Literal(Value),
    Ident(String),
}

/// Explicit position over the token stream.
///
/// Passed by mutable reference through the recursive-descent functions so
/// parse state is visible in every signature.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.bump() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken(token.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

/// Parse an expression string into a tree.
///
/// Grammar (precedence low to high):
/// ```text
/// expr       := or_expr
/// or_expr    := and_expr ( "OR" and_expr )*
/// and_expr   := not_expr ( "AND" not_expr )*
/// not_expr   := "NOT" not_expr | comparison
/// comparison := value ( ("==" | "!=" | ">=" | "<=" | ">" | "<") value )?
/// value      := IDENT | "True" | "False" | "None" | INT | STRING | "(" expr ")"
/// ```
pub fn parse(expression: &str) -> Result<Expr, ExprError> {
    let tokens = lex(expression)?;
    let mut cursor = Cursor::new(&tokens);
    let expr = parse_or(&mut cursor)?;
    if let Some(extra) = cursor.peek() {
        return Err(ExprError::TrailingInput(extra.describe()));
    }
    Ok(expr)
}

fn parse_or(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    let mut lhs = parse_and(cursor)?;
    while cursor.peek() == Some(&Token::Or) {
        cursor.bump();
        let rhs = parse_and(cursor)?;
        lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    let mut lhs = parse_not(cursor)?;
    while cursor.peek() == Some(&Token::And) {
        cursor.bump();
        let rhs = parse_not(cursor)?;
        lhs = Expr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_not(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    if cursor.peek() == Some(&Token::Not) {
        cursor.bump();
        let inner = parse_not(cursor)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    parse_comparison(cursor)
}

fn parse_comparison(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    let lhs = parse_value(cursor)?;
    let op = match cursor.peek() {
        Some(Token::Eq) => CmpOp::Eq,
        Some(Token::Ne) => CmpOp::Ne,
        Some(Token::Ge) => CmpOp::Ge,
        Some(Token::Le) => CmpOp::Le,
        Some(Token::Gt) => CmpOp::Gt,
        Some(Token::Lt) => CmpOp::Lt,
        _ => return Ok(lhs),
    };
    cursor.bump();
    let rhs = parse_value(cursor)?;
    Ok(Expr::Cmp(Box::new(lhs), op, Box::new(rhs)))
}

fn parse_value(cursor: &mut Cursor<'_>) -> Result<Expr, ExprError> {
    match cursor.bump() {
        Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
        Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
        Some(Token::None) => Ok(Expr::Literal(Value::None)),
        Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(*i))),
        Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s.clone()))),
        Some(Token::Ident(name)) => Ok(Expr::Ident(name.clone())),
        Some(Token::LParen) => {
            let inner = parse_or(cursor)?;
            cursor.expect(&Token::RParen)?;
            Ok(inner)
        }
        Some(other) => Err(ExprError::UnexpectedToken(other.describe())),
        None => Err(ExprError::UnexpectedEnd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_string()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(i)))
    }

    #[test]
    fn test_parse_bare_ident() {
        assert_eq!(parse("greeted").unwrap(), Expr::Ident("greeted".into()));
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!(
            parse("turns >= 2").unwrap(),
            Expr::Cmp(ident("turns"), CmpOp::Ge, int(2))
        );
    }

    #[test]
    fn test_parse_precedence_or_over_and() {
        // A OR B AND C parses as A OR (B AND C)
        assert_eq!(
            parse("A OR B AND C").unwrap(),
            Expr::Or(
                ident("A"),
                Box::new(Expr::And(ident("B"), ident("C"))),
            )
        );
        assert_eq!(parse("A OR B AND C").unwrap(), parse("A OR (B AND C)").unwrap());
    }

    #[test]
    fn test_parse_parens_override_precedence() {
        assert_eq!(
            parse("(A OR B) AND C").unwrap(),
            Expr::And(
                Box::new(Expr::Or(ident("A"), ident("B"))),
                ident("C"),
            )
        );
    }

    #[test]
    fn test_parse_left_associative_chains() {
        assert_eq!(
            parse("A OR B OR C").unwrap(),
            Expr::Or(Box::new(Expr::Or(ident("A"), ident("B"))), ident("C"))
        );
    }

    #[test]
    fn test_parse_not_binds_tighter_than_and() {
        assert_eq!(
            parse("NOT A AND B").unwrap(),
            Expr::And(Box::new(Expr::Not(ident("A"))), ident("B"))
        );
    }

    #[test]
    fn test_parse_double_not() {
        assert_eq!(
            parse("NOT NOT A").unwrap(),
            Expr::Not(Box::new(Expr::Not(ident("A"))))
        );
    }

    #[test]
    fn test_parse_not_of_comparison() {
        assert_eq!(
            parse("NOT a == 1").unwrap(),
            Expr::Not(Box::new(Expr::Cmp(ident("a"), CmpOp::Eq, int(1))))
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("True").unwrap(), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse("None").unwrap(), Expr::Literal(Value::None));
        assert_eq!(
            parse("'ready'").unwrap(),
            Expr::Literal(Value::Str("ready".into()))
        );
    }

    #[test]
    fn test_parse_comparison_of_literals() {
        assert_eq!(
            parse("x == 'yes'").unwrap(),
            Expr::Cmp(ident("x"), CmpOp::Eq, Box::new(Expr::Literal(Value::Str("yes".into()))))
        );
    }

    #[test]
    fn test_parse_parenthesized_operand() {
        // A parenthesized expression is a value, so it may sit on either
        // side of a comparison.
        assert!(parse("(a) == 1").is_ok());
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert_eq!(parse(""), Err(ExprError::UnexpectedEnd));
    }

    #[test]
    fn test_parse_unbalanced_paren() {
        assert_eq!(parse("(a OR b"), Err(ExprError::UnexpectedEnd));
    }

    #[test]
    fn test_parse_trailing_tokens() {
        assert!(matches!(parse("a == 1 b"), Err(ExprError::TrailingInput(_))));
        assert!(matches!(parse("a )"), Err(ExprError::TrailingInput(_))));
    }

    #[test]
    fn test_parse_operator_without_operand() {
        assert_eq!(parse("a =="), Err(ExprError::UnexpectedEnd));
        assert!(matches!(parse("OR a"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(parse("a OR AND b"), Err(ExprError::UnexpectedToken(_))));
    }

    #[test]
    fn test_parse_chained_comparison_rejected() {
        // comparison takes at most one operator; a second one is trailing.
        assert!(matches!(parse("1 < x < 3"), Err(ExprError::TrailingInput(_))));
    }

    #[test]
    fn test_parse_lex_error_propagates() {
        assert!(matches!(parse("a = 1"), Err(ExprError::UnexpectedChar { .. })));
    }
}
