use thiserror::Error;

/// Failures while lexing or parsing a completion expression.
///
/// These never escape [`crate::evaluate`]; they surface only through
/// [`crate::check`], which catalog validation uses to report bad
/// expressions to operators before a call ever runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at byte {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("integer literal out of range: {0}")]
    IntOutOfRange(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("trailing input after expression: {0}")]
    TrailingInput(String),
}
