//! Completion-expression DSL for phase routing.
//!
//! A small boolean language evaluated against a session's `data` bag to
//! decide whether a conversation phase is done:
//!
//! ```text
//! greet_turns >= 2 OR greeted == True
//! NOT (objection_raised == True AND objection_handled != True)
//! ```
//!
//! Operator precedence, low to high: `OR`, `AND`, `NOT`, comparison.
//! Identifiers resolve against the state map; a missing key reads as
//! `None`. The public entry point [`evaluate`] is total: malformed input
//! logs a warning and evaluates to `false`, never an error or a panic.

pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::ExprError;
pub use eval::{check, evaluate};
pub use parser::{parse, CmpOp, Expr};
pub use value::Value;
