use serde_json::{Map, Value as Json};
use tracing::warn;

use crate::error::ExprError;
use crate::parser::{parse, CmpOp, Expr};
use crate::value::Value;

/// Evaluate a completion expression against a session state map.
///
/// Total and pure: never panics, never errors. Any lex, parse, or
/// evaluation anomaly logs a warning and yields `false` — a phase whose
/// expression is broken simply never completes, which is the fail-closed
/// behavior routing relies on.
pub fn evaluate(expression: &str, state: &Map<String, Json>) -> bool {
    let trimmed = expression.trim();

    // Literal whole-expression booleans bypass the grammar.
    match trimmed {
        "True" => return true,
        "False" => return false,
        _ => {}
    }

    match parse(trimmed) {
        Ok(expr) => eval_expr(&expr, state).truthy(),
        Err(e) => {
            warn!(expression = trimmed, error = %e, "completion expression rejected");
            false
        }
    }
}

/// Parse-only validation for catalog loading. Returns the parse error so
/// operators see broken expressions before any call runs.
pub fn check(expression: &str) -> Result<(), ExprError> {
    let trimmed = expression.trim();
    if trimmed == "True" || trimmed == "False" {
        return Ok(());
    }
    parse(trimmed).map(|_| ())
}

fn eval_expr(expr: &Expr, state: &Map<String, Json>) -> Value {
    match expr {
        Expr::Or(lhs, rhs) => {
            let result =
                eval_expr(lhs, state).truthy() || eval_expr(rhs, state).truthy();
            Value::Bool(result)
        }
        Expr::And(lhs, rhs) => {
            let result =
                eval_expr(lhs, state).truthy() && eval_expr(rhs, state).truthy();
            Value::Bool(result)
        }
        Expr::Not(inner) => Value::Bool(!eval_expr(inner, state).truthy()),
        Expr::Cmp(lhs, op, rhs) => {
            let left = eval_expr(lhs, state);
            let right = eval_expr(rhs, state);
            Value::Bool(compare(&left, *op, &right))
        }
        Expr::Literal(value) => value.clone(),
        // Missing keys read as None; absence is not an error.
        Expr::Ident(name) => state
            .get(name)
            .map(Value::from_json)
            .unwrap_or(Value::None),
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    match op {
        CmpOp::Eq => values_eq(left, right),
        CmpOp::Ne => !values_eq(left, right),
        CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
            // Two integers compare exactly; going through f64 would make
            // neighbours above 2^53 indistinguishable.
            if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                return match op {
                    CmpOp::Gt => a > b,
                    CmpOp::Lt => a < b,
                    CmpOp::Ge => a >= b,
                    CmpOp::Le => a <= b,
                    _ => unreachable!(),
                };
            }
            // Ordering requires both sides to coerce numerically;
            // anything else is false, not an error.
            match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => match op {
                    CmpOp::Gt => a > b,
                    CmpOp::Lt => a < b,
                    CmpOp::Ge => a >= b,
                    CmpOp::Le => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
    }
}

/// Equality: `None` only equals `None`; otherwise numeric comparison if
/// both sides coerce, else string-representation comparison.
fn values_eq(left: &Value, right: &Value) -> bool {
    match (left.is_none(), right.is_none()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return a == b;
    }
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => left.repr() == right.repr(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(pairs: &[(&str, Json)]) -> Map<String, Json> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn empty() -> Map<String, Json> {
        Map::new()
    }

    // ---- Literal short-circuit ----

    #[test]
    fn test_literal_true_false() {
        assert!(evaluate("True", &empty()));
        assert!(!evaluate("False", &empty()));
        assert!(evaluate("  True  ", &empty()));
    }

    // ---- Identifier resolution ----

    #[test]
    fn test_missing_key_is_none() {
        assert!(!evaluate("missing", &empty()));
        assert!(evaluate("missing == None", &empty()));
        assert!(!evaluate("field == True", &empty()));
    }

    #[test]
    fn test_none_semantics() {
        let s = state(&[("x", Json::Null)]);
        assert!(evaluate("x == None", &s));
        let s = state(&[("x", json!(5))]);
        assert!(evaluate("x != None", &s));
        assert!(!evaluate("x == None", &s));
    }

    // ---- Equality coercion ----

    #[test]
    fn test_numeric_equality_across_types() {
        let s = state(&[("a", json!(5)), ("b", json!("5")), ("c", json!(5.0))]);
        assert!(evaluate("a == b", &s));
        assert!(evaluate("a == c", &s));
        assert!(evaluate("b == 5", &s));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        // Adjacent integers above 2^53 collapse to the same f64.
        let s = state(&[
            ("a", json!(9007199254740993_i64)),
            ("b", json!(9007199254740992_i64)),
        ]);
        assert!(!evaluate("a == b", &s));
        assert!(evaluate("a != b", &s));
        assert!(evaluate("a > b", &s));
        assert!(!evaluate("a <= b", &s));
        assert!(evaluate("a == 9007199254740993", &s));
    }

    #[test]
    fn test_string_fallback_equality() {
        let s = state(&[("name", json!("alex"))]);
        assert!(evaluate("name == 'alex'", &s));
        assert!(!evaluate("name == 'sam'", &s));
    }

    #[test]
    fn test_bool_equality_via_repr() {
        let s = state(&[("flag", json!(true))]);
        assert!(evaluate("flag == True", &s));
        assert!(evaluate("flag != False", &s));
    }

    // ---- Ordering ----

    #[test]
    fn test_ordering_numeric() {
        let s = state(&[("turns", json!(3))]);
        assert!(evaluate("turns >= 2", &s));
        assert!(evaluate("turns > 2", &s));
        assert!(!evaluate("turns < 3", &s));
        assert!(evaluate("turns <= 3", &s));
    }

    #[test]
    fn test_ordering_string_number_coerces() {
        let s = state(&[("turns", json!("4"))]);
        assert!(evaluate("turns >= 2", &s));
    }

    #[test]
    fn test_ordering_uncoercible_is_false() {
        let s = state(&[("name", json!("alex"))]);
        assert!(!evaluate("name > 2", &s));
        assert!(!evaluate("name <= 2", &s));
        assert!(!evaluate("missing > 0", &s));
    }

    // ---- Truthiness of bare values ----

    #[test]
    fn test_bare_value_truthiness() {
        let s = state(&[
            ("yes", json!(true)),
            ("no", json!(false)),
            ("zero", json!(0)),
            ("blank", json!("")),
            ("falsy_str", json!("False")),
            ("name", json!("alex")),
        ]);
        assert!(evaluate("yes", &s));
        assert!(!evaluate("no", &s));
        assert!(!evaluate("zero", &s));
        assert!(!evaluate("blank", &s));
        assert!(!evaluate("falsy_str", &s));
        assert!(evaluate("name", &s));
        assert!(evaluate("1", &s));
        assert!(!evaluate("0", &s));
    }

    // ---- Boolean operators and precedence ----

    #[test]
    fn test_precedence_or_and() {
        // A OR B AND C == A OR (B AND C): with A=false, B=true, C=false
        // the grouped form is false; (A OR B) AND C would also be false,
        // so use A=true, B=false, C=false where grouping matters.
        let s = state(&[("A", json!(true)), ("B", json!(false)), ("C", json!(false))]);
        assert!(evaluate("A OR B AND C", &s));
        assert_eq!(
            evaluate("A OR B AND C", &s),
            evaluate("A OR (B AND C)", &s)
        );

        let s = state(&[("A", json!(false)), ("B", json!(true)), ("C", json!(true))]);
        assert_eq!(
            evaluate("A OR B AND C", &s),
            evaluate("A OR (B AND C)", &s)
        );
    }

    #[test]
    fn test_not() {
        let s = state(&[("flag", json!(false))]);
        assert!(evaluate("NOT flag", &s));
        assert!(!evaluate("NOT NOT flag", &s));
        assert!(evaluate("NOT flag == True", &s));
    }

    #[test]
    fn test_parenthesized_grouping() {
        let s = state(&[("a", json!(true)), ("b", json!(false)), ("c", json!(false))]);
        assert!(!evaluate("(a OR b) AND c", &s));
        assert!(evaluate("a OR (b AND c)", &s));
    }

    // ---- Totality ----

    #[test]
    fn test_malformed_expressions_are_false() {
        let s = state(&[("a", json!(1))]);
        assert!(!evaluate("", &s));
        assert!(!evaluate("a ==", &s));
        assert!(!evaluate("((a)", &s));
        assert!(!evaluate("a = 1", &s));
        assert!(!evaluate("a ## b", &s));
        assert!(!evaluate("OR OR OR", &s));
    }

    #[test]
    fn test_compound_state_values_never_panic() {
        let s = state(&[("items", json!([1, 2])), ("meta", json!({"k": "v"}))]);
        assert!(evaluate("items", &s));
        assert!(evaluate("meta != None", &s));
        assert!(!evaluate("items > 0", &s));
    }

    // ---- End-to-end scenarios ----

    #[test]
    fn test_greeting_scenario() {
        let s = state(&[("greet_turn_count", json!(1)), ("greeted", json!(true))]);
        assert!(evaluate("greet_turn_count >= 2 OR greeted == True", &s));

        let s = state(&[("greet_turn_count", json!(1)), ("greeted", json!(false))]);
        assert!(!evaluate("greet_turn_count >= 2 OR greeted == True", &s));

        let s = state(&[("greet_turn_count", json!(2)), ("greeted", json!(false))]);
        assert!(evaluate("greet_turn_count >= 2 OR greeted == True", &s));
    }

    #[test]
    fn test_objection_scenario() {
        let s = state(&[
            ("objection_raised", json!(true)),
            ("objection_handled", json!(false)),
        ]);
        let expr = "NOT (objection_raised == True AND objection_handled != True)";
        assert!(!evaluate(expr, &s));

        let s = state(&[
            ("objection_raised", json!(true)),
            ("objection_handled", json!(true)),
        ]);
        assert!(evaluate(expr, &s));
    }

    // ---- check ----

    #[test]
    fn test_check_accepts_valid() {
        assert!(check("a == 1 AND NOT b").is_ok());
        assert!(check("True").is_ok());
        assert!(check("'quoted' != None").is_ok());
    }

    #[test]
    fn test_check_rejects_invalid() {
        assert!(check("").is_err());
        assert!(check("a ==").is_err());
        assert!(check("a = 1").is_err());
    }
}
