use serde_json::Value as Json;

/// Runtime value domain of the expression language.
///
/// Session `data` holds arbitrary JSON; values are narrowed to this enum
/// at lookup time. Arrays and objects have no operators of their own and
/// are carried as their JSON text (they compare by representation and are
/// always truthy, matching the "everything else is true" rule).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Narrow a JSON value from the state map.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    /// Boolean coercion for a bare value in expression position.
    ///
    /// False: `None`, `False`, `0`, empty string, and the strings
    /// `"false"` / `"none"` / `"0"` (case-insensitive, trimmed).
    /// Everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => {
                let t = s.trim().to_ascii_lowercase();
                !(t.is_empty() || t == "false" || t == "none" || t == "0")
            }
        }
    }

    /// Numeric coercion: integers and floats directly, strings by
    /// parsing (integer first, then float). Booleans and `None` do not
    /// coerce.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => {
                let t = s.trim();
                if let Ok(i) = t.parse::<i64>() {
                    Some(i as f64)
                } else {
                    t.parse::<f64>().ok()
                }
            }
            _ => None,
        }
    }

    /// Exact integer view: integers directly, strings by integer parse.
    /// Floats do not qualify; comparisons involving them go through
    /// [`Value::as_number`], which keeps values above 2^53 from being
    /// flattened to the nearest representable f64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Canonical string representation used for fallback equality.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}
