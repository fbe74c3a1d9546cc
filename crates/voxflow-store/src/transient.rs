//! Per-call transient keys in the session `data` bag.
//!
//! When a caller key is reused, durable state (topics, contact link,
//! qualification) carries over but anything scoped to a single call must
//! start absent, or a completion expression could fire on the first turn
//! of a new call using last call's flags.

use serde_json::{Map, Value};

/// `data` keys cleared on session reuse.
pub static TRANSIENT_KEYS: &[&str] = &[
    // Identity verification
    "identity_verified",
    "verification_attempts",
    "right_person",
    "wrong_person_reason",
    // Booking readiness
    "ready_to_book",
    "booking_offered",
    "appointment_confirmed",
    "appointment_time",
    // Objections
    "objection_raised",
    "objection_handled",
    "objection_type",
    // Greeting
    "greeted",
];

/// Suffixes marking generated per-call keys: per-phase turn and visit
/// counters, and cached auxiliary metrics.
static TRANSIENT_SUFFIXES: &[&str] = &["_turns", "_visits", "_cached"];

/// Whether a `data` key is call-scoped, given any deployment-specific
/// extras from configuration.
pub fn is_transient(key: &str, extra: &[String]) -> bool {
    TRANSIENT_KEYS.contains(&key)
        || TRANSIENT_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
        || extra.iter().any(|e| e == key)
}

/// Copy of `data` with all transient keys removed.
pub fn strip_transient(data: &Map<String, Value>, extra: &[String]) -> Map<String, Value> {
    data.iter()
        .filter(|(key, _)| !is_transient(key, extra))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_keys_are_transient() {
        assert!(is_transient("identity_verified", &[]));
        assert!(is_transient("right_person", &[]));
        assert!(is_transient("ready_to_book", &[]));
        assert!(is_transient("objection_raised", &[]));
        assert!(is_transient("appointment_confirmed", &[]));
    }

    #[test]
    fn test_counter_suffixes_are_transient() {
        assert!(is_transient("greet_turns", &[]));
        assert!(is_transient("objection_visits", &[]));
        assert!(is_transient("quote_estimate_cached", &[]));
    }

    #[test]
    fn test_durable_keys_are_not_transient() {
        assert!(!is_transient("preferred_name", &[]));
        assert!(!is_transient("property_type", &[]));
        assert!(!is_transient("turnstile", &[])); // suffix must match whole tail
    }

    #[test]
    fn test_extra_keys_from_config() {
        let extra = vec!["campaign_variant".to_string()];
        assert!(is_transient("campaign_variant", &extra));
        assert!(!is_transient("campaign_variant", &[]));
    }

    #[test]
    fn test_strip_transient() {
        let mut data = Map::new();
        data.insert("greeted".to_string(), json!(true));
        data.insert("greet_turns".to_string(), json!(3));
        data.insert("preferred_name".to_string(), json!("Alex"));
        data.insert("identity_verified".to_string(), json!(true));

        let stripped = strip_transient(&data, &[]);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped.get("preferred_name"), Some(&json!("Alex")));
    }
}
