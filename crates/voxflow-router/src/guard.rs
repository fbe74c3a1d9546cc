//! Single-flight guard for routing checks.
//!
//! At most one `check_and_route` runs per session key at a time. A second
//! check arriving mid-flight is skipped, not queued: the conversational
//! turn that triggered it has already moved on, and replaying a stale
//! check after the first one commits could double-count turns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tracks which session keys currently have a routing check in flight.
#[derive(Clone, Debug, Default)]
pub struct SingleFlight {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the key. Returns `None` if a check for the same key
    /// is already in flight. The claim is released when the returned
    /// permit is dropped.
    pub fn try_acquire(&self, key: &str) -> Option<FlightPermit> {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.contains(key) {
            return None;
        }
        in_flight.insert(key.to_string());
        Some(FlightPermit {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        })
    }

    /// Whether a check for the key is currently in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.in_flight).contains(key)
    }
}

/// RAII claim on a session key; releases on drop.
#[derive(Debug)]
pub struct FlightPermit {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

// A panic while holding the set poisons the mutex; the set itself is
// still consistent, so recover the guard rather than propagate.
fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let guard = SingleFlight::new();
        let permit = guard.try_acquire("+15550001111");
        assert!(permit.is_some());
        assert!(guard.is_in_flight("+15550001111"));

        drop(permit);
        assert!(!guard.is_in_flight("+15550001111"));
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let guard = SingleFlight::new();
        let _permit = guard.try_acquire("+15550001111");
        assert!(guard.try_acquire("+15550001111").is_none());
    }

    #[test]
    fn test_different_keys_are_independent() {
        let guard = SingleFlight::new();
        let _a = guard.try_acquire("+15550001111");
        assert!(guard.try_acquire("+15550002222").is_some());
    }

    #[test]
    fn test_reacquire_after_drop() {
        let guard = SingleFlight::new();
        drop(guard.try_acquire("+15550001111"));
        assert!(guard.try_acquire("+15550001111").is_some());
    }
}
