//! The replicated register.
//!
//! A single value tagged with a generation counter. All access goes through one
//! mutex so a value is never observed paired with a generation from a different
//! transition. Wrap in `Arc` for shared ownership between the HTTP handlers,
//! the broadcaster and the diagnostics schedule.

use crate::reconcile::reconcile;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A value and the generation it was written at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterState {
    /// Replicated payload
    pub value: i64,
    /// Highest generation this node has written or accepted
    pub generation: u64,
}

impl RegisterState {
    /// Initial state for a freshly started node.
    pub fn seed(value: i64) -> Self {
        Self {
            value,
            generation: 0,
        }
    }
}

/// In-memory register guarded by a single lock.
///
/// The lock is only held for the in-memory transition, never across an await
/// point.
#[derive(Debug)]
pub struct Register {
    state: Mutex<RegisterState>,
}

impl Register {
    /// Create a register holding `value` at generation 0.
    pub fn new(value: i64) -> Self {
        Self::with_state(RegisterState::seed(value))
    }

    pub fn with_state(state: RegisterState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Local write: store `value` and advance the generation by one.
    ///
    /// Returns the state after the write.
    pub fn write(&self, value: i64) -> RegisterState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.value = value;
        state.generation = state.generation.saturating_add(1);
        *state
    }

    /// Consistent snapshot of value and generation.
    pub fn read(&self) -> RegisterState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a state pushed by a peer under the same lock as local writes.
    ///
    /// Returns true if the incoming state was adopted.
    pub fn reconcile_incoming(&self, value: i64, generation: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        reconcile(&mut state, RegisterState { value, generation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // ==================== Local operations ====================

    #[test]
    fn test_new_register_starts_at_generation_zero() {
        let register = Register::new(42);
        assert_eq!(register.read(), RegisterState { value: 42, generation: 0 });
    }

    #[test]
    fn test_write_increments_generation() {
        let register = Register::new(42);

        let after = register.write(7);
        assert_eq!(after, RegisterState { value: 7, generation: 1 });
        assert_eq!(register.read(), after);

        register.write(8);
        assert_eq!(register.read(), RegisterState { value: 8, generation: 2 });
    }

    #[test]
    fn test_write_same_value_still_advances() {
        let register = Register::new(5);
        register.write(5);
        register.write(5);
        assert_eq!(register.read().generation, 2);
    }

    #[test]
    fn test_write_saturates_at_max_generation() {
        let register = Register::with_state(RegisterState {
            value: 1,
            generation: u64::MAX,
        });
        let after = register.write(2);
        assert_eq!(after.generation, u64::MAX);
        assert_eq!(after.value, 2);
    }

    // ==================== Remote updates ====================

    #[test]
    fn test_reconcile_adopts_newer_and_read_matches() {
        let register = Register::new(42);
        assert!(register.reconcile_incoming(7, 1));
        assert_eq!(register.read(), RegisterState { value: 7, generation: 1 });
    }

    #[test]
    fn test_reconcile_rejects_stale() {
        let register = Register::new(42);
        register.reconcile_incoming(7, 1);

        assert!(!register.reconcile_incoming(5, 0));
        assert_eq!(register.read(), RegisterState { value: 7, generation: 1 });
    }

    #[test]
    fn test_reconcile_twice_adopts_once() {
        let register = Register::new(0);
        assert!(register.reconcile_incoming(9, 3));
        assert!(!register.reconcile_incoming(9, 3));
        assert_eq!(register.read(), RegisterState { value: 9, generation: 3 });
    }

    #[test]
    fn test_local_write_after_remote_builds_on_remote_generation() {
        let register = Register::new(0);
        register.reconcile_incoming(3, 10);
        let after = register.write(4);
        assert_eq!(after, RegisterState { value: 4, generation: 11 });
    }

    // ==================== Monotonicity ====================

    #[test]
    fn test_generation_never_decreases() {
        let register = Register::new(0);
        let mut last = register.read().generation;

        let steps: [(Option<i64>, Option<(i64, u64)>); 8] = [
            (Some(1), None),
            (None, Some((2, 5))),
            (None, Some((3, 2))),
            (Some(4), None),
            (None, Some((5, 6))),
            (None, Some((6, 6))),
            (Some(7), None),
            (None, Some((8, 0))),
        ];

        for (write, remote) in steps {
            if let Some(value) = write {
                register.write(value);
            }
            if let Some((value, generation)) = remote {
                register.reconcile_incoming(value, generation);
            }
            let generation = register.read().generation;
            assert!(generation >= last, "generation went from {} to {}", last, generation);
            last = generation;
        }
    }

    // ==================== Concurrency ====================

    #[test]
    fn test_concurrent_writes_each_get_a_generation() {
        let register = Arc::new(Register::new(0));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let register = Arc::clone(&register);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        register.write(t * 1000 + i);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(register.read().generation, 800);
    }

    #[test]
    fn test_concurrent_equal_generation_pushes_adopt_exactly_one() {
        for _ in 0..50 {
            let register = Arc::new(Register::with_state(RegisterState {
                value: 0,
                generation: 4,
            }));

            let a = {
                let register = Arc::clone(&register);
                std::thread::spawn(move || register.reconcile_incoming(3, 5))
            };
            let b = {
                let register = Arc::clone(&register);
                std::thread::spawn(move || register.reconcile_incoming(9, 5))
            };

            let adopted = [a.join().unwrap(), b.join().unwrap()];
            assert_eq!(adopted.iter().filter(|x| **x).count(), 1);

            let state = register.read();
            assert_eq!(state.generation, 5);
            assert!(state.value == 3 || state.value == 9);
        }
    }
}
