//! Receiving side of the anti-entropy protocol.
//!
//! Parses a peer's pushed `(value, generation)` and hands it to the register.
//! Safe to call from any number of concurrent requests; ordering between them
//! is decided entirely by the register lock.

use crate::register::Register;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Malformed push or write parameters. The register is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboundError {
    #[error("invalid value {input:?}: {reason}")]
    InvalidValue { input: String, reason: String },

    #[error("invalid generation {input:?}: {reason}")]
    InvalidGeneration { input: String, reason: String },
}

/// Parse a register value from its decimal text form.
pub fn parse_value(input: &str) -> Result<i64, InboundError> {
    input.parse().map_err(|e: std::num::ParseIntError| InboundError::InvalidValue {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a generation from its decimal text form.
pub fn parse_generation(input: &str) -> Result<u64, InboundError> {
    input
        .parse()
        .map_err(|e: std::num::ParseIntError| InboundError::InvalidGeneration {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Applies pushes from peers to the local register.
#[derive(Debug, Clone)]
pub struct InboundHandler {
    node_name: String,
    register: Arc<Register>,
}

impl InboundHandler {
    pub fn new(node_name: impl Into<String>, register: Arc<Register>) -> Self {
        Self {
            node_name: node_name.into(),
            register,
        }
    }

    /// Reconcile an already-parsed push. Returns true if it was adopted.
    ///
    /// A stale push is a normal outcome, not an error.
    pub fn handle_push(&self, value: i64, generation: u64, notifier: Option<&str>) -> bool {
        let notifier = notifier.unwrap_or("unknown");
        let adopted = self.register.reconcile_incoming(value, generation);
        if adopted {
            info!(
                "[{}] adopted value {} at gen {} from {}",
                self.node_name, value, generation, notifier
            );
        } else {
            debug!(
                "[{}] ignored value {} at gen {} from {} (not newer)",
                self.node_name, value, generation, notifier
            );
        }
        adopted
    }

    /// Parse both path segments, then reconcile.
    pub fn handle_push_raw(
        &self,
        value: &str,
        generation: &str,
        notifier: Option<&str>,
    ) -> Result<bool, InboundError> {
        let value = parse_value(value)?;
        let generation = parse_generation(generation)?;
        Ok(self.handle_push(value, generation, notifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterState;

    fn handler(value: i64) -> (InboundHandler, Arc<Register>) {
        let register = Arc::new(Register::new(value));
        (InboundHandler::new("b", Arc::clone(&register)), register)
    }

    // ==================== Parsing ====================

    #[test]
    fn test_parse_value_accepts_negative() {
        assert_eq!(parse_value("-12"), Ok(-12));
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let err = parse_value("abc").unwrap_err();
        assert!(matches!(err, InboundError::InvalidValue { ref input, .. } if input == "abc"));
        assert!(err.to_string().contains("invalid value \"abc\""));
    }

    #[test]
    fn test_parse_generation_rejects_negative() {
        assert!(matches!(
            parse_generation("-1"),
            Err(InboundError::InvalidGeneration { .. })
        ));
    }

    #[test]
    fn test_parse_value_rejects_overflow() {
        assert!(parse_value("99999999999999999999").is_err());
    }

    // ==================== Push handling ====================

    #[test]
    fn test_push_then_stale_push() {
        let (handler, register) = handler(42);

        assert!(handler.handle_push(7, 1, Some("a")));
        assert_eq!(register.read(), RegisterState { value: 7, generation: 1 });

        assert!(!handler.handle_push(5, 0, Some("a")));
        assert_eq!(register.read(), RegisterState { value: 7, generation: 1 });
    }

    #[test]
    fn test_raw_push_parse_error_leaves_register() {
        let (handler, register) = handler(42);

        assert!(handler.handle_push_raw("7", "x", None).is_err());
        assert!(handler.handle_push_raw("y", "1", None).is_err());
        assert_eq!(register.read(), RegisterState { value: 42, generation: 0 });
    }

    #[test]
    fn test_raw_push_reports_value_error_first() {
        let (handler, _) = handler(0);
        let err = handler.handle_push_raw("nope", "nope", None).unwrap_err();
        assert!(matches!(err, InboundError::InvalidValue { .. }));
    }

    #[test]
    fn test_raw_push_valid() {
        let (handler, register) = handler(0);
        assert_eq!(handler.handle_push_raw("9", "3", Some("c")), Ok(true));
        assert_eq!(register.read(), RegisterState { value: 9, generation: 3 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_equal_generation_pushes() {
        for _ in 0..20 {
            let register = Arc::new(Register::with_state(RegisterState {
                value: 0,
                generation: 4,
            }));
            let handler = InboundHandler::new("n", Arc::clone(&register));

            let a = {
                let handler = handler.clone();
                tokio::spawn(async move { handler.handle_push(3, 5, Some("x")) })
            };
            let b = {
                let handler = handler.clone();
                tokio::spawn(async move { handler.handle_push(9, 5, Some("y")) })
            };

            let (a, b) = (a.await.unwrap(), b.await.unwrap());
            assert!(a ^ b, "exactly one push should be adopted");

            let state = register.read();
            assert_eq!(state.generation, 5);
            assert_eq!(state.value, if a { 3 } else { 9 });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_pushes_converge_on_highest() {
        let (handler, register) = handler(0);

        let tasks: Vec<_> = (1..=200u64)
            .map(|generation| {
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle_push(generation as i64 * 10, generation, Some("peer"))
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(register.read(), RegisterState { value: 2000, generation: 200 });
    }
}
