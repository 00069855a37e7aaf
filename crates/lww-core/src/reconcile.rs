//! Last-write-wins decision rule.
//!
//! Pure function over two register states. Callers are expected to hold the
//! register lock; nothing here touches shared state.

use crate::register::RegisterState;

/// Apply an incoming state to `current` if, and only if, its generation is
/// strictly greater.
///
/// Returns true when the incoming state was adopted. Re-delivering the same
/// generation is a no-op, so the rule is idempotent and insensitive to
/// delivery order.
///
/// Equal generations are never ordered: two nodes that independently write
/// up to the same generation keep their own values and neither adopts the
/// other's. There is no tie-break on value or node identity.
pub fn reconcile(current: &mut RegisterState, incoming: RegisterState) -> bool {
    if incoming.generation > current.generation {
        *current = incoming;
        true
    } else {
        false
    }
}
