//! Common shape for every operator kernel in this crate.
//!
//! An `Operator` is the pure state-transition half of a node (spec §4.1:
//! "Nodes pull from in-edges, transform, and push to out-edges"). The async
//! edge-reading/writing loop that drives it lives in `flowd::taskmaster`;
//! keeping the transition logic free of `tokio` makes every operator here
//! testable with plain `#[test]`.

use flow_core::Message;

/// A single-input operator kernel: feed it messages one at a time, drain
/// whatever it emits.
pub trait Operator: Send {
    /// Handle one inbound message, returning zero or more outbound ones.
    fn process(&mut self, msg: Message) -> Vec<Message>;

    /// Called once the in-edge closes. Most stateless operators have
    /// nothing to flush; windows/joins/aggregations may have buffered state
    /// that should still be emitted (or deliberately dropped) at shutdown.
    fn flush(&mut self) -> Vec<Message> {
        Vec::new()
    }
}
