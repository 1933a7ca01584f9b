//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Consistent span names and field sets make it possible to follow one
//! session across every hop it touches.

use tracing::{info_span, Span};

/// One payment session, end to end, on the node driving it.
pub fn payment_span(session: &str, payer: &str) -> Span {
    info_span!("payment", session = %session, payer = %payer)
}

/// One inbound command executed against this node.
pub fn command_span(command_id: &str, session: &str, command_type: &str) -> Span {
    info_span!(
        "command",
        command_id = %command_id,
        session = %session,
        command_type = %command_type
    )
}

/// One flush run.
pub fn flush_span(node: &str, outstanding: usize) -> Span {
    info_span!("flush", node = %node, outstanding = outstanding)
}
