//! Protocol version management.

/// Current command protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Oldest command protocol version this node still executes.
pub const MIN_PROTOCOL_VERSION: u16 = 1;

/// Whether a command written for `version` can be executed here.
pub fn is_compatible(version: u16) -> bool {
    (MIN_PROTOCOL_VERSION..=PROTOCOL_VERSION).contains(&version)
}
