use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// One scheme covers every id kind in the chat core: connections,
/// conversations, messages and broadcasts.
///
/// # Examples
/// ```
/// let id = scribe_common::id::prefixed_ulid(scribe_common::id::prefix::MESSAGE);
/// assert!(id.starts_with("msg_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
    pub const CONVERSATION: &str = "conv";
    pub const MESSAGE: &str = "msg";
    pub const BROADCAST: &str = "bcast";
}
