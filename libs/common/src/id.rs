use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = confab_common::id::prefixed_ulid("room");
/// assert!(id.starts_with("room_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Prefixes for the ids this service mints itself. User and group ids
/// come from the collaborating stores.
pub mod prefix {
    pub const ROOM: &str = "room";
    pub const CONNECTION: &str = "conn";
}
