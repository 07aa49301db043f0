//! Session identifiers.
//!
//! Every platform session gets a unique identifier that doubles as the
//! default VM name, so VMs sharing a spec never collide.

/// Prefix of generated session identifiers.
pub const SESSION_ID_PREFIX: &str = "vcdriver-";

/// Generate a unique session identifier.
///
/// Format: `vcdriver-` followed by 16 lowercase hex characters.
/// Entropy sources: nanosecond timestamp and two independent `RandomState` hashes.
#[must_use]
pub fn generate_session_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    hasher.write_u64(RandomState::new().build_hasher().finish());
    hasher.write_u64(RandomState::new().build_hasher().finish());
    format!("{SESSION_ID_PREFIX}{:016x}", hasher.finish())
}

/// Whether `id` has the shape produced by [`generate_session_id`].
#[must_use]
pub fn is_session_id(id: &str) -> bool {
    id.strip_prefix(SESSION_ID_PREFIX)
        .is_some_and(|hex| hex.len() == 16 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
