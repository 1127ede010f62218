use ulid::Ulid;

/// Longest identifier accepted from clients.
pub const MAX_ID_LEN: usize = 64;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = chat_common::id::prefixed_ulid("cx");
/// assert!(id.starts_with("cx_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Whether `id` is a well-formed opaque identifier: non-empty, at most
/// [`MAX_ID_LEN`] bytes, ASCII alphanumerics plus `_` and `-`.
///
/// Shape says nothing about what the id refers to; user and group ids share
/// the same alphabet.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const GROUP: &str = "grp";
    pub const CONNECTION: &str = "cx";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::CONNECTION);
        assert!(id.starts_with("cx_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 3 + 26);
        assert!(is_valid_id(&id));
    }

    #[test]
    fn prefixed_ulids_are_unique() {
        assert_ne!(prefixed_ulid("usr"), prefixed_ulid("usr"));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("semi;colon"));
        assert!(!is_valid_id(&"a".repeat(MAX_ID_LEN + 1)));
        assert!(is_valid_id("64b7f0c2e4b0a1d2c3e4f5a6"));
        assert!(is_valid_id("grp_team-1"));
    }
}
