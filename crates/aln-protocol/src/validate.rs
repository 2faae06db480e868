//! Boundary validation constants shared by the HTTP and WebSocket ingest
//! paths (spec.md §6). Kept dependency-free (no regex crate) since the
//! token id pattern is a simple ASCII alphanumeric/underscore check.

pub const TOKEN_ID_MIN_LEN: usize = 1;
pub const TOKEN_ID_MAX_LEN: usize = 100;
pub const DEVICE_ID_MIN_LEN: usize = 1;
pub const DEVICE_ID_MAX_LEN: usize = 100;
pub const SESSION_NAME_MIN_LEN: usize = 1;
pub const SESSION_NAME_MAX_LEN: usize = 100;

/// `^[A-Za-z_0-9]+$` at length 1-100.
pub fn is_valid_token_id(id: &str) -> bool {
    let len = id.chars().count();
    if len < TOKEN_ID_MIN_LEN || len > TOKEN_ID_MAX_LEN {
        return false;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_valid_device_id(id: &str) -> bool {
    let len = id.chars().count();
    (DEVICE_ID_MIN_LEN..=DEVICE_ID_MAX_LEN).contains(&len)
}

pub fn is_valid_team_id(id: &str) -> bool {
    !id.is_empty()
}

pub fn is_valid_session_name(name: &str) -> bool {
    let len = name.chars().count();
    (SESSION_NAME_MIN_LEN..=SESSION_NAME_MAX_LEN).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_boundaries() {
        assert!(is_valid_token_id(&"a".repeat(1)));
        assert!(is_valid_token_id(&"a".repeat(100)));
        assert!(!is_valid_token_id(""));
        assert!(!is_valid_token_id(&"a".repeat(101)));
        assert!(!is_valid_token_id("bad-id"));
        assert!(is_valid_token_id("jaw001"));
        assert!(is_valid_token_id("534e2b03"));
    }

    #[test]
    fn team_id_is_any_non_empty_string() {
        assert!(is_valid_team_id("001"));
        assert!(is_valid_team_id("Team With Spaces"));
        assert!(!is_valid_team_id(""));
    }
}
