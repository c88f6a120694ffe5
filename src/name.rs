//! Segment naming.

use crate::error::{Error, Result};

/// Environment variable that overrides the default whiteboard name.
pub const NAME_ENV: &str = "WHITEBOARD_NAME";

/// Name used when [`NAME_ENV`] is not set.
pub const DEFAULT_NAME: &str = "whiteboard";

/// The whiteboard name from the environment, or [`DEFAULT_NAME`].
pub fn default_name() -> String {
    match std::env::var(NAME_ENV) {
        Ok(name) if !name.is_empty() => name,
        _ => DEFAULT_NAME.to_string(),
    }
}

/// Turns a whiteboard name into a POSIX shared-memory name.
///
/// A leading `'/'` is added when missing. Names must not be empty, must not
/// contain another `'/'` and must not contain NUL bytes.
pub fn shm_name(name: &str) -> Result<String> {
    let invalid = |reason| Error::InvalidName {
        name: name.to_string(),
        reason,
    };
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() {
        return Err(invalid("name is empty"));
    }
    if bare.contains('/') {
        return Err(invalid("name contains '/'"));
    }
    if bare.contains('\0') {
        return Err(invalid("name contains a NUL byte"));
    }
    Ok(format!("/{bare}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_is_added_once() {
        assert_eq!(shm_name("test-bus").unwrap(), "/test-bus");
        assert_eq!(shm_name("/test-bus").unwrap(), "/test-bus");
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["", "/", "a/b", "/a/b", "nul\0byte"] {
            assert!(
                matches!(shm_name(name), Err(Error::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn default_name_is_whiteboard_or_env() {
        let name = default_name();
        match std::env::var(NAME_ENV) {
            Ok(env) if !env.is_empty() => assert_eq!(name, env),
            _ => assert_eq!(name, "whiteboard"),
        }
    }
}
