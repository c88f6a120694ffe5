use thiserror::Error;

/// Errors reported by whiteboard operations.
///
/// Only attach/lifecycle and raw byte-level posts can fail. Typed posts and
/// reads are checked at compile time and never return an error; stale reads
/// are not errors either and surface only through event counters.
#[derive(Debug, Error)]
pub enum Error {
    /// The shared-memory object could not be created, opened or mapped.
    #[error("cannot map whiteboard '{name}': {source}")]
    Resource {
        /// POSIX shared-memory name.
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The name is not usable as a POSIX shared-memory name.
    #[error("invalid whiteboard name {name:?}: {reason}")]
    InvalidName {
        name: String,
        reason: &'static str,
    },

    /// The mapped region does not carry the whiteboard magic number.
    #[error("not a whiteboard segment: magic 0x{found:016x}")]
    InvalidMagic { found: u64 },

    /// The segment was created with a different format version.
    #[error("whiteboard version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u16, found: u16 },

    /// The segment was created with different build-time constants.
    #[error(
        "whiteboard geometry mismatch: expected {expected:?} (slots, generations, buffer size), found {found:?}"
    )]
    GeometryMismatch {
        expected: (u16, u16, u32),
        found: (u16, u16, u32),
    },

    /// Another process claimed the segment but never finished initializing it.
    #[error("whiteboard segment was never initialized")]
    Uninitialized,

    /// The payload does not fit into a generation buffer.
    #[error("payload of {size} bytes exceeds the {capacity} byte buffer")]
    PayloadTooLarge { size: usize, capacity: usize },

    /// The slot index is outside `0..count`.
    #[error("slot {slot} out of range (slot count {count})")]
    SlotOutOfRange { slot: usize, count: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_error_keeps_os_source() {
        let err = Error::Resource {
            name: "/wb".to_string(),
            source: std::io::Error::from_raw_os_error(libc::EACCES),
        };
        let source = std::error::Error::source(&err).expect("source must be attached");
        assert!(source.to_string().contains("ermission"));
        assert!(err.to_string().starts_with("cannot map whiteboard '/wb'"));
    }

    #[test]
    fn messages_name_the_offending_values() {
        let err = Error::VersionMismatch {
            expected: 2207,
            found: 2206,
        };
        assert_eq!(
            err.to_string(),
            "whiteboard version mismatch: expected 2207, found 2206"
        );

        let err = Error::PayloadTooLarge {
            size: 600,
            capacity: 512,
        };
        assert_eq!(
            err.to_string(),
            "payload of 600 bytes exceeds the 512 byte buffer"
        );
    }
}
