//! Error types for the `chorus-world` crate.
//!
//! Reads never fail: a missing or mistyped field yields `None` or the
//! documented default. Only writes that cannot be placed in the document
//! return [`WorldError`].

/// Errors that can occur while writing to the world document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The path was empty or contained an empty segment (`a..b`).
    #[error("invalid world path {path:?}")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },

    /// An intermediate segment already holds a non-object value.
    #[error("cannot descend into {segment:?} while writing {path:?}: not an object")]
    NotAnObject {
        /// The full path being written.
        path: String,
        /// The segment that holds a scalar or array.
        segment: String,
    },

    /// A document used to seed the world was not a JSON object.
    #[error("world document must be a JSON object")]
    DocumentNotObject,
}
