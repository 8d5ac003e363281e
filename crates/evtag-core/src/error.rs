//! # Error Hierarchy
//!
//! Structured error types for the evidence and tagging core, built with
//! `thiserror`. The attachment manager is the only error surface the API
//! layer sees; propagation and projection failures are folded into its
//! transaction and come back as one of these variants.

use thiserror::Error;

/// Shorthand for results carrying [`EvtagError`].
pub type Result<T, E = EvtagError> = std::result::Result<T, E>;

/// Top-level error type for the core.
#[derive(Error, Debug)]
pub enum EvtagError {
    /// Unknown evidence, owner, tag, or source record.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity type that was looked up.
        entity: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    /// Cross-organization reference, wrong kind, or a kind the owner cannot hold.
    #[error("cannot attach evidence {evidence} to {owner}: {reason}")]
    IllegalAttach {
        /// The evidence that was rejected.
        evidence: String,
        /// The owner it was being attached to.
        owner: String,
        /// Why the attachment is illegal.
        reason: String,
    },

    /// A name collision the numeric suffix scheme cannot resolve.
    #[error("name \"{name}\" already exists: {reason}")]
    NameExists {
        /// The requested name.
        name: String,
        /// Why suffixing could not produce a usable name.
        reason: String,
    },

    /// The suffix probe bound was reached.
    #[error("no free name for \"{name}\" after {attempts} suffix attempts")]
    NameExhausted {
        /// The requested name.
        name: String,
        /// How many candidate suffixes were probed.
        attempts: u32,
    },

    /// A unique-index race that one retry did not resolve.
    #[error("unique constraint {constraint} conflict on {key}")]
    Conflict {
        /// The violated constraint.
        constraint: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// The tag closure of an evidence is inconsistent after propagation.
    /// Fatal for the enclosing transaction.
    #[error("tag propagation inconsistency on evidence {evidence}: {detail}")]
    Propagator {
        /// The evidence whose tag set failed verification.
        evidence: String,
        /// What was inconsistent.
        detail: String,
    },

    /// Failure inside the export pipeline. Recorded on the export request,
    /// never returned to the request's creator.
    #[error("export packaging failed: {0}")]
    ExportPackaging(String),

    /// The projection cache backend could not be reached.
    #[error("cache backend unavailable: {0}")]
    CacheBackendUnavailable(String),

    /// Input failed shape validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The caller's deadline passed before the transaction committed.
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// The operation that was aborted.
        operation: &'static str,
    },

    /// Blob or object storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EvtagError {
    /// Construct a not-found error.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Construct an illegal-attach error.
    pub fn illegal_attach(
        evidence: impl std::fmt::Display,
        owner: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::IllegalAttach {
            evidence: evidence.to_string(),
            owner: owner.to_string(),
            reason: reason.into(),
        }
    }

    /// Construct a propagation inconsistency error.
    pub fn propagator(evidence: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        Self::Propagator {
            evidence: evidence.to_string(),
            detail: detail.into(),
        }
    }

    /// Machine-readable code used by transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::IllegalAttach { .. } => "ILLEGAL_ATTACH",
            Self::NameExists { .. } => "NAME_EXISTS",
            Self::NameExhausted { .. } => "NAME_EXHAUSTED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Propagator { .. } => "PROPAGATOR",
            Self::ExportPackaging(_) => "EXPORT_PACKAGING",
            Self::CacheBackendUnavailable(_) => "CACHE_UNAVAILABLE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Input shape failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A name was empty after trimming.
    #[error("name must not be empty")]
    EmptyName,

    /// A name exceeded the configured maximum.
    #[error("name is {len} characters long (maximum {max})")]
    NameTooLong {
        /// Actual length in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A tag name was empty after trimming.
    #[error("tag name must not be empty")]
    EmptyTagName,

    /// An IANA time zone name did not parse.
    #[error("invalid time zone: \"{0}\"")]
    InvalidTimeZone(String),

    /// An upload body was not valid base64.
    #[error("upload \"{file_name}\" is not valid base64: {reason}")]
    InvalidUploadBody {
        /// The upload's file name.
        file_name: String,
        /// Decoder message.
        reason: String,
    },

    /// A URL did not parse.
    #[error("invalid URL: \"{0}\"")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_entity_and_id() {
        let err = EvtagError::not_found("evidence", "abc");
        let msg = err.to_string();
        assert!(msg.contains("evidence"));
        assert!(msg.contains("abc"));
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn illegal_attach_display_carries_reason() {
        let err = EvtagError::illegal_attach("e1", "CONTROL:c1", "cross-organization");
        assert!(err.to_string().contains("cross-organization"));
        assert_eq!(err.code(), "ILLEGAL_ATTACH");
    }

    #[test]
    fn validation_converts_into_top_level() {
        let err: EvtagError = ValidationError::NameTooLong { len: 600, max: 512 }.into();
        assert!(err.to_string().contains("600"));
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn name_exhausted_reports_attempts() {
        let err = EvtagError::NameExhausted {
            name: "report.pdf".into(),
            attempts: 8,
        };
        assert!(err.to_string().contains('8'));
    }
}
