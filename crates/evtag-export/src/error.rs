//! Errors specific to export requests and their download links.
//!
//! Packaging failures are [`EvtagError::ExportPackaging`](evtag_core::EvtagError)
//! and never reach the creator of a request; they are recorded on it.

use chrono::{DateTime, Utc};
use thiserror::Error;

use evtag_core::{ExportRequestId, LinkId};

use crate::request::ExportState;

/// An export request was asked to make a move its state does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("export request {request} cannot go from {from} to {to}")]
pub struct TransitionError {
    pub request: ExportRequestId,
    pub from: ExportState,
    pub to: ExportState,
}

/// Why a download link cannot be followed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link {0} not found")]
    NotFound(LinkId),

    #[error("link {id} expired at {expired_at}")]
    Expired {
        id: LinkId,
        expired_at: DateTime<Utc>,
    },

    #[error("link {0} has been disabled")]
    Disabled(LinkId),
}
