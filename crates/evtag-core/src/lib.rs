#![deny(missing_docs)]

//! # evtag-core — Foundational Types for the Evidence & Tagging Core
//!
//! Every other crate in the workspace depends on this one. It has no
//! internal dependencies and carries only the vocabulary shared by the
//! tag registry, evidence store, attachment manager, projection cache and
//! exporter.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** You cannot pass a [`ControlId`]
//!    where a [`SubtaskId`] is expected.
//!
//! 2. **One owner vocabulary.** [`OwnerRef`] is the single tagged variant for
//!    every entity that can hold evidence; [`Owner`] pins it to an
//!    organization. There is no per-owner class hierarchy.
//!
//! 3. **[`EvtagError`] hierarchy.** Structured errors with `thiserror`; the
//!    attachment manager is the only error surface the API layer sees.

pub mod config;
pub mod error;
pub mod ids;
pub mod kind;
pub mod owner;
pub mod temporal;

pub use config::{ConfigError, EvtagConfig};
pub use error::{EvtagError, Result, ValidationError};
pub use ids::{
    ActionItemId, ControlId, DataroomId, EvidenceId, ExportRequestId, FolderId, LinkId,
    OfficerId, OrgVendorId, OrganizationId, PolicyId, ProgramId, SubtaskId, TagId, TaskId,
    TeamId, UserId,
};
pub use kind::{DeleteMode, EvidenceKind};
pub use owner::{Owner, OwnerKind, OwnerRef};
pub use temporal::{parse_time_zone, timestamp_suffix, Deadline};
