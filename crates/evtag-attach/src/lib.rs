//! # evtag-attach — Attachment Manager and Tag Propagator
//!
//! Links evidence to the entities that hold it and keeps every derived
//! fact consistent in the same transaction:
//!
//! - [`AttachmentManager`] is the mutation surface: upload, attach
//!   existing, synthesize (paper, officers, teams, policies, links),
//!   detach, rename and manual tag links.
//! - [`capability`] answers the per-owner-kind questions (which tags an
//!   owner contributes, which projections it affects).
//! - [`propagator`] applies and retracts those contributions without
//!   disturbing manually applied tags.
//! - [`projections`] computes the cached read models from a snapshot.

pub mod capability;
pub mod manager;
pub mod projections;
pub mod propagator;

#[cfg(test)]
mod testing;

pub use capability::{capabilities, OwnerCapabilities, TagSpec};
pub use manager::{AttachmentManager, LinkInput, PaperNote, Upload};
pub use projections::{ProgramProgress, Projections, SubtaskView, TaskView};
pub use propagator::Contribution;
