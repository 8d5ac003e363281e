//! # evtag-export — Async Exporter
//!
//! Packages a frozen set of evidence into one deterministic zip, stores it,
//! publishes a single expiring [`Link`] and mails the requester once.
//!
//! - [`request`]: the `CREATED → PACKAGING → DELIVERED | FAILED` state
//!   machine and the evidence snapshot it carries.
//! - [`archive`]: entry naming and zip writing.
//! - [`storage`] and [`mailer`]: the object-storage and email seams, with
//!   in-memory implementations.
//! - [`exporter`]: the bounded task pool that drives a request to a
//!   terminal state.
//!
//! The exporter never mutates evidence and never returns packaging errors
//! to the creator of a request; they are recorded on the request.

pub mod archive;
pub mod error;
pub mod exporter;
pub mod link;
pub mod mailer;
pub mod request;
pub mod storage;

pub use error::{LinkError, TransitionError};
pub use exporter::{snapshot_items, ExportEvent, Exporter};
pub use link::Link;
pub use mailer::{ExportEmail, LogMailer, Mailer, RecordingMailer};
pub use request::{ExportItem, ExportRequest, ExportScope, ExportState, NewExport};
pub use storage::{ExpiryStyle, MemoryObjectStorage, ObjectStorage, SignedUrl};
