//! # evtag-store — Tag Registry and Evidence Store
//!
//! The storage layer of the evidence and tagging core.
//!
//! - [`Database`] is the transactional engine. Every attachment operation
//!   runs as one [`Database::transaction`] against a private copy of
//!   [`Tables`]; readers use [`Database::snapshot`].
//! - [`tags`] is the tag registry: unique `(organization, name)` tags,
//!   created on demand.
//! - [`evidence`], [`attachment`] and [`mutations`] hold evidence rows,
//!   owner attachments, and the create / rename / delete operations with
//!   unique-per-scope [`naming`].
//! - [`synthesis`] and [`render`] generate paper, officer, team and policy
//!   evidence; [`blob`] stores their bytes.
//! - [`catalog`] holds the externally owned records (controls, subtasks,
//!   datarooms, officers, policies, ...) the core reads.
//! - [`Store`] is a plain keyed map for records that need no multi-row
//!   transaction.

pub mod attachment;
pub mod blob;
pub mod catalog;
pub mod database;
pub mod evidence;
pub mod mutations;
pub mod naming;
pub mod render;
pub mod store;
pub mod synthesis;
pub mod tags;

pub use attachment::{Attachment, AttachmentTable};
pub use blob::{BlobRef, BlobStore, MemoryBlobStore};
pub use catalog::Catalog;
pub use database::{ChangeSet, Commit, Database, Shared, Tables};
pub use evidence::{Evidence, EvidenceTable};
pub use mutations::{NewEvidence, Renamed};
pub use render::{Document, DocumentRenderer, PlainPdfRenderer};
pub use store::Store;
pub use synthesis::Synthesized;
pub use tags::{Tag, TagTable};
