//! # API Route Modules
//!
//! - `evidence`: attach, detach, rename and manual tag links, plus owner
//!   and evidence reads.
//! - `projections`: cached read models (tag filter, document tags,
//!   program progress, unlocked subtasks).
//! - `exports`: export requests and their download links.

pub mod evidence;
pub mod exports;
pub mod projections;
