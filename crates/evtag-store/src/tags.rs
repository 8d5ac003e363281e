//! # Tag Registry
//!
//! Organization-scoped tags with a unique `(organization, name)` index.
//! Tags are created on first reference and are only removed by explicit
//! cleanup paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evtag_core::{EvtagError, OrganizationId, Result, TagId, ValidationError};

/// An organization-scoped label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Identifier.
    pub id: TagId,
    /// Owning organization.
    pub organization: OrganizationId,
    /// Unique within the organization.
    pub name: String,
    /// Whether a user created the tag directly.
    pub is_manual: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// The unique index rejected an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueViolation {
    /// The tag already holding the key.
    pub existing: TagId,
}

/// Tag rows plus the `(organization, name)` unique index.
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    rows: BTreeMap<TagId, Tag>,
    by_name: HashMap<(OrganizationId, String), TagId>,
    dirty: BTreeSet<TagId>,
}

impl TagTable {
    /// Look up a tag by id.
    pub fn get(&self, id: &TagId) -> Option<&Tag> {
        self.rows.get(id)
    }

    /// Look up a tag by its unique key.
    pub fn find(&self, organization: OrganizationId, name: &str) -> Option<&Tag> {
        self.by_name
            .get(&(organization, name.to_string()))
            .and_then(|id| self.rows.get(id))
    }

    /// Names of the given tags, sorted. Unknown ids are ignored.
    pub fn names<'a>(&self, ids: impl IntoIterator<Item = &'a TagId>) -> Vec<String> {
        let mut names: Vec<String> = ids
            .into_iter()
            .filter_map(|id| self.rows.get(id).map(|t| t.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// All tags of one organization.
    pub fn for_organization(&self, organization: OrganizationId) -> impl Iterator<Item = &Tag> {
        self.rows
            .values()
            .filter(move |t| t.organization == organization)
    }

    /// Insert a new row, enforcing the unique index.
    pub fn try_insert(&mut self, tag: Tag) -> std::result::Result<(), UniqueViolation> {
        let key = (tag.organization, tag.name.clone());
        if let Some(existing) = self.by_name.get(&key) {
            return Err(UniqueViolation {
                existing: *existing,
            });
        }
        self.by_name.insert(key, tag.id);
        self.dirty.insert(tag.id);
        self.rows.insert(tag.id, tag);
        Ok(())
    }

    /// Return the tag named `name`, creating it if absent.
    ///
    /// Idempotent. A lost race on the unique index is retried once by
    /// re-reading the winner; if that still fails the call surfaces
    /// [`EvtagError::Conflict`].
    pub fn get_or_create(
        &mut self,
        organization: OrganizationId,
        name: &str,
        is_manual: bool,
    ) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyTagName.into());
        }
        for _ in 0..2 {
            if let Some(tag) = self.find(organization, name) {
                return Ok(tag.clone());
            }
            let tag = Tag {
                id: TagId::new(),
                organization,
                name: name.to_string(),
                is_manual,
                created_at: Utc::now(),
            };
            match self.try_insert(tag.clone()) {
                Ok(()) => return Ok(tag),
                Err(violation) => {
                    tracing::debug!(
                        organization = %organization,
                        tag = name,
                        existing = %violation.existing,
                        "tag insert lost unique-index race, retrying"
                    );
                }
            }
        }
        Err(EvtagError::Conflict {
            constraint: "tags_organization_name_key",
            key: format!("{organization}/{name}"),
        })
    }

    /// Bulk form of [`get_or_create`](Self::get_or_create). Returns one tag
    /// per distinct name.
    pub fn resolve<S: AsRef<str>>(
        &mut self,
        organization: OrganizationId,
        names: impl IntoIterator<Item = S>,
        is_manual: bool,
    ) -> Result<Vec<Tag>> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for name in names {
            let tag = self.get_or_create(organization, name.as_ref(), is_manual)?;
            if seen.insert(tag.id) {
                out.push(tag);
            }
        }
        Ok(out)
    }

    /// Delete a tag row.
    pub fn remove(&mut self, id: &TagId) -> Option<Tag> {
        let tag = self.rows.remove(id)?;
        self.by_name.remove(&(tag.organization, tag.name.clone()));
        self.dirty.insert(*id);
        Some(tag)
    }

    /// Load a row without marking it changed.
    pub(crate) fn restore(&mut self, tag: Tag) {
        self.by_name
            .insert((tag.organization, tag.name.clone()), tag.id);
        self.rows.insert(tag.id, tag);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<TagId> {
        std::mem::take(&mut self.dirty)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
