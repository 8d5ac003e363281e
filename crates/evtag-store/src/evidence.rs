//! # Evidence Records
//!
//! An evidence row carries its tags in three layers. `manual_tags` is
//! written only by the user-facing tag path; `propagated_tags` is written
//! only by the tag propagator; `system_tags` holds back-references whose
//! names encode subtask ids. The visible tag set is the union of the first
//! two layers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evtag_core::{EvidenceId, EvidenceKind, OrganizationId, PolicyId, TagId, UserId};

use crate::blob::BlobRef;

/// A durable evidence artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub organization: OrganizationId,
    pub name: String,
    pub description: String,
    pub kind: EvidenceKind,
    /// Stored bytes. Absent for LINK and for virtual POLICY evidence.
    pub file: Option<BlobRef>,
    /// Searchable text (stripped paper body, link URL).
    pub evidence_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub policy_ref: Option<PolicyId>,
    /// Migration lineage: the evidence this LEGACY row stands in for.
    pub legacy_ref: Option<EvidenceId>,
    pub manual_tags: BTreeSet<TagId>,
    pub propagated_tags: BTreeSet<TagId>,
    pub system_tags: BTreeSet<TagId>,
    /// Set by soft delete. Soft-deleted rows are hidden from every read.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Evidence {
    /// The visible tag set: manual ∪ propagated.
    pub fn tags(&self) -> BTreeSet<TagId> {
        self.manual_tags
            .union(&self.propagated_tags)
            .copied()
            .collect()
    }

    /// Whether the row was soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether `tag` is referenced by any layer.
    pub fn references_tag(&self, tag: &TagId) -> bool {
        self.manual_tags.contains(tag)
            || self.propagated_tags.contains(tag)
            || self.system_tags.contains(tag)
    }
}

/// Evidence rows.
#[derive(Debug, Clone, Default)]
pub struct EvidenceTable {
    rows: BTreeMap<EvidenceId, Evidence>,
    dirty: BTreeSet<EvidenceId>,
}

impl EvidenceTable {
    /// Any row, including soft-deleted ones.
    pub fn get_any(&self, id: &EvidenceId) -> Option<&Evidence> {
        self.rows.get(id)
    }

    /// A live (not soft-deleted) row.
    pub fn get(&self, id: &EvidenceId) -> Option<&Evidence> {
        self.rows.get(id).filter(|e| !e.is_deleted())
    }

    /// Mutable access to a live row. Marks it changed.
    pub fn get_mut(&mut self, id: &EvidenceId) -> Option<&mut Evidence> {
        let row = self.rows.get_mut(id).filter(|e| !e.is_deleted())?;
        self.dirty.insert(*id);
        Some(row)
    }

    /// Insert or replace a row.
    pub fn insert(&mut self, evidence: Evidence) {
        self.dirty.insert(evidence.id);
        self.rows.insert(evidence.id, evidence);
    }

    /// Remove a row.
    pub fn remove(&mut self, id: &EvidenceId) -> Option<Evidence> {
        let row = self.rows.remove(id)?;
        self.dirty.insert(*id);
        Some(row)
    }

    /// Live rows of one organization.
    pub fn for_organization(
        &self,
        organization: OrganizationId,
    ) -> impl Iterator<Item = &Evidence> {
        self.rows
            .values()
            .filter(move |e| e.organization == organization && !e.is_deleted())
    }

    /// All rows, including soft-deleted ones.
    pub fn iter_all(&self) -> impl Iterator<Item = &Evidence> {
        self.rows.values()
    }

    /// Whether any row, deleted or not, names `id` as its lineage source.
    pub fn is_legacy_source(&self, id: &EvidenceId) -> bool {
        self.rows.values().any(|e| e.legacy_ref.as_ref() == Some(id))
    }

    /// Live POLICY evidence already materialized for `policy`.
    pub fn for_policy(&self, organization: OrganizationId, policy: PolicyId) -> Option<&Evidence> {
        self.for_organization(organization)
            .find(|e| e.kind == EvidenceKind::Policy && e.policy_ref == Some(policy))
    }

    pub(crate) fn restore(&mut self, evidence: Evidence) {
        self.rows.insert(evidence.id, evidence);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<EvidenceId> {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(org: OrganizationId, name: &str, kind: EvidenceKind) -> Evidence {
        let now = Utc::now();
        Evidence {
            id: EvidenceId::new(),
            organization: org,
            name: name.into(),
            description: String::new(),
            kind,
            file: None,
            evidence_text: None,
            created_at: now,
            updated_at: now,
            created_by: None,
            policy_ref: None,
            legacy_ref: None,
            manual_tags: BTreeSet::new(),
            propagated_tags: BTreeSet::new(),
            system_tags: BTreeSet::new(),
            deleted_at: None,
        }
    }

    #[test]
    fn visible_tags_union_manual_and_propagated_only() {
        let mut e = sample(OrganizationId::new(), "a.pdf", EvidenceKind::File);
        let (m, p, s) = (TagId::new(), TagId::new(), TagId::new());
        e.manual_tags.insert(m);
        e.propagated_tags.insert(p);
        e.propagated_tags.insert(m);
        e.system_tags.insert(s);
        assert_eq!(e.tags(), BTreeSet::from([m, p]));
        assert!(e.references_tag(&s));
    }

    #[test]
    fn soft_deleted_rows_are_hidden() {
        let mut table = EvidenceTable::default();
        let mut e = sample(OrganizationId::new(), "a.pdf", EvidenceKind::File);
        e.deleted_at = Some(Utc::now());
        let id = e.id;
        table.insert(e);
        assert!(table.get(&id).is_none());
        assert!(table.get_mut(&id).is_none());
        assert!(table.get_any(&id).is_some());
    }

    #[test]
    fn legacy_lineage_is_detected() {
        let org = OrganizationId::new();
        let mut table = EvidenceTable::default();
        let source = sample(org, "old.pdf", EvidenceKind::File);
        let mut legacy = sample(org, "old.pdf", EvidenceKind::Legacy);
        legacy.legacy_ref = Some(source.id);
        let source_id = source.id;
        table.insert(source);
        table.insert(legacy);
        assert!(table.is_legacy_source(&source_id));
    }
}
