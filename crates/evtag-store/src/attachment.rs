//! # Attachments
//!
//! `(Owner, Evidence)` rows, indexed both ways. Folder membership is not a
//! row of its own: it is the `folder` attribute of the evidence's Drive
//! attachment, so an evidence sits in at most one folder and is in the
//! Drive at most once per organization.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evtag_core::{EvidenceId, FolderId, Owner, OwnerRef, UserId};

/// One owner citing one evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub owner: Owner,
    pub evidence: EvidenceId,
    /// Drive only.
    pub is_template: bool,
    /// Drive only.
    pub folder: Option<FolderId>,
    /// Who attached it.
    pub owner_user: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    /// A fresh attachment with no optional attributes.
    pub fn new(owner: Owner, evidence: EvidenceId, owner_user: Option<UserId>) -> Self {
        Self {
            owner,
            evidence,
            is_template: false,
            folder: None,
            owner_user,
            created_at: Utc::now(),
        }
    }
}

/// Attachment rows plus the reverse index.
#[derive(Debug, Clone, Default)]
pub struct AttachmentTable {
    by_owner: BTreeMap<Owner, BTreeMap<EvidenceId, Attachment>>,
    by_evidence: BTreeMap<EvidenceId, BTreeSet<Owner>>,
    dirty: BTreeSet<(Owner, EvidenceId)>,
}

impl AttachmentTable {
    /// Look up one row.
    pub fn get(&self, owner: &Owner, evidence: &EvidenceId) -> Option<&Attachment> {
        self.by_owner.get(owner).and_then(|rows| rows.get(evidence))
    }

    /// Whether the row exists. For a folder owner, whether the evidence's
    /// Drive attachment points at that folder.
    pub fn contains(&self, owner: &Owner, evidence: &EvidenceId) -> bool {
        match owner.reference {
            OwnerRef::Folder(folder) => self
                .get(&Owner::drive(owner.organization), evidence)
                .is_some_and(|a| a.folder == Some(folder)),
            _ => self.get(owner, evidence).is_some(),
        }
    }

    /// Insert a row. Returns `false` if it already existed.
    pub fn insert(&mut self, attachment: Attachment) -> bool {
        let owner = attachment.owner;
        let evidence = attachment.evidence;
        let rows = self.by_owner.entry(owner).or_default();
        if rows.contains_key(&evidence) {
            return false;
        }
        rows.insert(evidence, attachment);
        self.by_evidence.entry(evidence).or_default().insert(owner);
        self.dirty.insert((owner, evidence));
        true
    }

    /// Mutable access to a row. Marks it changed.
    pub fn get_mut(&mut self, owner: &Owner, evidence: &EvidenceId) -> Option<&mut Attachment> {
        let row = self.by_owner.get_mut(owner)?.get_mut(evidence)?;
        self.dirty.insert((*owner, *evidence));
        Some(row)
    }

    /// Remove a row.
    pub fn remove(&mut self, owner: &Owner, evidence: &EvidenceId) -> Option<Attachment> {
        let rows = self.by_owner.get_mut(owner)?;
        let removed = rows.remove(evidence)?;
        if rows.is_empty() {
            self.by_owner.remove(owner);
        }
        if let Some(owners) = self.by_evidence.get_mut(evidence) {
            owners.remove(owner);
            if owners.is_empty() {
                self.by_evidence.remove(evidence);
            }
        }
        self.dirty.insert((*owner, *evidence));
        Some(removed)
    }

    /// Evidence attached to `owner`, in id order.
    pub fn evidence_of(&self, owner: &Owner) -> Vec<EvidenceId> {
        match owner.reference {
            OwnerRef::Folder(folder) => self
                .by_owner
                .get(&Owner::drive(owner.organization))
                .map(|rows| {
                    rows.values()
                        .filter(|a| a.folder == Some(folder))
                        .map(|a| a.evidence)
                        .collect()
                })
                .unwrap_or_default(),
            _ => self
                .by_owner
                .get(owner)
                .map(|rows| rows.keys().copied().collect())
                .unwrap_or_default(),
        }
    }

    /// Owners of `evidence`, in owner order.
    pub fn owners_of(&self, evidence: &EvidenceId) -> BTreeSet<Owner> {
        self.by_evidence.get(evidence).cloned().unwrap_or_default()
    }

    /// Whether any row references `evidence`.
    pub fn is_attached(&self, evidence: &EvidenceId) -> bool {
        self.by_evidence.contains_key(evidence)
    }

    /// Every row, in owner then evidence order.
    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.by_owner.values().flat_map(|rows| rows.values())
    }

    pub(crate) fn restore(&mut self, attachment: Attachment) {
        let owner = attachment.owner;
        let evidence = attachment.evidence;
        self.by_owner
            .entry(owner)
            .or_default()
            .insert(evidence, attachment);
        self.by_evidence.entry(evidence).or_default().insert(owner);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<(Owner, EvidenceId)> {
        std::mem::take(&mut self.dirty)
    }
}
