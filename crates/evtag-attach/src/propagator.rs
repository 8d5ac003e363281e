//! # Tag Propagator
//!
//! The only writer of an evidence's propagated and system tag layers.
//!
//! - On attach, the owner's contribution is unioned in.
//! - On detach, the detached owner's contribution minus everything the
//!   remaining owners still contribute (`K`) is subtracted.
//! - After either, the closure is verified: every current owner's
//!   contribution must be present. A failure aborts the transaction.
//!
//! Manual tags are never touched here.

use std::collections::BTreeSet;

use evtag_core::{ControlId, EvidenceId, EvtagError, Owner, OwnerRef, Result, TagId};
use evtag_store::Tables;

use crate::capability::capabilities;

/// Resolved tags contributed by one or more owners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
    pub tags: BTreeSet<TagId>,
    pub system_tags: BTreeSet<TagId>,
}

impl Contribution {
    pub fn union_with(&mut self, other: Contribution) {
        self.tags.extend(other.tags);
        self.system_tags.extend(other.system_tags);
    }
}

/// Everything the current owners of `evidence` contribute (`K`).
pub fn retained(tables: &Tables, evidence: EvidenceId) -> Contribution {
    let mut k = Contribution::default();
    for owner in tables.attachments.owners_of(&evidence) {
        match capabilities(owner.kind()).list_tags(tables, &owner) {
            Ok(spec) => k.union_with(spec.resolve_existing(tables, owner.organization)),
            Err(err) => {
                tracing::debug!(owner = %owner, error = %err, "owner vanished, contributes nothing");
            }
        }
    }
    k
}

/// Union `contribution` into the evidence's layers, then verify.
pub fn apply_attach(
    tables: &mut Tables,
    evidence: EvidenceId,
    contribution: &Contribution,
) -> Result<()> {
    let row = tables
        .evidence
        .get_mut(&evidence)
        .ok_or_else(|| EvtagError::not_found("evidence", evidence))?;
    row.propagated_tags.extend(contribution.tags.iter().copied());
    row.system_tags.extend(contribution.system_tags.iter().copied());
    verify(tables, evidence)
}

/// Subtract `contribution − K` from the evidence's layers, then verify.
/// Returns every tag taken off the evidence, as cleanup candidates.
pub fn apply_detach(
    tables: &mut Tables,
    evidence: EvidenceId,
    contribution: &Contribution,
) -> Result<BTreeSet<TagId>> {
    let k = retained(tables, evidence);
    let remove_tags: BTreeSet<TagId> = contribution.tags.difference(&k.tags).copied().collect();
    let remove_system: BTreeSet<TagId> = contribution
        .system_tags
        .difference(&k.system_tags)
        .copied()
        .collect();

    let row = tables
        .evidence
        .get_mut(&evidence)
        .ok_or_else(|| EvtagError::not_found("evidence", evidence))?;
    row.propagated_tags.retain(|t| !remove_tags.contains(t));
    let removed_system: BTreeSet<TagId> = row
        .system_tags
        .intersection(&remove_system)
        .copied()
        .collect();
    row.system_tags.retain(|t| !remove_system.contains(t));
    verify(tables, evidence)?;
    Ok(removed_system.into_iter().chain(remove_tags).collect())
}

/// Check that every current owner's contribution is present on the
/// evidence.
pub fn verify(tables: &Tables, evidence: EvidenceId) -> Result<()> {
    let row = tables
        .evidence
        .get(&evidence)
        .ok_or_else(|| EvtagError::not_found("evidence", evidence))?;
    let k = retained(tables, evidence);
    let missing: Vec<&TagId> = k.tags.difference(&row.propagated_tags).collect();
    if !missing.is_empty() {
        return Err(EvtagError::propagator(
            evidence,
            format!("{} owner tag(s) missing from propagated layer", missing.len()),
        ));
    }
    let missing: Vec<&TagId> = k.system_tags.difference(&row.system_tags).collect();
    if !missing.is_empty() {
        return Err(EvtagError::propagator(
            evidence,
            format!("{} system tag(s) missing", missing.len()),
        ));
    }
    Ok(())
}

/// Replace a control's tags and re-run propagation for every evidence
/// attached to the control or to one of its action items.
///
/// Returns the affected evidence ids.
pub fn reconcile_control_tags(
    tables: &mut Tables,
    control: ControlId,
    new_tags: BTreeSet<TagId>,
) -> Result<Vec<EvidenceId>> {
    let record = tables
        .catalog
        .control(&control)
        .cloned()
        .ok_or_else(|| EvtagError::not_found("control", control))?;
    for tag in &new_tags {
        if tables.tags.get(tag).map(|t| t.organization) != Some(record.organization) {
            return Err(EvtagError::not_found("tag", tag));
        }
    }

    let org = record.organization;
    let mut affected: BTreeSet<EvidenceId> = tables
        .attachments
        .evidence_of(&Owner::new(org, OwnerRef::Control(control)))
        .into_iter()
        .collect();
    for item in &record.action_items {
        affected.extend(
            tables
                .attachments
                .evidence_of(&Owner::new(org, OwnerRef::ActionItem(*item))),
        );
    }

    let dropped: BTreeSet<TagId> = record.tags.difference(&new_tags).copied().collect();
    tables.catalog.replace_control_tags(&control, new_tags.clone());

    for evidence in &affected {
        let k = retained(tables, *evidence);
        let Some(row) = tables.evidence.get_mut(evidence) else {
            continue;
        };
        row.propagated_tags
            .retain(|t| !(dropped.contains(t) && !k.tags.contains(t)));
        row.propagated_tags.extend(new_tags.iter().copied());
        verify(tables, *evidence)?;
    }
    Ok(affected.into_iter().collect())
}
