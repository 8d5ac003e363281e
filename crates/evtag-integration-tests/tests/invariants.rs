//! Universal invariants and idempotence laws of the evidence core.

use std::collections::BTreeSet;

use evtag_core::{DeleteMode, EvidenceKind, OwnerRef};
use evtag_export::{ExportEvent, ExportScope, NewExport};
use evtag_integration_tests::{deadline, upload, Harness};
use evtag_store::NewEvidence;

#[tokio::test]
async fn control_tags_are_a_subset_of_attached_evidence_tags() {
    let h = Harness::new().unwrap();
    let t1 = h.tag("t1").unwrap();
    let t2 = h.tag("t2").unwrap();
    let control = h.control("C1", &[t1, t2], &[]).unwrap();
    let owner = h.owner(OwnerRef::Control(control));
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        h.upload_to(owner, name).await.unwrap();
    }

    let tables = h.db.snapshot();
    let required = &tables.catalog.control(&control).unwrap().tags;
    for id in tables.attachments.evidence_of(&owner) {
        let tags = tables.evidence.get(&id).unwrap().tags();
        assert!(required.is_subset(&tags), "{id} misses a control tag");
    }

    let t3 = h.tag("t3").unwrap();
    h.manager
        .reconcile_control_tags(h.org, control, vec![t2, t3], deadline())
        .await
        .unwrap();
    let tables = h.db.snapshot();
    let required = &tables.catalog.control(&control).unwrap().tags;
    for id in tables.attachments.evidence_of(&owner) {
        let tags = tables.evidence.get(&id).unwrap().tags();
        assert!(required.is_subset(&tags));
        assert!(!tags.contains(&t1), "retired control tag stays behind");
    }
}

#[tokio::test]
async fn subtask_evidence_carries_the_subtask_id_tag() {
    let h = Harness::new().unwrap();
    let (_, _, subtask) = h.subtask("Onboarding").unwrap();
    let owner = h.owner(OwnerRef::Subtask(subtask));
    let a = h.upload_to(owner, "offer.pdf").await.unwrap();
    let b = h.upload_to(owner, "nda.pdf").await.unwrap();

    let tables = h.db.snapshot();
    let tag = tables
        .tags
        .find(h.org, &subtask.to_string())
        .expect("subtask tag exists");
    for id in [a, b] {
        assert!(tables.evidence.get(&id).unwrap().system_tags.contains(&tag.id));
    }
}

#[tokio::test]
async fn evidence_is_deleted_only_once_nothing_references_it() {
    let h = Harness::new().unwrap();
    let room = h.dataroom("Audit").unwrap();
    let kept = h.upload_to(room, "kept.pdf").await.unwrap();
    let gone = h.upload_to(room, "gone.pdf").await.unwrap();
    let org = h.org;
    h.seed(|t| {
        let lineage = NewEvidence {
            name: "kept.pdf".into(),
            description: String::new(),
            kind: EvidenceKind::Legacy,
            file: None,
            evidence_text: None,
            policy_ref: None,
            legacy_ref: Some(kept),
            created_by: None,
        };
        t.create_evidence(org, lineage, &[], &Default::default())
    })
    .unwrap();

    for owner in [room, h.drive()] {
        h.manager
            .detach(owner, vec![kept, gone], deadline())
            .await
            .unwrap();
    }

    assert!(h.evidence(gone).is_none());
    assert!(h.evidence(kept).is_some(), "a LEGACY row still names it");
    assert!(h.db.snapshot().attachments.owners_of(&kept).is_empty());
}

#[tokio::test]
async fn soft_deleted_evidence_disappears_from_reads() {
    let h = Harness::new().unwrap();
    let e = h.upload_to(h.drive(), "old.pdf").await.unwrap();
    let deleted = h
        .manager
        .detach_with_mode(h.drive(), vec![e], DeleteMode::Soft, deadline())
        .await
        .unwrap();
    assert_eq!(deleted, vec![e]);
    assert!(h.evidence(e).is_none());
    assert!(h.db.snapshot().evidence.get_any(&e).is_some());
    assert!(h.manager.get_evidence(h.org, e).is_err());
}

#[tokio::test]
async fn names_are_unique_per_kind_within_an_owner_scope() {
    let h = Harness::new().unwrap();
    let audit = h.dataroom("Audit").unwrap();
    let board = h.dataroom("Board").unwrap();
    h.upload_to(audit, "plan.pdf").await.unwrap();
    h.upload_to(audit, "plan.pdf").await.unwrap();
    let moved = h.upload_to(board, "plan.pdf").await.unwrap();
    h.manager
        .attach_existing(audit, vec![moved], EvidenceKind::File, None, deadline())
        .await
        .unwrap();

    for owner in [audit, board, h.drive()] {
        let tables = h.db.snapshot();
        let mut seen = BTreeSet::new();
        for id in tables.attachments.evidence_of(&owner) {
            let e = tables.evidence.get(&id).unwrap();
            assert!(
                seen.insert((e.name.clone(), e.kind)),
                "duplicate {} on {owner}",
                e.name
            );
        }
    }
}

#[tokio::test]
async fn delivered_flag_never_regresses() {
    let h = Harness::new().unwrap();
    h.upload_to(h.drive(), "a.pdf").await.unwrap();
    let mut events = h.exporter.subscribe();
    let id = h
        .exporter
        .create(NewExport {
            organization: h.org,
            scope: ExportScope::Drive,
            evidence_ids: None,
            time_zone: "UTC".into(),
            requested_by: None,
            notify: "auditor@example.com".into(),
        })
        .unwrap();
    h.exporter.join(id).await.unwrap();
    assert!(!h.exporter.trigger(id));

    let mut flags = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExportEvent::Request(request) = event {
            flags.push(request.delivered);
        }
    }
    assert_eq!(flags.last(), Some(&true));
    let first_true = flags.iter().position(|d| *d).unwrap();
    assert!(flags[first_true..].iter().all(|d| *d));
    assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
async fn attach_then_detach_restores_tags() {
    let h = Harness::new().unwrap();
    let t1 = h.tag("t1").unwrap();
    let t2 = h.tag("t2").unwrap();
    let item = h.action_item("A1").unwrap();
    h.control("C1", &[t1, t2], &[item]).unwrap();
    let (_, _, subtask) = h.subtask("HR").unwrap();
    let e = h.upload_to(h.drive(), "handbook.pdf").await.unwrap();
    h.manager
        .link_tags(h.org, e, vec![t1], vec![], deadline())
        .await
        .unwrap();
    let before = h.evidence(e).unwrap();

    for reference in [OwnerRef::ActionItem(item), OwnerRef::Subtask(subtask)] {
        let owner = h.owner(reference);
        h.manager
            .attach_existing(owner, vec![e], EvidenceKind::File, None, deadline())
            .await
            .unwrap();
        h.manager.detach(owner, vec![e], deadline()).await.unwrap();

        let after = h.evidence(e).unwrap();
        assert_eq!(after.tags(), before.tags(), "tags after {reference}");
        assert_eq!(after.system_tags, before.system_tags);
    }
    assert_eq!(h.tag_names(e), ["t1"]);
}

#[tokio::test]
async fn renaming_to_the_current_name_changes_nothing() {
    let h = Harness::new().unwrap();
    let e = h.upload_to(h.drive(), "soc2.pdf").await.unwrap();
    let before = h.evidence(e).unwrap();
    let renamed = h
        .manager
        .rename(h.org, e, "soc2.pdf".into(), vec![], deadline())
        .await
        .unwrap();
    assert_eq!(renamed, before);
    assert_eq!(h.evidence(e).unwrap(), before);
}

#[tokio::test]
async fn replayed_upload_gets_one_suffix() {
    let h = Harness::new().unwrap();
    let room = h.dataroom("Audit").unwrap();
    let payload = vec![upload("X.ext", b"same bytes")];
    for _ in 0..2 {
        h.manager
            .attach_files(room, payload.clone(), "UTC", None, deadline())
            .await
            .unwrap();
    }
    assert_eq!(h.names_on(room).unwrap(), ["X(1).ext", "X.ext"]);
}
