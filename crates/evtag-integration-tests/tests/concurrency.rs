//! Concurrent writers and concurrent export triggers.

use std::collections::BTreeSet;

use evtag_export::{snapshot_items, ExportRequest, ExportScope, ExportState, NewExport};
use evtag_integration_tests::Harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_of_one_name_stay_unique() {
    let h = Harness::new().unwrap();
    let room = h.dataroom("Audit").unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = h.manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .attach_files(
                    room,
                    vec![evtag_integration_tests::upload("report.pdf", b"%PDF")],
                    "UTC",
                    None,
                    evtag_integration_tests::deadline(),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let names: BTreeSet<String> = h.names_on(room).unwrap().into_iter().collect();
    let mut expected: BTreeSet<String> = (1..8).map(|n| format!("report({n}).pdf")).collect();
    expected.insert("report.pdf".to_string());
    assert_eq!(names, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_triggers_package_once() {
    let h = Harness::new().unwrap();
    h.upload_to(h.drive(), "a.pdf").await.unwrap();
    let new = NewExport {
        organization: h.org,
        scope: ExportScope::Drive,
        evidence_ids: None,
        time_zone: "Europe/Berlin".into(),
        requested_by: None,
        notify: "auditor@example.com".into(),
    };
    let items = snapshot_items(&h.db.snapshot(), h.org, new.scope, None).unwrap();
    let request = ExportRequest::new(new, items);
    let id = request.id;
    h.exporter.restore_request(request);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let exporter = h.exporter.clone();
        handles.push(tokio::spawn(async move { exporter.trigger(id) }));
    }
    let mut started = 0;
    for handle in handles {
        if handle.await.unwrap() {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    let settled = h.exporter.join(id).await.unwrap();
    assert_eq!(settled.state, ExportState::Delivered);
    assert_eq!(h.mailer.sent().len(), 1);
    assert_eq!(h.storage.len(), 1);
}
