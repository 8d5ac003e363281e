//! # Integration Tests for evtag-api
//!
//! Health probes, attachment and tagging routes, error mapping, and the
//! export and link lifecycle, driven through the router with `oneshot`.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use evtag_api::state::AppState;
use evtag_core::{DataroomId, Deadline, ExportRequestId, LinkId, OrganizationId};
use evtag_export::{ExportState, Link};
use evtag_store::catalog::{Dataroom, Organization};

struct TestApp {
    state: AppState,
    org: OrganizationId,
    room: DataroomId,
}

impl TestApp {
    fn new() -> Self {
        let state = AppState::in_memory();
        let org = OrganizationId::new();
        let room = DataroomId::new();
        state
            .database()
            .transaction("seed", Deadline::after(Duration::from_secs(5)), |t| {
                t.put_organization(Organization {
                    id: org,
                    name: "Acme".into(),
                });
                t.put_dataroom(Dataroom {
                    id: room,
                    organization: org,
                    name: "Audit".into(),
                })
            })
            .unwrap();
        Self { state, org, room }
    }

    fn router(&self) -> axum::Router {
        evtag_api::app(self.state.clone())
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, value)
    }

    fn room_owner(&self) -> Value {
        json!({ "kind": "DATAROOM", "id": self.room })
    }

    async fn upload(&self, name: &str) -> String {
        let body = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 test");
        let (status, value) = self
            .send(
                "POST",
                &format!("/v1/organizations/{}/evidence/files", self.org),
                Some(json!({
                    "owner": self.room_owner(),
                    "files": [{ "file_name": name, "base64_body": body }],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{value}");
        value["evidence_ids"][0].as_str().unwrap().to_string()
    }
}

fn error_code(value: &Value) -> &str {
    value["error"]["code"].as_str().unwrap_or_default()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn liveness_and_readiness() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health/liveness", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));

    let (status, body) = app.send("GET", "/health/readiness", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ready".into()));
}

// -- Attachment ---------------------------------------------------------------

#[tokio::test]
async fn uploaded_file_is_listed_on_owner_and_drive() {
    let app = TestApp::new();
    let id = app.upload("report.pdf").await;

    let (status, listed) = app
        .send(
            "GET",
            &format!(
                "/v1/organizations/{}/owners/dataroom/evidence?owner_id={}",
                app.org, app.room
            ),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["id"], Value::String(id.clone()));
    assert_eq!(listed[0]["name"], "report.pdf");

    let (status, drive) = app
        .send(
            "GET",
            &format!("/v1/organizations/{}/owners/DRIVE/evidence", app.org),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drive.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn second_upload_with_same_name_is_suffixed() {
    let app = TestApp::new();
    app.upload("report.pdf").await;
    let second = app.upload("report.pdf").await;

    let (_, evidence) = app
        .send(
            "GET",
            &format!("/v1/organizations/{}/evidence/{}", app.org, second),
            None,
        )
        .await;
    assert_eq!(evidence["name"], "report(1).pdf");
}

#[tokio::test]
async fn link_evidence_cannot_join_the_drive() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/evidence/links", app.org),
            Some(json!({
                "owner": { "kind": "DRIVE" },
                "name": "Runbook",
                "url": "https://wiki.example.com/runbook",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "ILLEGAL_ATTACH");
}

#[tokio::test]
async fn unknown_evidence_is_404() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "GET",
            &format!(
                "/v1/organizations/{}/evidence/{}",
                app.org,
                uuid::Uuid::new_v4()
            ),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/evidence/files", app.org),
            Some(json!({ "owner": app.room_owner(), "files": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), "BAD_REQUEST");
}

#[tokio::test]
async fn detach_last_owner_deletes_evidence() {
    let app = TestApp::new();
    let id = app.upload("a.pdf").await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/evidence/detach", app.org),
            Some(json!({ "owner": app.room_owner(), "evidence_ids": [id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], json!([]), "the drive still holds it");

    let (status, body) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/evidence/detach", app.org),
            Some(json!({ "owner": { "kind": "DRIVE" }, "evidence_ids": [id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], json!([id]));

    let (status, _) = app
        .send(
            "GET",
            &format!("/v1/organizations/{}/evidence/{}", app.org, id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Tags & Projections -------------------------------------------------------

#[tokio::test]
async fn manual_tags_round_through_projection() {
    let app = TestApp::new();
    let id = app.upload("a.pdf").await;

    let (status, _) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/evidence/{}/tags", app.org, id),
            Some(json!({ "new_tags": ["Q3 audit"] })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, tags) = app
        .send(
            "GET",
            &format!("/v1/organizations/{}/evidence/{}/manual-tags", app.org, id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags, json!(["Q3 audit"]));

    let (_, filter) = app
        .send(
            "GET",
            &format!("/v1/organizations/{}/tags/filter?force_update=true", app.org),
            None,
        )
        .await;
    assert!(filter.as_array().unwrap().contains(&json!("Q3 audit")));
}

#[tokio::test]
async fn rename_applies_new_name() {
    let app = TestApp::new();
    let id = app.upload("a.pdf").await;
    let (status, evidence) = app
        .send(
            "PATCH",
            &format!("/v1/organizations/{}/evidence/{}", app.org, id),
            Some(json!({ "name": "b.pdf" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(evidence["name"], "b.pdf");
}

// -- Exports & Links ----------------------------------------------------------

#[tokio::test]
async fn export_is_delivered_with_a_working_link() {
    let app = TestApp::new();
    app.upload("a.pdf").await;

    let (status, created) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/exports", app.org),
            Some(json!({
                "scope": "DATAROOM",
                "scope_id": app.room,
                "notify": "auditor@example.com",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{created}");
    let request_id: ExportRequestId =
        serde_json::from_value(created["request_id"].clone()).unwrap();

    let settled = app.state.exporter.join(request_id).await.unwrap();
    assert_eq!(settled.state, ExportState::Delivered);

    let (status, status_body) = app
        .send("GET", &format!("/v1/exports/{request_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["state"], "DELIVERED");
    assert_eq!(status_body["items"], 1);
    let link = status_body["link"].as_str().unwrap().to_string();

    let (status, opened) = app.send("GET", &format!("/v1/links/{link}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(opened["url"].as_str().unwrap().contains(".zip"));

    let (status, _) = app
        .send("POST", &format!("/v1/links/{link}/disable"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("GET", &format!("/v1/links/{link}"), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(error_code(&body), "LINK_DISABLED");
}

#[tokio::test]
async fn expired_link_is_gone() {
    let app = TestApp::new();
    let id = LinkId::new();
    let now = Utc::now();
    app.state.exporter.restore_link(Link {
        id,
        organization: app.org,
        request: ExportRequestId::new(),
        url: "https://files.invalid/exports/a.zip".into(),
        is_enabled: true,
        expiration_date: now - chrono::Duration::minutes(1),
        time_zone: "UTC".into(),
        created_at: now - chrono::Duration::hours(2),
    });

    let (status, body) = app.send("GET", &format!("/v1/links/{id}"), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(error_code(&body), "LINK_EXPIRED");
}

#[tokio::test]
async fn export_of_unknown_dataroom_is_404() {
    let app = TestApp::new();
    let (status, _) = app
        .send(
            "POST",
            &format!("/v1/organizations/{}/exports", app.org),
            Some(json!({
                "scope": "DATAROOM",
                "scope_id": uuid::Uuid::new_v4(),
                "notify": "auditor@example.com",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_export_is_404() {
    let app = TestApp::new();
    let (status, _) = app
        .send("GET", &format!("/v1/exports/{}", uuid::Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
