//! # Export API
//!
//! Creating an export only snapshots and schedules it; packaging runs on
//! the exporter's pool and the outcome is read back from the request.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evtag_core::{EvidenceId, ExportRequestId, LinkId, OrganizationId, UserId};
use evtag_export::{ExportRequest, ExportScope, ExportState, Link, NewExport};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateExportRequest {
    #[serde(flatten)]
    pub scope: ExportScope,
    #[serde(default)]
    pub evidence_ids: Option<Vec<EvidenceId>>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub requested_by: Option<UserId>,
    pub notify: String,
}

pub(crate) fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Validate for CreateExportRequest {
    fn validate(&self) -> Result<(), String> {
        if !self.notify.contains('@') {
            return Err("notify must be an email address".to_string());
        }
        if matches!(&self.evidence_ids, Some(ids) if ids.is_empty()) {
            return Err("evidence_ids must not be empty when given".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateExportResponse {
    pub request_id: ExportRequestId,
}

/// Request status without the frozen item list.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportStatusResponse {
    pub id: ExportRequestId,
    pub organization: OrganizationId,
    pub state: ExportState,
    pub delivered: bool,
    pub items: usize,
    pub errors: Option<String>,
    pub link: Option<LinkId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ExportRequest> for ExportStatusResponse {
    fn from(r: ExportRequest) -> Self {
        Self {
            id: r.id,
            organization: r.organization,
            state: r.state,
            delivered: r.delivered,
            items: r.items.len(),
            errors: r.errors,
            link: r.link,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkResponse {
    pub url: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/organizations/:org/exports", post(create_export))
        .route("/v1/exports/:id", get(get_export))
        .route("/v1/links/:id", get(open_link))
        .route("/v1/links/:id/disable", post(disable_link))
}

/// POST /v1/organizations/:org/exports
async fn create_export(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<CreateExportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateExportResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let request_id = state.exporter.create(NewExport {
        organization: org,
        scope: req.scope,
        evidence_ids: req.evidence_ids,
        time_zone: req.time_zone,
        requested_by: req.requested_by,
        notify: req.notify,
    })?;
    Ok((StatusCode::ACCEPTED, Json(CreateExportResponse { request_id })))
}

/// GET /v1/exports/:id
async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<ExportRequestId>,
) -> Result<Json<ExportStatusResponse>, AppError> {
    let request = state.exporter.get(id).ok_or_else(|| AppError::NotFound {
        code: "NOT_FOUND",
        message: format!("export request {id} not found"),
    })?;
    Ok(Json(request.into()))
}

/// GET /v1/links/:id
///
/// 410 once the link has expired or been disabled.
async fn open_link(
    State(state): State<AppState>,
    Path(id): Path<LinkId>,
) -> Result<Json<LinkResponse>, AppError> {
    let url = state.exporter.open_link(id, Utc::now())?;
    Ok(Json(LinkResponse { url }))
}

/// POST /v1/links/:id/disable
async fn disable_link(
    State(state): State<AppState>,
    Path(id): Path<LinkId>,
) -> Result<Json<Link>, AppError> {
    Ok(Json(state.exporter.disable_link(id)?))
}
