//! # Evidence Attachment API
//!
//! Mutation and read endpoints over the attachment manager. Every owner is
//! addressed by an [`OwnerRef`] inside the request body, pinned to the
//! organization in the path.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use evtag_attach::{LinkInput, PaperNote, Upload};
use evtag_core::{
    ControlId, DeleteMode, EvidenceId, EvidenceKind, OfficerId, OrganizationId, Owner, OwnerKind,
    OwnerRef, PolicyId, TagId, TeamId, UserId,
};
use evtag_store::Evidence;

use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttachFilesRequest {
    pub owner: OwnerRef,
    pub files: Vec<Upload>,
    #[serde(default = "super::exports::default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub actor: Option<UserId>,
}

impl Validate for AttachFilesRequest {
    fn validate(&self) -> Result<(), String> {
        if self.files.is_empty() {
            return Err("files must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachExistingRequest {
    pub owner: OwnerRef,
    pub evidence_ids: Vec<EvidenceId>,
    /// Kind of the evidence being reused.
    pub kind: EvidenceKind,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct AttachOfficersRequest {
    pub owner: OwnerRef,
    pub officer_ids: Vec<OfficerId>,
    pub time_zone: String,
    #[serde(default)]
    pub actor: Option<UserId>,
}

impl Validate for AttachOfficersRequest {
    fn validate(&self) -> Result<(), String> {
        if self.officer_ids.is_empty() {
            return Err("officer_ids must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachTeamsRequest {
    pub owner: OwnerRef,
    pub team_ids: Vec<TeamId>,
    pub time_zone: String,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct AttachPoliciesRequest {
    pub owner: OwnerRef,
    pub policy_ids: Vec<PolicyId>,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct AttachPaperRequest {
    pub owner: OwnerRef,
    #[serde(flatten)]
    pub note: PaperNote,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct AttachLinkRequest {
    pub owner: OwnerRef,
    #[serde(flatten)]
    pub link: LinkInput,
    #[serde(default)]
    pub actor: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct DetachRequest {
    pub owner: OwnerRef,
    pub evidence_ids: Vec<EvidenceId>,
    /// Overrides the configured delete mode for orphans.
    #[serde(default)]
    pub mode: Option<DeleteMode>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
    /// Owners whose scope the new name must be unique in, in addition to
    /// the evidence's current owners.
    #[serde(default)]
    pub context: Vec<OwnerRef>,
}

impl Validate for RenameRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkTagsRequest {
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    /// Names of tags to create if missing, then link.
    #[serde(default)]
    pub new_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnlinkTagsRequest {
    pub tag_ids: Vec<TagId>,
}

#[derive(Debug, Deserialize)]
pub struct ControlTagsRequest {
    pub tag_ids: Vec<TagId>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvidenceIdsResponse {
    pub evidence_ids: Vec<EvidenceId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvidenceIdResponse {
    pub evidence_id: EvidenceId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetachResponse {
    /// Evidences removed because no owner was left.
    pub deleted: Vec<EvidenceId>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/organizations/:org/evidence/files", post(attach_files))
        .route("/v1/organizations/:org/evidence/existing", post(attach_existing))
        .route("/v1/organizations/:org/evidence/officers", post(attach_officers))
        .route("/v1/organizations/:org/evidence/teams", post(attach_teams))
        .route("/v1/organizations/:org/evidence/policies", post(attach_policies))
        .route("/v1/organizations/:org/evidence/paper", post(attach_paper))
        .route("/v1/organizations/:org/evidence/links", post(attach_link))
        .route("/v1/organizations/:org/evidence/detach", post(detach))
        .route(
            "/v1/organizations/:org/evidence/:id",
            get(get_evidence).patch(rename),
        )
        .route("/v1/organizations/:org/evidence/:id/tags", post(link_tags))
        .route(
            "/v1/organizations/:org/evidence/:id/tags/unlink",
            post(unlink_tags),
        )
        .route(
            "/v1/organizations/:org/controls/:control/tags",
            put(reconcile_control_tags),
        )
        .route(
            "/v1/organizations/:org/owners/:kind/evidence",
            get(list_owner_evidence),
        )
}

fn created(ids: Vec<EvidenceId>) -> (StatusCode, Json<EvidenceIdsResponse>) {
    (
        StatusCode::CREATED,
        Json(EvidenceIdsResponse { evidence_ids: ids }),
    )
}

/// POST /v1/organizations/:org/evidence/files
async fn attach_files(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachFilesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdsResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let ids = state
        .manager
        .attach_files(
            Owner::new(org, req.owner),
            req.files,
            &req.time_zone,
            req.actor,
            state.deadline(),
        )
        .await?;
    Ok(created(ids))
}

/// POST /v1/organizations/:org/evidence/existing
async fn attach_existing(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachExistingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdsResponse>), AppError> {
    let req = extract_json(body)?;
    let ids = state
        .manager
        .attach_existing(
            Owner::new(org, req.owner),
            req.evidence_ids,
            req.kind,
            req.actor,
            state.deadline(),
        )
        .await?;
    Ok(created(ids))
}

/// POST /v1/organizations/:org/evidence/officers
async fn attach_officers(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachOfficersRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdsResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let ids = state
        .manager
        .attach_officers(
            Owner::new(org, req.owner),
            req.officer_ids,
            &req.time_zone,
            req.actor,
            state.deadline(),
        )
        .await?;
    Ok(created(ids))
}

/// POST /v1/organizations/:org/evidence/teams
async fn attach_teams(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachTeamsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdsResponse>), AppError> {
    let req = extract_json(body)?;
    let ids = state
        .manager
        .attach_teams(
            Owner::new(org, req.owner),
            req.team_ids,
            &req.time_zone,
            req.actor,
            state.deadline(),
        )
        .await?;
    Ok(created(ids))
}

/// POST /v1/organizations/:org/evidence/policies
async fn attach_policies(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachPoliciesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdsResponse>), AppError> {
    let req = extract_json(body)?;
    let ids = state
        .manager
        .attach_policies(
            Owner::new(org, req.owner),
            req.policy_ids,
            req.actor,
            state.deadline(),
        )
        .await?;
    Ok(created(ids))
}

/// POST /v1/organizations/:org/evidence/paper
async fn attach_paper(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachPaperRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdsResponse>), AppError> {
    let req = extract_json(body)?;
    let ids = state
        .manager
        .attach_paper_note(Owner::new(org, req.owner), req.note, req.actor, state.deadline())
        .await?;
    Ok(created(ids))
}

/// POST /v1/organizations/:org/evidence/links
async fn attach_link(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<AttachLinkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceIdResponse>), AppError> {
    let req = extract_json(body)?;
    let id = state
        .manager
        .attach_link(Owner::new(org, req.owner), req.link, req.actor, state.deadline())
        .await?;
    Ok((StatusCode::CREATED, Json(EvidenceIdResponse { evidence_id: id })))
}

/// POST /v1/organizations/:org/evidence/detach
async fn detach(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    body: Result<Json<DetachRequest>, JsonRejection>,
) -> Result<Json<DetachResponse>, AppError> {
    let req = extract_json(body)?;
    let owner = Owner::new(org, req.owner);
    let deleted = match req.mode {
        Some(mode) => {
            state
                .manager
                .detach_with_mode(owner, req.evidence_ids, mode, state.deadline())
                .await?
        }
        None => {
            state
                .manager
                .detach(owner, req.evidence_ids, state.deadline())
                .await?
        }
    };
    Ok(Json(DetachResponse { deleted }))
}

/// GET /v1/organizations/:org/evidence/:id
async fn get_evidence(
    State(state): State<AppState>,
    Path((org, id)): Path<(OrganizationId, EvidenceId)>,
) -> Result<Json<Evidence>, AppError> {
    Ok(Json(state.manager.get_evidence(org, id)?))
}

/// PATCH /v1/organizations/:org/evidence/:id
async fn rename(
    State(state): State<AppState>,
    Path((org, id)): Path<(OrganizationId, EvidenceId)>,
    body: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<Evidence>, AppError> {
    let req = extract_validated_json(body)?;
    let context = req
        .context
        .into_iter()
        .map(|reference| Owner::new(org, reference))
        .collect();
    let evidence = state
        .manager
        .rename(org, id, req.name, context, state.deadline())
        .await?;
    Ok(Json(evidence))
}

/// POST /v1/organizations/:org/evidence/:id/tags
async fn link_tags(
    State(state): State<AppState>,
    Path((org, id)): Path<(OrganizationId, EvidenceId)>,
    body: Result<Json<LinkTagsRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let req = extract_json(body)?;
    state
        .manager
        .link_tags(org, id, req.tag_ids, req.new_tags, state.deadline())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/organizations/:org/evidence/:id/tags/unlink
async fn unlink_tags(
    State(state): State<AppState>,
    Path((org, id)): Path<(OrganizationId, EvidenceId)>,
    body: Result<Json<UnlinkTagsRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let req = extract_json(body)?;
    state
        .manager
        .unlink_tags(org, id, req.tag_ids, state.deadline())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/organizations/:org/controls/:control/tags
///
/// Replaces the control's tag set and re-propagates it to the control's
/// evidence. Returns the evidences whose tags were recomputed.
async fn reconcile_control_tags(
    State(state): State<AppState>,
    Path((org, control)): Path<(OrganizationId, ControlId)>,
    body: Result<Json<ControlTagsRequest>, JsonRejection>,
) -> Result<Json<EvidenceIdsResponse>, AppError> {
    let req = extract_json(body)?;
    let ids = state
        .manager
        .reconcile_control_tags(org, control, req.tag_ids, state.deadline())
        .await?;
    Ok(Json(EvidenceIdsResponse { evidence_ids: ids }))
}

/// GET /v1/organizations/:org/owners/:kind/evidence?owner_id=
async fn list_owner_evidence(
    State(state): State<AppState>,
    Path((org, kind)): Path<(OrganizationId, String)>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<Vec<Evidence>>, AppError> {
    let query = extract_query(query)?;
    let kind = OwnerKind::parse(&kind)
        .ok_or_else(|| AppError::bad_request(format!("unknown owner kind '{kind}'")))?;
    let reference = OwnerRef::from_parts(kind, query.owner_id)
        .ok_or_else(|| AppError::bad_request(format!("owner_id is required for {kind}")))?;
    let evidence = state.manager.list_owner_evidence(Owner::new(org, reference))?;
    Ok(Json(evidence))
}
