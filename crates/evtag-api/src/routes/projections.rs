//! # Projection Read API
//!
//! Cached read models. Every endpoint accepts `?force_update=true` to
//! recompute and rewrite the cache entry before answering.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use evtag_attach::{ProgramProgress, SubtaskView, TaskView};
use evtag_core::{EvidenceId, OrganizationId, ProgramId, TaskId};

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProjectionQuery {
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubtaskQuery {
    #[serde(default)]
    pub force_update: bool,
    /// Include hidden subtasks.
    #[serde(default)]
    pub all: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/organizations/:org/tags/filter", get(tags_filter))
        .route(
            "/v1/organizations/:org/evidence/:id/manual-tags",
            get(manual_tags),
        )
        .route("/v1/organizations/:org/evidence/:id/doc-tags", get(doc_tags))
        .route(
            "/v1/organizations/:org/programs/:program/progress",
            get(program_progress),
        )
        .route(
            "/v1/organizations/:org/programs/:program/certificates",
            get(certificates),
        )
        .route(
            "/v1/organizations/:org/programs/:program/tasks",
            get(visible_tasks),
        )
        .route(
            "/v1/organizations/:org/tasks/:task/subtasks",
            get(unlocked_subtasks),
        )
}

/// GET /v1/organizations/:org/tags/filter
async fn tags_filter(
    State(state): State<AppState>,
    Path(org): Path<OrganizationId>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, AppError> {
    let q = extract_query(query)?;
    let tags = state
        .manager
        .projections()
        .tags_filter(org, q.force_update)
        .await?;
    Ok(Json(tags))
}

/// GET /v1/organizations/:org/evidence/:id/manual-tags
async fn manual_tags(
    State(state): State<AppState>,
    Path((org, id)): Path<(OrganizationId, EvidenceId)>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, AppError> {
    let q = extract_query(query)?;
    let tags = state
        .manager
        .projections()
        .manual_tags_for(org, id, q.force_update)
        .await?;
    Ok(Json(tags))
}

/// GET /v1/organizations/:org/evidence/:id/doc-tags
async fn doc_tags(
    State(state): State<AppState>,
    Path((org, id)): Path<(OrganizationId, EvidenceId)>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, AppError> {
    let q = extract_query(query)?;
    let tags = state
        .manager
        .projections()
        .doc_tags(org, id, q.force_update)
        .await?;
    Ok(Json(tags))
}

/// GET /v1/organizations/:org/programs/:program/progress
async fn program_progress(
    State(state): State<AppState>,
    Path((org, program)): Path<(OrganizationId, ProgramId)>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> Result<Json<ProgramProgress>, AppError> {
    let q = extract_query(query)?;
    let progress = state
        .manager
        .projections()
        .program_progress(org, program, q.force_update)
        .await?;
    Ok(Json(progress))
}

/// GET /v1/organizations/:org/programs/:program/certificates
async fn certificates(
    State(state): State<AppState>,
    Path((org, program)): Path<(OrganizationId, ProgramId)>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, AppError> {
    let q = extract_query(query)?;
    let names = state
        .manager
        .projections()
        .certificates_for_program(org, program, q.force_update)
        .await?;
    Ok(Json(names))
}

/// GET /v1/organizations/:org/programs/:program/tasks
async fn visible_tasks(
    State(state): State<AppState>,
    Path((org, program)): Path<(OrganizationId, ProgramId)>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> Result<Json<Vec<TaskView>>, AppError> {
    let q = extract_query(query)?;
    let tasks = state
        .manager
        .projections()
        .visible_tasks(org, program, q.force_update)
        .await?;
    Ok(Json(tasks))
}

/// GET /v1/organizations/:org/tasks/:task/subtasks?all=
async fn unlocked_subtasks(
    State(state): State<AppState>,
    Path((org, task)): Path<(OrganizationId, TaskId)>,
    query: Result<Query<SubtaskQuery>, QueryRejection>,
) -> Result<Json<Vec<SubtaskView>>, AppError> {
    let q = extract_query(query)?;
    let projections = state.manager.projections();
    let subtasks = if q.all {
        projections
            .all_unlocked_subtasks_for_task(org, task, q.force_update)
            .await?
    } else {
        projections
            .unlocked_subtasks_for_task(org, task, q.force_update)
            .await?
    };
    Ok(Json(subtasks))
}
