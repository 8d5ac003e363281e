//! # Export Request State Machine
//!
//! ```text
//!  CREATED ──start──▶ PACKAGING ──ok──▶ DELIVERED
//!                        │
//!                        └──err──▶ FAILED(errors)
//! ```
//!
//! `DELIVERED` and `FAILED` are terminal. `delivered` only ever moves from
//! `false` to `true`, and only through [`ExportRequest::deliver`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evtag_core::{
    DataroomId, EvidenceId, EvidenceKind, ExportRequestId, LinkId, OrganizationId, Owner,
    OwnerRef, PolicyId, UserId,
};
use evtag_store::{BlobRef, Evidence};

use crate::error::TransitionError;

/// What an export packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "scope_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportScope {
    Dataroom(DataroomId),
    Drive,
}

impl ExportScope {
    pub fn owner(&self, organization: OrganizationId) -> Owner {
        match self {
            Self::Dataroom(id) => Owner::new(organization, OwnerRef::Dataroom(*id)),
            Self::Drive => Owner::drive(organization),
        }
    }
}

/// Lifecycle phase of an export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportState {
    Created,
    Packaging,
    Delivered,
    Failed,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Packaging => "PACKAGING",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [Self::Created, Self::Packaging, Self::Delivered, Self::Failed]
            .into_iter()
            .find(|state| state.as_str() == s)
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evidence frozen at request creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportItem {
    pub evidence: EvidenceId,
    pub name: String,
    pub kind: EvidenceKind,
    pub file: Option<BlobRef>,
    pub policy: Option<PolicyId>,
}

impl From<&Evidence> for ExportItem {
    fn from(e: &Evidence) -> Self {
        Self {
            evidence: e.id,
            name: e.name.clone(),
            kind: e.kind,
            file: e.file.clone(),
            policy: e.policy_ref,
        }
    }
}

/// Input to [`Exporter::create`](crate::Exporter::create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExport {
    pub organization: OrganizationId,
    #[serde(flatten)]
    pub scope: ExportScope,
    /// Restrict the export to these evidences. They must be in scope.
    #[serde(default)]
    pub evidence_ids: Option<Vec<EvidenceId>>,
    pub time_zone: String,
    #[serde(default)]
    pub requested_by: Option<UserId>,
    /// Address the download link is mailed to.
    pub notify: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub id: ExportRequestId,
    pub organization: OrganizationId,
    pub scope: ExportScope,
    pub items: Vec<ExportItem>,
    pub time_zone: String,
    pub requested_by: Option<UserId>,
    pub notify: String,
    pub state: ExportState,
    pub delivered: bool,
    pub errors: Option<String>,
    pub link: Option<LinkId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExportRequest {
    pub fn new(new: NewExport, items: Vec<ExportItem>) -> Self {
        let now = Utc::now();
        Self {
            id: ExportRequestId::new(),
            organization: new.organization,
            scope: new.scope,
            items,
            time_zone: new.time_zone,
            requested_by: new.requested_by,
            notify: new.notify,
            state: ExportState::Created,
            delivered: false,
            errors: None,
            link: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: ExportState) -> Result<(), TransitionError> {
        let allowed = matches!(
            (self.state, to),
            (ExportState::Created, ExportState::Packaging)
                | (ExportState::Packaging, ExportState::Delivered)
                | (ExportState::Packaging, ExportState::Failed)
        );
        if !allowed {
            return Err(TransitionError {
                request: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Claim the request for packaging.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(ExportState::Packaging)
    }

    pub fn deliver(&mut self, link: LinkId) -> Result<(), TransitionError> {
        self.transition(ExportState::Delivered)?;
        self.delivered = true;
        self.link = Some(link);
        Ok(())
    }

    pub fn fail(&mut self, errors: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ExportState::Failed)?;
        self.errors = Some(errors.into());
        Ok(())
    }
}
