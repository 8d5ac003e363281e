//! # Projection Keys
//!
//! Each projection has a typed key whose [`Display`](std::fmt::Display)
//! form is the cache name used by every backend.

use serde::{Deserialize, Serialize};

use evtag_core::{EvidenceId, OrganizationId, ProgramId, TaskId};

/// A memoized projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "projection", rename_all = "snake_case")]
pub enum ProjectionKey {
    /// Effective manual tags of one evidence.
    ManualTagsFor {
        organization: OrganizationId,
        evidence: EvidenceId,
    },
    /// Playbook, certification and related tags derived from system tags.
    DocTags {
        organization: OrganizationId,
        evidence: EvidenceId,
    },
    /// Alphabetized tag names over all Drive evidence.
    TagsFilter { organization: OrganizationId },
    /// `(percent, visible_subtasks, completed_subtasks)`.
    ProgramProgress {
        program: ProgramId,
        organization: OrganizationId,
    },
    CertificatesForProgram {
        program: ProgramId,
        organization: OrganizationId,
    },
    VisibleTasks {
        program: ProgramId,
        organization: OrganizationId,
    },
    /// Visible subtasks whose prerequisites are all completed.
    UnlockedSubtasksForTask {
        task: TaskId,
        organization: OrganizationId,
    },
    /// Every subtask whose prerequisites are all completed.
    AllUnlockedSubtasksForTask {
        task: TaskId,
        organization: OrganizationId,
    },
}

impl ProjectionKey {
    /// The organization the projection belongs to.
    pub fn organization(&self) -> OrganizationId {
        match *self {
            Self::ManualTagsFor { organization, .. }
            | Self::DocTags { organization, .. }
            | Self::TagsFilter { organization }
            | Self::ProgramProgress { organization, .. }
            | Self::CertificatesForProgram { organization, .. }
            | Self::VisibleTasks { organization, .. }
            | Self::UnlockedSubtasksForTask { organization, .. }
            | Self::AllUnlockedSubtasksForTask { organization, .. } => organization,
        }
    }

    /// The cache name, e.g. `tags_filter_<org>`.
    pub fn cache_name(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ProjectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManualTagsFor {
                organization,
                evidence,
            } => write!(f, "manual_tags_for_{organization}_{evidence}"),
            Self::DocTags {
                organization,
                evidence,
            } => write!(f, "doc_tags_{organization}_{evidence}"),
            Self::TagsFilter { organization } => write!(f, "tags_filter_{organization}"),
            Self::ProgramProgress {
                program,
                organization,
            } => write!(f, "program_progress_{program}_organization_{organization}"),
            Self::CertificatesForProgram {
                program,
                organization,
            } => write!(f, "certificates_for_program_{program}_organization_{organization}"),
            Self::VisibleTasks {
                program,
                organization,
            } => write!(f, "visible_tasks_{program}_organization_{organization}"),
            Self::UnlockedSubtasksForTask { task, organization } => {
                write!(f, "unlocked_subtasks_for_task_{task}_organization_{organization}")
            }
            Self::AllUnlockedSubtasksForTask { task, organization } => {
                write!(f, "all_unlocked_subtasks_for_task_{task}_organization_{organization}")
            }
        }
    }
}
