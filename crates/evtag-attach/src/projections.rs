//! # Projections
//!
//! Derived read models over one [`Tables`] snapshot, and the cached read
//! path in front of them. Every function here is pure; [`compute`] maps a
//! [`ProjectionKey`] to its JSON value so a cache flush can refresh any key
//! without knowing its type.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use evtag_cache::{CacheError, FlushReport, InvalidationBatch, ProjectionCache, ProjectionKey};
use evtag_core::{
    EvidenceId, EvtagError, OrganizationId, Owner, OwnerRef, ProgramId, Result, SubtaskId,
    TaskId,
};
use evtag_store::catalog::{Program, Subtask, SubtaskStatus, Task};
use evtag_store::{Database, Evidence, Tables};

/// Completion of a program's visible subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramProgress {
    /// Whole percent, rounded down.
    pub percent: u32,
    pub visible_subtasks: usize,
    pub completed_subtasks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskView {
    pub id: SubtaskId,
    pub name: String,
    pub status: SubtaskStatus,
    pub completed: bool,
}

fn evidence_in<'a>(
    tables: &'a Tables,
    organization: OrganizationId,
    evidence: &EvidenceId,
) -> Result<&'a Evidence> {
    tables
        .evidence
        .get(evidence)
        .filter(|e| e.organization == organization)
        .ok_or_else(|| EvtagError::not_found("evidence", evidence))
}

fn program_in<'a>(
    tables: &'a Tables,
    organization: OrganizationId,
    program: &ProgramId,
) -> Result<&'a Program> {
    tables
        .catalog
        .program(program)
        .filter(|p| p.organization == organization)
        .ok_or_else(|| EvtagError::not_found("program", program))
}

fn task_in<'a>(tables: &'a Tables, organization: OrganizationId, task: &TaskId) -> Result<&'a Task> {
    tables
        .catalog
        .task(task)
        .filter(|t| t.organization == organization)
        .ok_or_else(|| EvtagError::not_found("task", task))
}

/// A subtask is completed when its status says so and, if it requires
/// evidence, at least one live evidence is attached to it.
pub fn is_completed(tables: &Tables, subtask: &Subtask) -> bool {
    if subtask.status != SubtaskStatus::Completed {
        return false;
    }
    if !subtask.requires_evidence {
        return true;
    }
    let owner = Owner::new(subtask.organization, OwnerRef::Subtask(subtask.id));
    tables
        .attachments
        .evidence_of(&owner)
        .iter()
        .any(|id| tables.evidence.get(id).is_some())
}

fn program_subtasks<'a>(tables: &'a Tables, program: &ProgramId) -> Vec<&'a Subtask> {
    tables
        .catalog
        .tasks_of(program)
        .into_iter()
        .flat_map(|t| tables.catalog.subtasks_of(&t.id))
        .collect()
}

fn unlocked(tables: &Tables, subtask: &Subtask) -> bool {
    subtask.prerequisites.iter().all(|p| {
        tables
            .catalog
            .subtask(p)
            .is_some_and(|s| is_completed(tables, s))
    })
}

fn view(tables: &Tables, subtask: &Subtask) -> SubtaskView {
    SubtaskView {
        id: subtask.id,
        name: subtask.name.clone(),
        status: subtask.status,
        completed: is_completed(tables, subtask),
    }
}

pub fn manual_tags_for(
    tables: &Tables,
    organization: OrganizationId,
    evidence: &EvidenceId,
) -> Result<Vec<String>> {
    let row = evidence_in(tables, organization, evidence)?;
    Ok(tables.tags.names(&row.manual_tags))
}

/// Category, program, certification and subtask tag names reachable from
/// the evidence's subtask back-references.
pub fn doc_tags(
    tables: &Tables,
    organization: OrganizationId,
    evidence: &EvidenceId,
) -> Result<Vec<String>> {
    let row = evidence_in(tables, organization, evidence)?;
    let mut out = BTreeSet::new();
    for tag in row.system_tags.iter().filter_map(|id| tables.tags.get(id)) {
        let Ok(subtask_id) = tag.name.parse::<SubtaskId>() else {
            continue;
        };
        let Some(subtask) = tables
            .catalog
            .subtask(&subtask_id)
            .filter(|s| s.organization == organization)
        else {
            continue;
        };
        out.extend(tables.tags.names(&subtask.tags));
        if let Some(task) = tables.catalog.task(&subtask.task) {
            if !task.category.trim().is_empty() {
                out.insert(task.category.trim().to_string());
            }
            if let Some(program) = tables.catalog.program(&task.program) {
                out.insert(program.name.clone());
                out.extend(program.certifications.iter().cloned());
            }
        }
    }
    Ok(out.into_iter().collect())
}

/// Sorted tag names over every Drive evidence, system tags included.
pub fn tags_filter(tables: &Tables, organization: OrganizationId) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for id in tables.attachments.evidence_of(&Owner::drive(organization)) {
        if let Some(row) = tables.evidence.get(&id) {
            ids.extend(row.tags());
            ids.extend(row.system_tags.iter().copied());
        }
    }
    tables.tags.names(&ids)
}

pub fn program_progress(
    tables: &Tables,
    organization: OrganizationId,
    program: &ProgramId,
) -> Result<ProgramProgress> {
    program_in(tables, organization, program)?;
    let visible: Vec<&Subtask> = program_subtasks(tables, program)
        .into_iter()
        .filter(|s| s.visible)
        .collect();
    let completed = visible.iter().filter(|s| is_completed(tables, s)).count();
    let percent = if visible.is_empty() {
        0
    } else {
        (completed * 100 / visible.len()) as u32
    };
    Ok(ProgramProgress {
        percent,
        visible_subtasks: visible.len(),
        completed_subtasks: completed,
    })
}

pub fn certificates_for_program(
    tables: &Tables,
    organization: OrganizationId,
    program: &ProgramId,
) -> Result<Vec<String>> {
    let program = program_in(tables, organization, program)?;
    let mut certs = program.certifications.clone();
    certs.sort();
    certs.dedup();
    Ok(certs)
}

/// Tasks with at least one visible subtask, by name.
pub fn visible_tasks(
    tables: &Tables,
    organization: OrganizationId,
    program: &ProgramId,
) -> Result<Vec<TaskView>> {
    program_in(tables, organization, program)?;
    let mut tasks: Vec<TaskView> = tables
        .catalog
        .tasks_of(program)
        .into_iter()
        .filter(|t| tables.catalog.subtasks_of(&t.id).iter().any(|s| s.visible))
        .map(|t| TaskView {
            id: t.id,
            name: t.name.clone(),
            category: t.category.clone(),
        })
        .collect();
    tasks.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(tasks)
}

/// Visible subtasks of `task` whose prerequisites are all completed.
pub fn unlocked_subtasks_for_task(
    tables: &Tables,
    organization: OrganizationId,
    task: &TaskId,
) -> Result<Vec<SubtaskView>> {
    task_in(tables, organization, task)?;
    Ok(tables
        .catalog
        .subtasks_of(task)
        .into_iter()
        .filter(|s| s.visible && unlocked(tables, s))
        .map(|s| view(tables, s))
        .collect())
}

/// Every subtask of `task` whose prerequisites are all completed, hidden
/// ones included.
pub fn all_unlocked_subtasks_for_task(
    tables: &Tables,
    organization: OrganizationId,
    task: &TaskId,
) -> Result<Vec<SubtaskView>> {
    task_in(tables, organization, task)?;
    Ok(tables
        .catalog
        .subtasks_of(task)
        .into_iter()
        .filter(|s| unlocked(tables, s))
        .map(|s| view(tables, s))
        .collect())
}

fn json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Codec(e).into())
}

/// The JSON value of any projection.
pub fn compute(tables: &Tables, key: &ProjectionKey) -> Result<Value> {
    match *key {
        ProjectionKey::ManualTagsFor {
            organization,
            evidence,
        } => json(manual_tags_for(tables, organization, &evidence)?),
        ProjectionKey::DocTags {
            organization,
            evidence,
        } => json(doc_tags(tables, organization, &evidence)?),
        ProjectionKey::TagsFilter { organization } => json(tags_filter(tables, organization)),
        ProjectionKey::ProgramProgress {
            program,
            organization,
        } => json(program_progress(tables, organization, &program)?),
        ProjectionKey::CertificatesForProgram {
            program,
            organization,
        } => json(certificates_for_program(tables, organization, &program)?),
        ProjectionKey::VisibleTasks {
            program,
            organization,
        } => json(visible_tasks(tables, organization, &program)?),
        ProjectionKey::UnlockedSubtasksForTask { task, organization } => {
            json(unlocked_subtasks_for_task(tables, organization, &task)?)
        }
        ProjectionKey::AllUnlockedSubtasksForTask { task, organization } => {
            json(all_unlocked_subtasks_for_task(tables, organization, &task)?)
        }
    }
}

/// Cached projection reads against the live database.
#[derive(Debug, Clone)]
pub struct Projections {
    db: Arc<Database>,
    cache: Arc<ProjectionCache>,
}

impl Projections {
    pub fn new(db: Arc<Database>, cache: Arc<ProjectionCache>) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &ProjectionCache {
        &self.cache
    }

    /// Apply a committed batch. Each refreshed key reads the snapshot current
    /// once its lock is held.
    pub async fn flush(&self, batch: InvalidationBatch) -> FlushReport {
        if batch.is_empty() {
            return FlushReport::default();
        }
        let report = self
            .cache
            .flush(batch, |key| compute(&self.db.snapshot(), key))
            .await;
        tracing::debug!(
            refreshed = report.refreshed,
            deleted = report.deleted,
            failed = report.failed,
            "projection invalidations flushed"
        );
        report
    }

    pub async fn manual_tags_for(
        &self,
        organization: OrganizationId,
        evidence: EvidenceId,
        force_update: bool,
    ) -> Result<Vec<String>> {
        let key = ProjectionKey::ManualTagsFor {
            organization,
            evidence,
        };
        self.cache
            .get_or_compute(&key, force_update, || {
                manual_tags_for(&self.db.snapshot(), organization, &evidence)
            })
            .await
    }

    pub async fn doc_tags(
        &self,
        organization: OrganizationId,
        evidence: EvidenceId,
        force_update: bool,
    ) -> Result<Vec<String>> {
        let key = ProjectionKey::DocTags {
            organization,
            evidence,
        };
        self.cache
            .get_or_compute(&key, force_update, || {
                doc_tags(&self.db.snapshot(), organization, &evidence)
            })
            .await
    }

    pub async fn tags_filter(
        &self,
        organization: OrganizationId,
        force_update: bool,
    ) -> Result<Vec<String>> {
        let key = ProjectionKey::TagsFilter { organization };
        self.cache
            .get_or_compute(&key, force_update, || {
                Ok(tags_filter(&self.db.snapshot(), organization))
            })
            .await
    }

    pub async fn program_progress(
        &self,
        organization: OrganizationId,
        program: ProgramId,
        force_update: bool,
    ) -> Result<ProgramProgress> {
        let key = ProjectionKey::ProgramProgress {
            program,
            organization,
        };
        self.cache
            .get_or_compute(&key, force_update, || {
                program_progress(&self.db.snapshot(), organization, &program)
            })
            .await
    }

    pub async fn certificates_for_program(
        &self,
        organization: OrganizationId,
        program: ProgramId,
        force_update: bool,
    ) -> Result<Vec<String>> {
        let key = ProjectionKey::CertificatesForProgram {
            program,
            organization,
        };
        self.cache
            .get_or_compute(&key, force_update, || {
                certificates_for_program(&self.db.snapshot(), organization, &program)
            })
            .await
    }

    pub async fn visible_tasks(
        &self,
        organization: OrganizationId,
        program: ProgramId,
        force_update: bool,
    ) -> Result<Vec<TaskView>> {
        let key = ProjectionKey::VisibleTasks {
            program,
            organization,
        };
        self.cache
            .get_or_compute(&key, force_update, || {
                visible_tasks(&self.db.snapshot(), organization, &program)
            })
            .await
    }

    pub async fn unlocked_subtasks_for_task(
        &self,
        organization: OrganizationId,
        task: TaskId,
        force_update: bool,
    ) -> Result<Vec<SubtaskView>> {
        let key = ProjectionKey::UnlockedSubtasksForTask { task, organization };
        self.cache
            .get_or_compute(&key, force_update, || {
                unlocked_subtasks_for_task(&self.db.snapshot(), organization, &task)
            })
            .await
    }

    pub async fn all_unlocked_subtasks_for_task(
        &self,
        organization: OrganizationId,
        task: TaskId,
        force_update: bool,
    ) -> Result<Vec<SubtaskView>> {
        let key = ProjectionKey::AllUnlockedSubtasksForTask { task, organization };
        self.cache
            .get_or_compute(&key, force_update, || {
                all_unlocked_subtasks_for_task(&self.db.snapshot(), organization, &task)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use evtag_store::Attachment;

    fn complete(fx: &mut Fixture, subtask: SubtaskId) {
        fx.tables
            .catalog
            .set_subtask_status(&subtask, SubtaskStatus::Completed);
    }

    #[test]
    fn completion_requires_evidence_when_flagged() {
        let mut fx = Fixture::new();
        let (program, _, subtask) = fx.subtask("Governance", &[]);
        complete(&mut fx, subtask);

        let progress = program_progress(&fx.tables, fx.org, &program).unwrap();
        assert_eq!(progress.completed_subtasks, 0);
        assert_eq!(progress.percent, 0);

        let e = fx.evidence("proof.pdf");
        let owner = fx.owner(OwnerRef::Subtask(subtask));
        fx.tables.attachments.insert(Attachment::new(owner, e, None));
        let progress = program_progress(&fx.tables, fx.org, &program).unwrap();
        assert_eq!(
            progress,
            ProgramProgress {
                percent: 100,
                visible_subtasks: 1,
                completed_subtasks: 1
            }
        );
    }

    #[test]
    fn hidden_subtasks_are_excluded_from_progress_and_unlocked_list() {
        let mut fx = Fixture::new();
        let (program, task, first) = fx.subtask("Governance", &[]);
        let hidden = fx.subtask_in(task);
        if let Some(mut s) = fx.tables.catalog.subtask(&hidden).cloned() {
            s.visible = false;
            fx.tables.put_subtask(s).unwrap();
        }
        let progress = program_progress(&fx.tables, fx.org, &program).unwrap();
        assert_eq!(progress.visible_subtasks, 1);

        let unlocked: Vec<SubtaskId> = unlocked_subtasks_for_task(&fx.tables, fx.org, &task)
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(unlocked, vec![first]);
        assert_eq!(
            all_unlocked_subtasks_for_task(&fx.tables, fx.org, &task)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn prerequisites_gate_unlocking() {
        let mut fx = Fixture::new();
        let (_, task, first) = fx.subtask("Governance", &[]);
        let second = fx.subtask_in(task);
        if let Some(mut s) = fx.tables.catalog.subtask(&second).cloned() {
            s.prerequisites = BTreeSet::from([first]);
            s.requires_evidence = false;
            fx.tables.put_subtask(s).unwrap();
        }
        let ids = |fx: &Fixture| -> Vec<SubtaskId> {
            unlocked_subtasks_for_task(&fx.tables, fx.org, &task)
                .unwrap()
                .into_iter()
                .map(|s| s.id)
                .collect()
        };
        assert_eq!(ids(&fx), vec![first]);

        if let Some(mut s) = fx.tables.catalog.subtask(&first).cloned() {
            s.requires_evidence = false;
            s.status = SubtaskStatus::Completed;
            fx.tables.put_subtask(s).unwrap();
        }
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(ids(&fx), expected);
    }

    #[test]
    fn doc_tags_follow_subtask_back_references() {
        let mut fx = Fixture::new();
        let (_, _, subtask) = fx.subtask("Governance", &["board"]);
        let e = fx.evidence("minutes.pdf");
        let sys = fx.tag(&subtask.to_string());
        if let Some(row) = fx.tables.evidence.get_mut(&e) {
            row.system_tags.insert(sys);
        }
        assert_eq!(
            doc_tags(&fx.tables, fx.org, &e).unwrap(),
            ["Governance", "SOC 2", "SOC 2 Type II", "board"]
        );
    }

    #[test]
    fn tags_filter_is_sorted_and_covers_drive_only() {
        let mut fx = Fixture::new();
        let in_drive = fx.evidence("a.pdf");
        let (zeta, alpha) = (fx.tag("zeta"), fx.tag("alpha"));
        if let Some(row) = fx.tables.evidence.get_mut(&in_drive) {
            row.manual_tags.insert(zeta);
            row.propagated_tags.insert(alpha);
        }
        let outside = fx.evidence("b.pdf");
        let hidden = fx.tag("hidden");
        if let Some(row) = fx.tables.evidence.get_mut(&outside) {
            row.manual_tags.insert(hidden);
        }
        fx.tables.attachments.remove(&Owner::drive(fx.org), &outside);
        assert_eq!(tags_filter(&fx.tables, fx.org), ["alpha", "zeta"]);
    }

    #[test]
    fn foreign_program_is_not_found() {
        let mut fx = Fixture::new();
        let (program, _, _) = fx.subtask("Governance", &[]);
        let err = program_progress(&fx.tables, OrganizationId::new(), &program).unwrap_err();
        assert!(matches!(err, EvtagError::NotFound { entity: "program", .. }));
    }

    #[tokio::test]
    async fn cached_read_is_stale_until_forced() {
        let mut fx = Fixture::new();
        let e = fx.evidence("a.pdf");
        let org = fx.org;
        let db = Arc::new(fx.into_database());
        let cache = Arc::new(ProjectionCache::new(
            Arc::new(evtag_cache::MemoryBackend::new()),
            std::time::Duration::from_secs(60),
        ));
        let projections = Projections::new(Arc::clone(&db), cache);
        assert!(projections.tags_filter(org, false).await.unwrap().is_empty());

        db.transaction("tag", evtag_core::Deadline::after(std::time::Duration::from_secs(5)), |t| {
            let tag = t.tags.get_or_create(org, "fresh", true)?;
            if let Some(row) = t.evidence.get_mut(&e) {
                row.manual_tags.insert(tag.id);
            }
            Ok(())
        })
        .unwrap();

        assert!(projections.tags_filter(org, false).await.unwrap().is_empty());
        assert_eq!(projections.tags_filter(org, true).await.unwrap(), ["fresh"]);
    }
}
