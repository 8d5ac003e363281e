//! # Catalog Seeding
//!
//! Loads the externally owned catalog (organizations, controls, programs,
//! owners, officers, teams, policies) from a YAML file at startup. The
//! core never authors these records; in production they come from the
//! integrations layer, which writes the same shapes.
//!
//! Tags named by the seed are created through the tag registry, so they
//! are persisted like any other tag. A seed tag whose `(organization,
//! name)` already exists is mapped onto the existing row.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use evtag_core::{Deadline, EvtagError, OrganizationId, TagId};
use evtag_store::catalog::{
    ActionItem, Control, Dataroom, Folder, Officer, OrgVendor, Organization, Policy, Program,
    Subtask, Task, Team,
};
use evtag_store::{Database, Tables, Tag};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("catalog rejected: {0}")]
    Rejected(#[from] EvtagError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTag {
    pub id: TagId,
    pub organization: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub is_manual: bool,
}

/// One catalog file. Records are applied in field order; subtasks must
/// list their prerequisites first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSeed {
    pub organizations: Vec<Organization>,
    pub tags: Vec<SeedTag>,
    pub action_items: Vec<ActionItem>,
    pub controls: Vec<Control>,
    pub programs: Vec<Program>,
    pub tasks: Vec<Task>,
    pub subtasks: Vec<Subtask>,
    pub datarooms: Vec<Dataroom>,
    pub org_vendors: Vec<OrgVendor>,
    pub folders: Vec<Folder>,
    pub officers: Vec<Officer>,
    pub teams: Vec<Team>,
    pub policies: Vec<Policy>,
}

impl CatalogSeed {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Write every record in one transaction.
    pub fn apply(self, db: &Database) -> Result<(), SeedError> {
        let organizations = self.organizations.len();
        db.transaction(
            "seed_catalog",
            Deadline::after(Duration::from_secs(30)),
            |tables| self.write(tables),
        )?;
        tracing::info!(organizations, "catalog seeded");
        Ok(())
    }

    fn write(self, tables: &mut Tables) -> evtag_core::Result<()> {
        for organization in self.organizations {
            tables.put_organization(organization);
        }

        let mut tag_ids: BTreeMap<TagId, TagId> = BTreeMap::new();
        for seed in self.tags {
            let id = match tables.tags.find(seed.organization, &seed.name) {
                Some(existing) => existing.id,
                None => {
                    let tag = Tag {
                        id: seed.id,
                        organization: seed.organization,
                        name: seed.name.clone(),
                        is_manual: seed.is_manual,
                        created_at: Utc::now(),
                    };
                    tables.tags.try_insert(tag).map_err(|v| EvtagError::Conflict {
                        constraint: "tags_organization_name_key",
                        key: v.existing.to_string(),
                    })?;
                    seed.id
                }
            };
            tag_ids.insert(seed.id, id);
        }
        let remap = |tags: BTreeSet<TagId>| -> BTreeSet<TagId> {
            tags.into_iter()
                .map(|t| tag_ids.get(&t).copied().unwrap_or(t))
                .collect()
        };

        for item in self.action_items {
            tables.put_action_item(item)?;
        }
        for mut control in self.controls {
            control.tags = remap(control.tags);
            tables.put_control(control)?;
        }
        for program in self.programs {
            tables.put_program(program)?;
        }
        for task in self.tasks {
            tables.put_task(task)?;
        }
        for mut subtask in self.subtasks {
            subtask.tags = remap(subtask.tags);
            tables.put_subtask(subtask)?;
        }
        for dataroom in self.datarooms {
            tables.put_dataroom(dataroom)?;
        }
        for vendor in self.org_vendors {
            tables.put_org_vendor(vendor)?;
        }
        for folder in self.folders {
            tables.put_folder(folder)?;
        }
        for officer in self.officers {
            tables.put_officer(officer)?;
        }
        for team in self.teams {
            tables.put_team(team)?;
        }
        for policy in self.policies {
            tables.put_policy(policy)?;
        }
        Ok(())
    }
}
