//! # Identifier Newtypes
//!
//! UUID-backed identifiers for every entity the core reads or writes.
//! Each identifier is a distinct type and is always valid by construction.
//!
//! Identifiers serialize as the bare hyphenated UUID string, which is also
//! their `Display` form. System tags rely on that: the tag that marks a
//! subtask back-reference is named exactly `SubtaskId::to_string()`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a UUID-backed identifier newtype with the standard constructors,
/// `Display`, `FromStr` and `From<Uuid>`.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Tenant boundary. Every other entity belongs to exactly one organization.
    OrganizationId
);
uuid_id!(
    /// A user acting on evidence (uploader, exporter, attacher).
    UserId
);
uuid_id!(
    /// An evidence artifact.
    EvidenceId
);
uuid_id!(
    /// An organization-scoped tag.
    TagId
);
uuid_id!(
    /// A compliance control.
    ControlId
);
uuid_id!(
    /// An action item; belongs to one or more controls.
    ActionItemId
);
uuid_id!(
    /// A playbook program.
    ProgramId
);
uuid_id!(
    /// A program task.
    TaskId
);
uuid_id!(
    /// A task subtask.
    SubtaskId
);
uuid_id!(
    /// A dataroom.
    DataroomId
);
uuid_id!(
    /// An organization's relationship with a vendor.
    OrgVendorId
);
uuid_id!(
    /// A folder inside the organization's drive.
    FolderId
);
uuid_id!(
    /// An organization officer.
    OfficerId
);
uuid_id!(
    /// A team of users.
    TeamId
);
uuid_id!(
    /// A policy document.
    PolicyId
);
uuid_id!(
    /// An asynchronous export request.
    ExportRequestId
);
uuid_id!(
    /// A published, expiring download link.
    LinkId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id = SubtaskId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }

    #[test]
    fn parse_round_trips_through_display() {
        let id = EvidenceId::new();
        let parsed: EvidenceId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn serializes_transparently() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&TagId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("not-a-uuid".parse::<ControlId>().is_err());
    }
}
