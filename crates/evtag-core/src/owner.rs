//! # Owner References
//!
//! An owner is anything that cites evidence. Rather than one type per owner,
//! the core uses a single tagged variant, [`OwnerRef`], and pins it to a
//! tenant with [`Owner`]. Behaviour that differs per owner kind (which tags
//! flow to evidence, whether drive membership is implied) is looked up from
//! the kind by the attachment manager.

use serde::{Deserialize, Serialize};

use crate::ids::{ActionItemId, ControlId, DataroomId, FolderId, OrgVendorId, OrganizationId, SubtaskId};
use crate::kind::EvidenceKind;

/// The recognized owner kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerKind {
    /// The organization's drive. Singleton per organization.
    Drive,
    /// A folder inside the drive.
    Folder,
    /// A compliance control.
    Control,
    /// An action item.
    ActionItem,
    /// A playbook subtask.
    Subtask,
    /// A dataroom.
    Dataroom,
    /// An organization vendor.
    OrgVendor,
}

impl OwnerKind {
    /// All owner kinds.
    pub fn all() -> &'static [OwnerKind] {
        &[
            Self::Drive,
            Self::Folder,
            Self::Control,
            Self::ActionItem,
            Self::Subtask,
            Self::Dataroom,
            Self::OrgVendor,
        ]
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drive => "DRIVE",
            Self::Folder => "FOLDER",
            Self::Control => "CONTROL",
            Self::ActionItem => "ACTION_ITEM",
            Self::Subtask => "SUBTASK",
            Self::Dataroom => "DATAROOM",
            Self::OrgVendor => "ORG_VENDOR",
        }
    }

    /// Parse the wire representation, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase().replace('-', "_");
        Self::all().iter().copied().find(|k| k.as_str() == upper)
    }

    /// Whether this kind of owner may hold evidence of the given kind.
    ///
    /// LEGACY evidence is lineage only and is never attachable. LINK
    /// evidence lives on its owner and never enters the drive or its folders.
    pub fn accepts(&self, kind: EvidenceKind) -> bool {
        match kind {
            EvidenceKind::Legacy => false,
            EvidenceKind::Link => !matches!(self, Self::Drive | Self::Folder),
            _ => true,
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to one owner, without its organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerRef {
    /// The organization's drive; the organization identifies it.
    Drive,
    /// A drive folder.
    Folder(FolderId),
    /// A control.
    Control(ControlId),
    /// An action item.
    ActionItem(ActionItemId),
    /// A subtask.
    Subtask(SubtaskId),
    /// A dataroom.
    Dataroom(DataroomId),
    /// An organization vendor.
    OrgVendor(OrgVendorId),
}

impl OwnerRef {
    /// The kind of this owner.
    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::Drive => OwnerKind::Drive,
            Self::Folder(_) => OwnerKind::Folder,
            Self::Control(_) => OwnerKind::Control,
            Self::ActionItem(_) => OwnerKind::ActionItem,
            Self::Subtask(_) => OwnerKind::Subtask,
            Self::Dataroom(_) => OwnerKind::Dataroom,
            Self::OrgVendor(_) => OwnerKind::OrgVendor,
        }
    }

    /// Build a reference from a kind and a raw identifier.
    ///
    /// The identifier is ignored for [`OwnerKind::Drive`] and required for
    /// every other kind.
    pub fn from_parts(kind: OwnerKind, id: Option<uuid::Uuid>) -> Option<Self> {
        match (kind, id) {
            (OwnerKind::Drive, _) => Some(Self::Drive),
            (OwnerKind::Folder, Some(id)) => Some(Self::Folder(id.into())),
            (OwnerKind::Control, Some(id)) => Some(Self::Control(id.into())),
            (OwnerKind::ActionItem, Some(id)) => Some(Self::ActionItem(id.into())),
            (OwnerKind::Subtask, Some(id)) => Some(Self::Subtask(id.into())),
            (OwnerKind::Dataroom, Some(id)) => Some(Self::Dataroom(id.into())),
            (OwnerKind::OrgVendor, Some(id)) => Some(Self::OrgVendor(id.into())),
            (_, None) => None,
        }
    }

    /// The raw identifier, if this kind has one.
    pub fn raw_id(&self) -> Option<uuid::Uuid> {
        match self {
            Self::Drive => None,
            Self::Folder(id) => Some(*id.as_uuid()),
            Self::Control(id) => Some(*id.as_uuid()),
            Self::ActionItem(id) => Some(*id.as_uuid()),
            Self::Subtask(id) => Some(*id.as_uuid()),
            Self::Dataroom(id) => Some(*id.as_uuid()),
            Self::OrgVendor(id) => Some(*id.as_uuid()),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.raw_id() {
            Some(id) => write!(f, "{}:{id}", self.kind()),
            None => write!(f, "{}", self.kind()),
        }
    }
}

/// An owner pinned to its organization: `(OwnerKind, OwnerId, Organization)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner {
    /// Tenant the owner belongs to.
    pub organization: OrganizationId,
    /// Which owner.
    pub reference: OwnerRef,
}

impl Owner {
    /// Pin a reference to an organization.
    pub fn new(organization: OrganizationId, reference: OwnerRef) -> Self {
        Self {
            organization,
            reference,
        }
    }

    /// The organization's drive.
    pub fn drive(organization: OrganizationId) -> Self {
        Self::new(organization, OwnerRef::Drive)
    }

    /// The kind of this owner.
    pub fn kind(&self) -> OwnerKind {
        self.reference.kind()
    }

    /// Whether this owner is the organization's drive.
    pub fn is_drive(&self) -> bool {
        matches!(self.reference, OwnerRef::Drive)
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.reference, self.organization)
    }
}
