//! # Evidence Kinds

use serde::{Deserialize, Serialize};

/// The fixed set of evidence kinds.
///
/// `(name, kind)` is the uniqueness key inside an owner scope, so a FILE
/// and a PAPER may share a visible name while two FILEs may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceKind {
    /// An uploaded file.
    File,
    /// A rich-text note stored as HTML with the `.laikapaper` extension.
    Paper,
    /// A published policy, rendered to PDF on demand.
    Policy,
    /// A PDF summary of organization officers.
    Officer,
    /// A PDF summary of one team's members.
    Team,
    /// An external URL.
    Link,
    /// Migration lineage record. Never attachable.
    Legacy,
}

impl EvidenceKind {
    /// All kinds, in declaration order.
    pub fn all() -> &'static [EvidenceKind] {
        &[
            Self::File,
            Self::Paper,
            Self::Policy,
            Self::Officer,
            Self::Team,
            Self::Link,
            Self::Legacy,
        ]
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Paper => "PAPER",
            Self::Policy => "POLICY",
            Self::Officer => "OFFICER",
            Self::Team => "TEAM",
            Self::Link => "LINK",
            Self::Legacy => "LEGACY",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.as_str() == s)
    }

    /// Whether evidence of this kind joins the organization's drive when it is
    /// attached to any other owner.
    pub fn joins_drive(&self) -> bool {
        !matches!(self, Self::Link | Self::Legacy)
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How evidence is removed once no owner references it any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Stamp `deleted_at`; the row stays for audit but is hidden from reads.
    Soft,
    /// Remove the row.
    #[default]
    Hard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_every_wire_name() {
        for kind in EvidenceKind::all() {
            assert_eq!(EvidenceKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(EvidenceKind::parse("file"), None);
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&EvidenceKind::Officer).unwrap();
        assert_eq!(json, "\"OFFICER\"");
    }

    #[test]
    fn links_do_not_join_drive() {
        assert!(EvidenceKind::File.joins_drive());
        assert!(EvidenceKind::Policy.joins_drive());
        assert!(!EvidenceKind::Link.joins_drive());
    }
}
