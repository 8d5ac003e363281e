//! # Kind-Specific Synthesis
//!
//! Pure constructors for the evidence kinds that are generated rather than
//! uploaded. Each returns a [`Synthesized`] value describing the name, the
//! bytes to store (if any) and the searchable text; persisting it is the
//! caller's job.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use evtag_core::{timestamp_suffix, EvidenceKind, PolicyId, Result, ValidationError};

use crate::catalog::{Officer, Policy, Team};
use crate::render::{Document, DocumentRenderer};

/// Extension used for stored paper notes.
pub const PAPER_EXTENSION: &str = ".laikapaper";

/// A generated evidence artifact, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub name: String,
    pub kind: EvidenceKind,
    /// Bytes to store. `None` for virtual evidence.
    pub bytes: Option<Vec<u8>>,
    pub content_type: &'static str,
    pub evidence_text: Option<String>,
    pub policy_ref: Option<PolicyId>,
}

/// A paper note: HTML stored as-is under `<title>.laikapaper`.
pub fn paper(title: &str, html_body: &str) -> Result<Synthesized> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    let text = html_to_text(html_body);
    Ok(Synthesized {
        name: format!("{title}{PAPER_EXTENSION}"),
        kind: EvidenceKind::Paper,
        bytes: Some(html_body.as_bytes().to_vec()),
        content_type: "text/html",
        evidence_text: (!text.is_empty()).then_some(text),
        policy_ref: None,
    })
}

/// One PDF listing `officers`, named `Officers Details_<timestamp>.pdf`.
pub fn officers(
    officers: &[&Officer],
    now: DateTime<Utc>,
    tz: Tz,
    renderer: &dyn DocumentRenderer,
) -> Result<Synthesized> {
    let lines = officers
        .iter()
        .map(|o| format!("{} - {} <{}>", o.name, o.title, o.email))
        .collect();
    let bytes = renderer.render(&Document {
        title: "Officers Details".to_string(),
        lines,
    })?;
    Ok(Synthesized {
        name: format!("Officers Details_{}.pdf", timestamp_suffix(now, tz)),
        kind: EvidenceKind::Officer,
        bytes: Some(bytes),
        content_type: "application/pdf",
        evidence_text: None,
        policy_ref: None,
    })
}

/// One PDF listing a team's members, named `<TeamName>_<timestamp>.pdf`.
pub fn team(
    team: &Team,
    now: DateTime<Utc>,
    tz: Tz,
    renderer: &dyn DocumentRenderer,
) -> Result<Synthesized> {
    let lines = team
        .members
        .iter()
        .map(|m| format!("{} - {} <{}>", m.name, m.role, m.email))
        .collect();
    let bytes = renderer.render(&Document {
        title: team.name.clone(),
        lines,
    })?;
    Ok(Synthesized {
        name: format!("{}_{}.pdf", team.name.trim(), timestamp_suffix(now, tz)),
        kind: EvidenceKind::Team,
        bytes: Some(bytes),
        content_type: "application/pdf",
        evidence_text: None,
        policy_ref: None,
    })
}

/// A virtual policy evidence. The PDF is rendered from the published
/// version only when exported.
pub fn policy(policy: &Policy) -> Synthesized {
    Synthesized {
        name: policy.display_name.trim().to_string(),
        kind: EvidenceKind::Policy,
        bytes: None,
        content_type: "application/pdf",
        evidence_text: policy
            .published_version
            .as_ref()
            .map(|v| html_to_text(&v.html))
            .filter(|t| !t.is_empty()),
        policy_ref: Some(policy.id),
    }
}

/// Tags whose end (or, for `br`, whose occurrence) starts a new line.
const BLOCK_TAGS: &[&str] = &[
    "br", "/p", "/div", "/li", "/tr", "/h1", "/h2", "/h3", "/h4", "/h5", "/h6", "/blockquote",
    "/pre",
];

/// Strip markup from an HTML body, keeping one line per block element.
pub fn html_to_text(html: &str) -> String {
    let mut raw = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        raw.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..close]
            .trim()
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if BLOCK_TAGS.contains(&tag.as_str()) {
            raw.push('\n');
        }
        rest = &after[close + 1..];
    }
    raw.push_str(rest);

    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PolicyVersion, TeamMember};
    use crate::render::PlainPdfRenderer;
    use chrono::TimeZone;
    use evtag_core::{OfficerId, OrganizationId, TeamId};

    #[test]
    fn paper_keeps_html_and_indexes_text() {
        let s = paper("  Board minutes ", "<p>Quorum &amp; vote</p><p>Adjourned</p>").unwrap();
        assert_eq!(s.name, "Board minutes.laikapaper");
        assert_eq!(s.kind, EvidenceKind::Paper);
        assert_eq!(s.bytes.as_deref(), Some("<p>Quorum &amp; vote</p><p>Adjourned</p>".as_bytes()));
        assert_eq!(s.evidence_text.as_deref(), Some("Quorum & vote\nAdjourned"));
    }

    #[test]
    fn paper_requires_a_title() {
        assert!(paper("  ", "<p>x</p>").is_err());
    }

    #[test]
    fn officer_pdf_name_uses_local_time() {
        let org = OrganizationId::new();
        let officer = Officer {
            id: OfficerId::new(),
            organization: org,
            name: "Ada".into(),
            title: "CEO".into(),
            email: "ada@example.com".into(),
        };
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 16, 30, 0).unwrap();
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let s = officers(&[&officer], now, tz, &PlainPdfRenderer).unwrap();
        assert_eq!(s.name, "Officers Details_2024_07_01_18_30.pdf");
        assert!(s.bytes.unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn team_pdf_is_named_after_team() {
        let t = Team {
            id: TeamId::new(),
            organization: OrganizationId::new(),
            name: "Platform".into(),
            members: vec![TeamMember {
                name: "Lin".into(),
                email: "lin@example.com".into(),
                role: "SRE".into(),
            }],
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap();
        let s = team(&t, now, Tz::UTC, &PlainPdfRenderer).unwrap();
        assert_eq!(s.name, "Platform_2024_01_02_03_04.pdf");
        assert_eq!(s.kind, EvidenceKind::Team);
    }

    #[test]
    fn policy_is_virtual() {
        let p = Policy {
            id: PolicyId::new(),
            organization: OrganizationId::new(),
            display_name: "Access Control Policy".into(),
            published_version: Some(PolicyVersion {
                version: 3,
                html: "<h1>Scope</h1>".into(),
            }),
        };
        let s = policy(&p);
        assert!(s.bytes.is_none());
        assert_eq!(s.policy_ref, Some(p.id));
        assert_eq!(s.evidence_text.as_deref(), Some("Scope"));
    }

    #[test]
    fn html_to_text_breaks_on_blocks() {
        assert_eq!(
            html_to_text("<ul><li>one</li><li>two</li></ul>line<br/>next"),
            "one\ntwo\nline\nnext"
        );
    }
}
