//! # Archive Packaging
//!
//! Turns a frozen list of [`ExportItem`]s into a flat zip. Each entry is
//! named after the evidence's visible name; PAPER entries swap their
//! stored extension for `.pdf` and POLICY entries gain one. Names that
//! still collide take the same `<stem>(N)<ext>` suffix used for evidence.
//!
//! Entries are written in name order with a fixed timestamp, so the same
//! snapshot always produces the same bytes.

use std::collections::BTreeSet;
use std::io::Write as _;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use evtag_core::{EvidenceKind, EvtagError, Result};
use evtag_store::naming::{split_name, suffixed};
use evtag_store::synthesis::PAPER_EXTENSION;
use evtag_store::{BlobStore, DocumentRenderer, Tables};

use crate::request::ExportItem;

/// One file in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

fn packaging(detail: impl Into<String>) -> EvtagError {
    EvtagError::ExportPackaging(detail.into())
}

/// Entry name before collision handling. `None` for kinds that are not
/// exported.
pub fn base_entry_name(item: &ExportItem) -> Option<String> {
    match item.kind {
        EvidenceKind::Link => None,
        EvidenceKind::Paper => {
            let stem = match item.name.strip_suffix(PAPER_EXTENSION) {
                Some(stem) => stem,
                None => split_name(&item.name).stem,
            };
            Some(format!("{stem}.pdf"))
        }
        EvidenceKind::Policy => {
            if item.name.to_ascii_lowercase().ends_with(".pdf") {
                Some(item.name.clone())
            } else {
                Some(format!("{}.pdf", item.name))
            }
        }
        _ => Some(item.name.clone()),
    }
}

/// Final entry names, paired with the items they come from. Items are
/// visited by base name, then kind, then evidence id; the first keeps the
/// bare name.
pub fn plan_entries(items: &[ExportItem]) -> Vec<(String, &ExportItem)> {
    let mut named: Vec<(String, &ExportItem)> = items
        .iter()
        .filter_map(|item| base_entry_name(item).map(|name| (name, item)))
        .collect();
    named.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.kind.cmp(&b.1.kind))
            .then(a.1.evidence.cmp(&b.1.evidence))
    });

    let mut taken: BTreeSet<String> = BTreeSet::new();
    named
        .into_iter()
        .map(|(name, item)| {
            let mut unique = name.clone();
            if taken.contains(&unique) {
                let parts = split_name(&name);
                let mut n = 1;
                loop {
                    unique = suffixed(parts.stem, n, parts.ext);
                    if !taken.contains(&unique) {
                        break;
                    }
                    n += 1;
                }
            }
            taken.insert(unique.clone());
            (unique, item)
        })
        .collect()
}

/// Produce the bytes of one entry.
pub async fn materialize(
    item: &ExportItem,
    entry_name: &str,
    tables: &Tables,
    blobs: &dyn BlobStore,
    renderer: &dyn DocumentRenderer,
) -> Result<Vec<u8>> {
    match item.kind {
        EvidenceKind::Policy => {
            let policy_id = item
                .policy
                .ok_or_else(|| packaging(format!("policy evidence {} has no policy", item.evidence)))?;
            let policy = tables
                .catalog
                .policy(&policy_id)
                .ok_or_else(|| packaging(format!("policy {policy_id} no longer exists")))?;
            let version = policy.published_version.as_ref().ok_or_else(|| {
                packaging(format!("policy {policy_id} has no published version"))
            })?;
            renderer.html_to_pdf(&policy.display_name, &version.html)
        }
        kind => {
            let blob = item.file.as_ref().ok_or_else(|| {
                packaging(format!("{kind} evidence {} has no stored file", item.evidence))
            })?;
            let bytes = blobs.get(blob).await.map_err(|e| {
                packaging(format!("reading {} for {entry_name}: {e}", blob.key))
            })?;
            if kind == EvidenceKind::Paper {
                let html = String::from_utf8_lossy(&bytes);
                renderer.html_to_pdf(split_name(entry_name).stem, &html)
            } else {
                Ok(bytes)
            }
        }
    }
}

/// Write entries as a deterministic zip.
pub fn write_zip(mut entries: Vec<ArchiveEntry>) -> Result<Vec<u8>> {
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let fixed = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
        .map_err(|e| packaging(format!("archive timestamp: {e}")))?;
    let options = SimpleFileOptions::default()
        .last_modified_time(fixed)
        .compression_method(zip::CompressionMethod::Deflated);

    let mut archive = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut archive));
        for entry in &entries {
            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| packaging(format!("adding {}: {e}", entry.name)))?;
            zip.write_all(&entry.bytes)
                .map_err(|e| packaging(format!("writing {}: {e}", entry.name)))?;
        }
        zip.finish()
            .map_err(|e| packaging(format!("finalizing archive: {e}")))?;
    }
    Ok(archive)
}

/// Materialize every item and zip the result.
pub async fn package(
    items: &[ExportItem],
    tables: &Tables,
    blobs: &dyn BlobStore,
    renderer: &dyn DocumentRenderer,
) -> Result<(Vec<u8>, usize)> {
    let mut entries = Vec::new();
    for (name, item) in plan_entries(items) {
        let bytes = materialize(item, &name, tables, blobs, renderer).await?;
        entries.push(ArchiveEntry { name, bytes });
    }
    let count = entries.len();
    Ok((write_zip(entries)?, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    use evtag_core::EvidenceId;

    fn item(name: &str, kind: EvidenceKind) -> ExportItem {
        ExportItem {
            evidence: EvidenceId::new(),
            name: name.into(),
            kind,
            file: None,
            policy: None,
        }
    }

    fn entry_names(items: &[ExportItem]) -> Vec<String> {
        let mut names: Vec<String> = plan_entries(items).into_iter().map(|(n, _)| n).collect();
        names.sort();
        names
    }

    #[test]
    fn paper_and_policy_become_pdf() {
        let items = [
            item("Minutes.laikapaper", EvidenceKind::Paper),
            item("Access Control", EvidenceKind::Policy),
            item("report.pdf", EvidenceKind::File),
        ];
        assert_eq!(
            entry_names(&items),
            ["Access Control.pdf", "Minutes.pdf", "report.pdf"]
        );
    }

    #[test]
    fn links_are_skipped() {
        let items = [
            item("Runbook", EvidenceKind::Link),
            item("a.pdf", EvidenceKind::File),
        ];
        assert_eq!(entry_names(&items), ["a.pdf"]);
    }

    #[test]
    fn rewritten_names_that_collide_are_suffixed() {
        let items = [
            item("notes.laikapaper", EvidenceKind::Paper),
            item("notes.pdf", EvidenceKind::File),
        ];
        let plan = plan_entries(&items);
        let file = plan
            .iter()
            .find(|(_, i)| i.kind == EvidenceKind::File)
            .unwrap();
        let paper = plan
            .iter()
            .find(|(_, i)| i.kind == EvidenceKind::Paper)
            .unwrap();
        // FILE sorts before PAPER and keeps the bare name.
        assert_eq!(file.0, "notes.pdf");
        assert_eq!(paper.0, "notes(1).pdf");
    }

    #[test]
    fn zip_is_deterministic_and_sorted() {
        let entries = vec![
            ArchiveEntry {
                name: "b.txt".into(),
                bytes: b"bee".to_vec(),
            },
            ArchiveEntry {
                name: "a.txt".into(),
                bytes: b"ay".to_vec(),
            },
        ];
        let first = write_zip(entries.clone()).unwrap();
        let second = write_zip(entries.into_iter().rev().collect()).unwrap();
        assert_eq!(first, second);

        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(first)).unwrap();
        assert_eq!(zip.len(), 2);
        let mut body = String::new();
        zip.by_index(0).unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "ay");
        assert_eq!(zip.by_index(1).unwrap().name(), "b.txt");
    }
}
