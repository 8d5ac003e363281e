//! # Unique-per-Scope Naming
//!
//! Evidence names are unique per `(name, kind)` inside an owner scope. A
//! colliding name gets a numeric suffix before its extension:
//! `report.pdf`, `report(1).pdf`, `report(2).pdf`.
//!
//! The first candidate comes from counting existing names that match
//! `^<stem>(\(\d+\))?<ext>$`. When two or more match, the count is reduced
//! by one because the original occupies the unsuffixed slot. Candidates are
//! then probed upward until a free one is found or the probe bound is hit.

use regex::Regex;

use evtag_core::config::NamingConfig;
use evtag_core::{EvtagError, Result, ValidationError};

/// A file name split around its final extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitName<'a> {
    /// Name without the final `.<ext>`, surrounding whitespace stripped.
    pub stem: &'a str,
    /// The final extension including its dot, or empty.
    pub ext: &'a str,
}

/// Split `name` into stem and extension.
///
/// A leading dot does not start an extension, so `.env` has no extension.
pub fn split_name(name: &str) -> SplitName<'_> {
    let name = name.trim();
    match name.rfind('.') {
        Some(idx) if idx > 0 => SplitName {
            stem: name[..idx].trim(),
            ext: &name[idx..],
        },
        _ => SplitName {
            stem: name,
            ext: "",
        },
    }
}

/// Trim the stem and check emptiness and length.
pub fn normalize(name: &str, config: &NamingConfig) -> Result<String> {
    let SplitName { stem, ext } = split_name(name);
    if stem.is_empty() && ext.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    let normalized = format!("{stem}{ext}");
    let len = normalized.chars().count();
    if len > config.max_name_len {
        return Err(ValidationError::NameTooLong {
            len,
            max: config.max_name_len,
        }
        .into());
    }
    Ok(normalized)
}

/// `<stem>(n)<ext>`.
pub fn suffixed(stem: &str, n: u32, ext: &str) -> String {
    format!("{stem}({n}){ext}")
}

/// Pick a name for new or renamed evidence.
///
/// `taken` lists the names already used in the scope by evidence of the
/// same kind. Matching is case-sensitive.
pub fn unique_name<S: AsRef<str>>(
    requested: &str,
    taken: &[S],
    config: &NamingConfig,
) -> Result<String> {
    let name = normalize(requested, config)?;
    let is_taken = |candidate: &str| taken.iter().any(|t| t.as_ref() == candidate);
    if !is_taken(&name) {
        return Ok(name);
    }

    let SplitName { stem, ext } = split_name(&name);
    let pattern = format!(r"^{}(\(\d+\))?{}$", regex::escape(stem), regex::escape(ext));
    let matcher = Regex::new(&pattern)
        .map_err(|e| EvtagError::Storage(format!("name pattern failed to compile: {e}")))?;
    let count = taken.iter().filter(|t| matcher.is_match(t.as_ref())).count() as u32;
    let start = if count >= 2 { count - 1 } else { count };

    for n in start..start.saturating_add(config.suffix_retry_bound) {
        let candidate = suffixed(stem, n, ext);
        if candidate.chars().count() > config.max_name_len {
            return Err(EvtagError::NameExists {
                name: name.clone(),
                reason: format!(
                    "suffixed name would exceed {} characters",
                    config.max_name_len
                ),
            });
        }
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(EvtagError::NameExhausted {
        name,
        attempts: config.suffix_retry_bound,
    })
}
