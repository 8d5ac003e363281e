//! # Document Rendering
//!
//! PDF production is an external concern; the core only needs a seam.
//! [`DocumentRenderer`] turns a titled list of lines (officer and team
//! summaries) or an HTML body (papers, policies) into PDF bytes.
//! [`PlainPdfRenderer`] is a dependency-free fallback that writes a
//! single-font, text-only PDF, enough for archives to open in any viewer.

use std::fmt::Write as _;

use evtag_core::Result;

use crate::synthesis::html_to_text;

/// Renderer input: a title and body lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub lines: Vec<String>,
}

/// Turns documents into PDF bytes. Implementations must be pure: the same
/// input always yields the same bytes.
pub trait DocumentRenderer: Send + Sync {
    /// Render a structured document.
    fn render(&self, document: &Document) -> Result<Vec<u8>>;

    /// Render an HTML body. The default strips markup and renders the text.
    fn html_to_pdf(&self, title: &str, html: &str) -> Result<Vec<u8>> {
        let lines = html_to_text(html).lines().map(str::to_string).collect();
        self.render(&Document {
            title: title.to_string(),
            lines,
        })
    }
}

/// Text-only PDF writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPdfRenderer;

const LINES_PER_PAGE: usize = 50;

impl DocumentRenderer for PlainPdfRenderer {
    fn render(&self, document: &Document) -> Result<Vec<u8>> {
        let mut all_lines = Vec::with_capacity(document.lines.len() + 2);
        all_lines.push(document.title.clone());
        all_lines.push(String::new());
        all_lines.extend(document.lines.iter().cloned());

        let pages: Vec<&[String]> = all_lines.chunks(LINES_PER_PAGE).collect();
        // Objects: 1 catalog, 2 pages, 3 font, then (page, content) pairs.
        let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();

        let mut objects: Vec<String> = Vec::new();
        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids = page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        objects.push(format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            pages.len()
        ));
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());
        for (page, page_id) in pages.iter().zip(&page_ids) {
            let content = page_stream(page);
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ));
        }

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1);
        }
        let xref_at = out.len();
        let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = write!(out, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        );
        Ok(out.into_bytes())
    }
}

fn page_stream(lines: &[String]) -> String {
    let mut stream = String::from("BT /F1 11 Tf 14 TL 56 740 Td");
    for line in lines {
        let _ = write!(stream, " ({}) '", escape_pdf_text(line));
    }
    stream.push_str(" ET");
    stream
}

/// Escape a line for a PDF literal string. Non-ASCII characters are
/// replaced because the base font has no encoding for them.
fn escape_pdf_text(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            '\t' => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}
