//! Checksum verification and the Markdown results table.

use std::fmt::{self, Write as _};
use std::path::Path;

use md5::{Digest, Md5};

const REPORT_HEADER: &str = "# Results

| Index | Checksum                         | Expected Checksum                | Matching? |
|:-----:|:--------------------------------:|:--------------------------------:|:---------:|
";

/// MD5 hex digest of a renderer image, taken over its base64 text.
#[must_use]
pub fn content_checksum(encoded: &str) -> String {
    hex::encode(Md5::digest(encoded.as_bytes()))
}

/// Outcome of comparing one checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Matching,
    Mismatch,
    /// No expected checksum was supplied.
    NotChecked,
}

impl MatchStatus {
    fn compare(actual: &str, expected: Option<&str>) -> Self {
        match expected {
            None => Self::NotChecked,
            Some(expected) if expected == actual => Self::Matching,
            Some(_) => Self::Mismatch,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Matching => "True",
            Self::Mismatch => "False",
            Self::NotChecked => "N/A",
        };
        // Pad through the formatter so table widths apply.
        f.pad(label)
    }
}

/// One line of the results table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub index: usize,
    pub checksum: String,
    pub expected: Option<String>,
    pub status: MatchStatus,
}

/// Per-diagram checksum results, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    rows: Vec<ReportRow>,
}

impl Report {
    /// Checksum `images` and compare each against the expected value at the same index.
    #[must_use]
    pub fn from_images(images: &[String], expected: &[Option<String>]) -> Self {
        let rows = images
            .iter()
            .enumerate()
            .map(|(index, encoded)| {
                let checksum = content_checksum(encoded);
                let expected = expected.get(index).cloned().flatten();
                let status = MatchStatus::compare(&checksum, expected.as_deref());
                ReportRow {
                    index,
                    checksum,
                    expected,
                    status,
                }
            })
            .collect();
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Whether no supplied checksum mismatched.
    #[must_use]
    pub fn all_matched(&self) -> bool {
        self.rows.iter().all(|row| row.status != MatchStatus::Mismatch)
    }

    /// Render the fixed-width Markdown table.
    #[must_use]
    pub fn render_markdown(&self) -> String {
        let mut out = String::from(REPORT_HEADER);
        for row in &self.rows {
            let _ = writeln!(
                out,
                "| {:<5} | {:<32} | {:<32} | {:<9} |",
                row.index,
                row.checksum,
                row.expected.as_deref().unwrap_or(""),
                row.status,
            );
        }
        out
    }

    /// Write the Markdown table to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.render_markdown())
    }
}
