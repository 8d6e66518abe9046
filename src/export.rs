//! Normalized spend export.
//!
//! Every successful fetch materializes the normalized rows to `spend.csv`
//! under the data directory, the file the dashboard reads. Columns:
//! `campaign_id,ad_spend,platform,date`.

use crate::adapters::SpendRow;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Export file name within the data directory.
pub const SPEND_FILE: &str = "spend.csv";

pub struct SpendExporter {
    data_dir: PathBuf,
}

impl SpendExporter {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(SPEND_FILE)
    }

    /// Write the full export, replacing any previous one. Returns the row
    /// count. Values are identifiers, numbers, and ISO dates; none need
    /// quoting.
    pub fn write(&self, rows: &[SpendRow]) -> Result<usize> {
        fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;

        let mut out = String::from("campaign_id,ad_spend,platform,date\n");
        for row in rows {
            out.push_str(&format!(
                "{},{},{},{}\n",
                row.campaign_id, row.ad_spend, row.platform, row.date
            ));
        }

        fs::write(self.path(), out).context("Failed to write spend export")?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SpendExporter::new(dir.path());

        let rows = vec![
            SpendRow::new("campA", 120.0, Platform::Meta, "2025-01-01"),
            SpendRow::new("campB", 90.5, Platform::Meta, "2025-01-02"),
        ];
        let count = exporter.write(&rows).unwrap();
        assert_eq!(count, 2);

        let contents = fs::read_to_string(exporter.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "campaign_id,ad_spend,platform,date");
        assert_eq!(lines[1], "campA,120,Meta,2025-01-01");
        assert_eq!(lines[2], "campB,90.5,Meta,2025-01-02");
    }

    #[test]
    fn test_write_replaces_previous_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SpendExporter::new(dir.path());

        exporter
            .write(&[SpendRow::new("old", 1.0, Platform::Google, "2025-01-01")])
            .unwrap();
        exporter
            .write(&[SpendRow::new("new", 2.0, Platform::TikTok, "2025-01-02")])
            .unwrap();

        let contents = fs::read_to_string(exporter.path()).unwrap();
        assert!(!contents.contains("old"));
        assert!(contents.contains("new,2,TikTok,2025-01-02"));
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SpendExporter::new(dir.path());
        assert_eq!(exporter.write(&[]).unwrap(), 0);

        let contents = fs::read_to_string(exporter.path()).unwrap();
        assert_eq!(contents, "campaign_id,ad_spend,platform,date\n");
    }
}
