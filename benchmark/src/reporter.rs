// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report output.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::metrics::BenchmarkReport;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes benchmark reports as pretty-printed JSON.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Reporter saving into `output_dir`, created if missing.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serialize a report to any writer.
    pub fn write(report: &BenchmarkReport, writer: impl Write) -> Result<(), ReporterError> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Save to `<mode>_<timestamp>.json` in the output directory.
    ///
    /// Returns the path to the created file.
    pub fn save(&self, report: &BenchmarkReport) -> Result<PathBuf, ReporterError> {
        let timestamp = report.timestamp.format("%Y-%m-%dT%H-%M-%SZ");
        let mode = match report.results.as_slice() {
            [first, rest @ ..] if rest.iter().all(|r| r.workload.mode == first.workload.mode) => {
                first.workload.mode.to_string()
            }
            _ => "mixed".to_string(),
        };

        let path = self.output_dir.join(format!("{}_{}.json", mode, timestamp));
        Self::save_to(report, &path)?;
        Ok(path)
    }

    /// Save to an explicit file path.
    pub fn save_to(report: &BenchmarkReport, path: impl AsRef<Path>) -> Result<(), ReporterError> {
        let file = File::create(path)?;
        Self::write(report, file)
    }
}
