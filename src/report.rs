//! Append-only probe log.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::data::services::ProbeResult;
use crate::error::{Error, Result};

const SEPARATOR: &str = "--------------------------------------------------";

/// Destination for completed probe results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeLog: Send + Sync {
    /// Append one probe result.
    async fn append_probe_record(
        &self,
        result: &ProbeResult,
        timestamp: DateTime<Local>,
    ) -> Result<()>;
}

/// Render a probe result as a text block.
pub fn format_probe_record(result: &ProbeResult, timestamp: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", SEPARATOR);
    let _ = writeln!(out, "PROBE REPORT: {}", timestamp.format("%m/%d %H:%M:%S"));
    let _ = writeln!(out, "Device:  {}", result.device_name);
    if result.is_blind() {
        let _ = writeln!(out, "Address: {} (blind connect)", result.address);
    } else {
        let _ = writeln!(out, "Address: {}", result.address);
    }
    let _ = writeln!(out, "Services Found:");
    for (_, service) in result.services.iter() {
        let _ = writeln!(out, "  + Service: {}", service.name);
        for characteristic in &service.characteristics {
            let _ = writeln!(
                out,
                "      - Char: {} {}",
                crate::ble::uuids::uuid_key(&characteristic.uuid),
                characteristic.properties_string()
            );
        }
    }
    out.push('\n');
    out
}

/// Probe log stored as a plain text file.
#[derive(Debug, Clone)]
pub struct TextFileLog {
    path: PathBuf,
}

impl TextFileLog {
    /// Create a log writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole log, or `None` if nothing has been logged yet.
    pub async fn read_all(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::LogWrite {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ProbeLog for TextFileLog {
    async fn append_probe_record(
        &self,
        result: &ProbeResult,
        timestamp: DateTime<Local>,
    ) -> Result<()> {
        let record = format_probe_record(result, timestamp);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(record.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        info!("Log saved to {}", self.path.display());
        Ok(())
    }
}
