use bincode::{deserialize_from, serialize_into};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::Path;
use uuid::Uuid;

use crate::error::{AnalysisError, Result};
use crate::suggest::ChartSuggestion;

/// A suggestion the user decided to keep, tied to the file it describes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardChart {
    pub suggestion: ChartSuggestion,
    pub file_id: Uuid,
    /// RFC 3339 timestamp of when the chart was added.
    pub added_at: String,
}

impl DashboardChart {
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.added_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// The user's dashboard: charts in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub charts: Vec<DashboardChart>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chart. Adding the same suggestion twice keeps both copies.
    pub fn add(&mut self, suggestion: ChartSuggestion, file_id: Uuid) -> &DashboardChart {
        self.charts.push(DashboardChart {
            suggestion,
            file_id,
            added_at: Utc::now().to_rfc3339(),
        });
        &self.charts[self.charts.len() - 1]
    }

    pub fn remove(&mut self, index: usize) -> Result<DashboardChart> {
        if index >= self.charts.len() {
            return Err(AnalysisError::NoSuchChart(index));
        }
        Ok(self.charts.remove(index))
    }

    /// Drop every chart built from the given file.
    pub fn remove_file(&mut self, file_id: &Uuid) -> usize {
        let before = self.charts.len();
        self.charts.retain(|c| &c.file_id != file_id);
        before - self.charts.len()
    }

    pub fn clear(&mut self) {
        self.charts.clear();
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DashboardChart> {
        self.charts.iter()
    }

    /// Gzip-compressed bincode snapshot of the dashboard.
    pub fn export_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let encoder = GzEncoder::new(&mut buffer, Compression::default());
            let mut writer = BufWriter::new(encoder);
            serialize_into(&mut writer, self)?;
            let encoder = writer
                .into_inner()
                .map_err(|e| AnalysisError::Serialization(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| AnalysisError::Serialization(e.to_string()))?;
        }
        Ok(buffer)
    }

    /// Restore a dashboard from [`Dashboard::export_bytes`] output.
    pub fn import_bytes(bytes: &[u8]) -> Result<Self> {
        let decoder = GzDecoder::new(Cursor::new(bytes));
        let mut reader = BufReader::new(decoder);
        Ok(deserialize_from(&mut reader)?)
    }
}

pub fn save_dashboard(dashboard: &Dashboard, filename: impl AsRef<Path>) -> Result<()> {
    let path = filename.as_ref();
    let bytes = dashboard.export_bytes()?;
    let mut file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    file.write_all(&bytes)
        .map_err(|e| AnalysisError::io(path, e))?;
    Ok(())
}

pub fn load_dashboard(filename: impl AsRef<Path>) -> Result<Dashboard> {
    let path = filename.as_ref();
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);
    Ok(deserialize_from(&mut reader)?)
}
