use crate::aggregate::{ChartData, ChartRequest, aggregate_for_chart};
use crate::dataset::Dataset;
use crate::error::{AnalysisError, Result};
use crate::loader::{file_extension, load_bytes};
use crate::summary::{DataFrameSummary, summarize};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub type FileId = Uuid;

/// An uploaded file, parsed and summarised.
#[derive(Debug)]
pub struct StoredFile {
    pub id: FileId,
    pub filename: String,
    pub dataset: Dataset,
    pub summary: DataFrameSummary,
    pub uploaded_at: DateTime<Utc>,
    pub path: Option<PathBuf>,
}

/// Listing entry for an uploaded file.
#[derive(Clone, Debug, Serialize)]
pub struct FileInfo {
    pub file_id: FileId,
    pub filename: String,
    pub rows: usize,
    pub columns: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn info(&self) -> FileInfo {
        FileInfo {
            file_id: self.id,
            filename: self.filename.clone(),
            rows: self.dataset.len(),
            columns: self.dataset.columns.len(),
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Registry of uploaded files and the chart data computed from them.
///
/// Chart data is computed once per (file, chart type, parameter set) and
/// served from the cache afterwards.
pub struct FileStore {
    data_folder: Option<PathBuf>,
    files: HashMap<FileId, StoredFile>,
    charts: HashMap<(FileId, ChartRequest), Arc<ChartData>>,
}

impl FileStore {
    /// A store that keeps a copy of every upload under `data_folder`.
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        FileStore {
            data_folder: Some(data_folder.into()),
            files: HashMap::new(),
            charts: HashMap::new(),
        }
    }

    /// A store that keeps uploads in memory only.
    pub fn in_memory() -> Self {
        FileStore {
            data_folder: None,
            files: HashMap::new(),
            charts: HashMap::new(),
        }
    }

    pub fn data_folder(&self) -> Option<&Path> {
        self.data_folder.as_deref()
    }

    /// Parse an upload, summarise it and register it under a fresh id.
    pub fn insert(&mut self, filename: &str, bytes: &[u8]) -> Result<&StoredFile> {
        let stored = FileStore::prepare(self.data_folder(), filename, bytes)?;
        Ok(self.register(stored))
    }

    /// Parse, summarise and copy an upload without touching a store.
    ///
    /// This is the slow half of [`FileStore::insert`]; callers sharing a
    /// store behind a lock run it first and only lock for
    /// [`FileStore::register`].
    pub fn prepare(data_folder: Option<&Path>, filename: &str, bytes: &[u8]) -> Result<StoredFile> {
        let dataset = load_bytes(filename, bytes)?;
        let summary = summarize(&dataset);
        let id = Uuid::new_v4();

        let path = match data_folder {
            Some(folder) => Some(write_upload(folder, id, filename, bytes)?),
            None => None,
        };

        log::info!(
            "stored {} as {} ({} rows, {} columns)",
            filename,
            id,
            dataset.len(),
            dataset.columns.len()
        );

        Ok(StoredFile {
            id,
            filename: filename.to_string(),
            dataset,
            summary,
            uploaded_at: Utc::now(),
            path,
        })
    }

    pub fn register(&mut self, stored: StoredFile) -> &StoredFile {
        self.files.entry(stored.id).or_insert(stored)
    }

    pub fn get(&self, id: &FileId) -> Result<&StoredFile> {
        self.files
            .get(id)
            .ok_or_else(|| AnalysisError::FileNotFound(id.to_string()))
    }

    /// Drop a file, its cached charts and its copy on disk.
    pub fn remove(&mut self, id: &FileId) -> Result<StoredFile> {
        let stored = self
            .files
            .remove(id)
            .ok_or_else(|| AnalysisError::FileNotFound(id.to_string()))?;
        self.charts.retain(|(file, _), _| file != id);
        if let Some(path) = &stored.path {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("could not delete {}: {}", path.display(), e);
            }
        }
        Ok(stored)
    }

    /// Uploaded files, oldest first.
    pub fn list(&self) -> Vec<FileInfo> {
        let mut infos: Vec<FileInfo> = self.files.values().map(StoredFile::info).collect();
        infos.sort_by_key(|info| info.uploaded_at);
        infos
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Chart data for a file, computed on first request and cached.
    pub fn chart_data(&mut self, id: &FileId, request: &ChartRequest) -> Result<Arc<ChartData>> {
        let key = (*id, normalize_request(request));
        if let Some(cached) = self.charts.get(&key) {
            return Ok(Arc::clone(cached));
        }

        let stored = self.get(id)?;
        let data = Arc::new(aggregate_for_chart(&stored.dataset, &key.1)?);
        self.charts.insert(key, Arc::clone(&data));
        Ok(data)
    }

    pub fn cached_charts(&self) -> usize {
        self.charts.len()
    }
}

/// Requests that aggregate the same way share a cache entry: the chart type
/// only counts through its shape, and blank optional fields are unset.
fn normalize_request(request: &ChartRequest) -> ChartRequest {
    let blank_to_none = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
    let mut normalized = request.clone();
    normalized.chart_type = Some(request.shape().as_str().to_string());
    normalized.parameters.y_axis = blank_to_none(&request.parameters.y_axis);
    normalized.parameters.hue = blank_to_none(&request.parameters.hue);
    normalized.parameters.agg_func = blank_to_none(&request.parameters.agg_func);
    normalized
}

fn write_upload(folder: &Path, id: FileId, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(folder).map_err(|e| AnalysisError::io(folder, e))?;
    let name = match file_extension(filename) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    };
    let path = folder.join(name);
    fs::write(&path, bytes).map_err(|e| AnalysisError::io(&path, e))?;
    Ok(path)
}
