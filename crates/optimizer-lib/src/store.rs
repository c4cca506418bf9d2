//! Report storage
//!
//! Completed reports are kept by analysis id so they can be fetched again.
//! The in-memory store loses everything on restart; the file store keeps
//! one JSON document per report.

use crate::error::StoreError;
use crate::models::CostReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type StoreResult<T> = Result<T, StoreError>;

/// Millisecond stamp of the last id handed out by this process
static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Analysis identifier derived from the generation time.
///
/// Stamps are strictly increasing within a process: a request landing in
/// the same millisecond as the previous one is moved to the next free
/// millisecond, so two analyses never share an id.
pub fn new_analysis_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    let next = |last: i64| millis.max(last.saturating_add(1));
    let previous = match LAST_ID_MILLIS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(next(last))
    }) {
        Ok(previous) | Err(previous) => previous,
    };
    format!("analysis_{}", next(previous))
}

/// Keyed storage for completed reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn put(&self, report: CostReport) -> StoreResult<()>;

    /// Fetch a report, `None` when the id is unknown
    async fn get(&self, analysis_id: &str) -> StoreResult<Option<CostReport>>;

    async fn len(&self) -> StoreResult<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryReportStore {
    reports: Arc<DashMap<String, CostReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn put(&self, report: CostReport) -> StoreResult<()> {
        self.reports
            .insert(report.analysis_id().to_string(), report);
        Ok(())
    }

    async fn get(&self, analysis_id: &str) -> StoreResult<Option<CostReport>> {
        Ok(self.reports.get(analysis_id).map(|r| r.value().clone()))
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.reports.len())
    }
}

/// One `<analysis_id>.json` file per report under a directory
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    /// Open the store, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, analysis_id: &str) -> StoreResult<PathBuf> {
        let valid = !analysis_id.is_empty()
            && analysis_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidId(analysis_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", analysis_id)))
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn put(&self, report: CostReport) -> StoreResult<()> {
        let path = self.path_for(report.analysis_id())?;
        let body = serde_json::to_vec_pretty(&report)?;

        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Stored report");
        Ok(())
    }

    async fn get(&self, analysis_id: &str) -> StoreResult<Option<CostReport>> {
        let path = match self.path_for(analysis_id) {
            Ok(path) => path,
            // An id that cannot name a file cannot have been stored
            Err(StoreError::InvalidId(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn len(&self) -> StoreResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}
