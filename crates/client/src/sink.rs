/*
 * Alive-set sinks.
 *
 * Snapshots and final results leave the controller through `AliveSetSink`.
 * `JsonFileSink` writes one `{width}x{height}x{turn}.json` file per save;
 * the same file can be loaded back as a job's starting grid.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gol_common::{AliveSet, GolError, Grid, JobReport, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A saved generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub width: u32,
    pub height: u32,
    pub turn: u32,
    pub saved_at: DateTime<Utc>,
    pub alive: AliveSet,
}

impl SnapshotFile {
    pub fn new(width: u32, height: u32, report: &JobReport) -> Self {
        Self {
            width,
            height,
            turn: report.completed_turns,
            saved_at: Utc::now(),
            alive: report.alive.clone(),
        }
    }

    /// Name the file sink stores this snapshot under.
    pub fn file_name(&self) -> String {
        format!("{}x{}x{}.json", self.width, self.height, self.turn)
    }

    /// Rebuilds the grid; fails if any cell lies outside the dimensions.
    pub fn to_grid(&self) -> Result<Grid> {
        Grid::from_alive(self.width, self.height, &self.alive)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| GolError::Io(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Destination for snapshots.
#[async_trait]
pub trait AliveSetSink: Send + Sync {
    /// Stores the snapshot and returns where it went.
    async fn save(&self, snapshot: &SnapshotFile) -> Result<String>;
}

/// Writes snapshots as pretty JSON files into a directory.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AliveSetSink for JsonFileSink {
    async fn save(&self, snapshot: &SnapshotFile) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(snapshot.file_name());
        let body = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, body).await?;

        tracing::info!(
            "Saved {} alive cells at turn {} to {}",
            snapshot.alive.len(),
            snapshot.turn,
            path.display()
        );
        Ok(path.display().to_string())
    }
}

/// Keeps snapshots in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<SnapshotFile>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<SnapshotFile> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AliveSetSink for MemorySink {
    async fn save(&self, snapshot: &SnapshotFile) -> Result<String> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| GolError::Unexpected("memory sink lock poisoned".into()))?;
        saved.push(snapshot.clone());
        Ok(format!("memory:{}", snapshot.file_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_common::Cell;

    fn report() -> JobReport {
        JobReport {
            completed_turns: 7,
            alive: vec![Cell::new(1, 0), Cell::new(3, 2)].into(),
        }
    }

    #[tokio::test]
    async fn test_json_sink_round_trips_through_load() {
        let dir = std::env::temp_dir().join(format!("gol-sink-{}", std::process::id()));
        let sink = JsonFileSink::new(&dir);
        let snapshot = SnapshotFile::new(4, 3, &report());

        let location = sink.save(&snapshot).await.unwrap();
        assert!(location.ends_with("4x3x7.json"));

        let loaded = SnapshotFile::load(&location).await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.to_grid().unwrap().alive_count(), 2);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_out_of_bounds_snapshot_rejected() {
        let snapshot = SnapshotFile::new(2, 2, &report());
        assert!(snapshot.to_grid().is_err());
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.save(&SnapshotFile::new(4, 3, &report())).await.unwrap();
        sink.save(&SnapshotFile::new(8, 8, &report())).await.unwrap();

        let sizes: Vec<u32> = sink.saved().iter().map(|s| s.width).collect();
        assert_eq!(sizes, vec![4, 8]);
    }
}
