//! Best-effort dumps of the catalog to a JSON file.
//!
//! The file has the same shape as the `GET /videos` body and is never read
//! back; a restart always starts from the seed data again.

use std::{io::Write, path::Path, sync::Arc};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tokio::{
    sync::oneshot,
    task::{self, JoinHandle},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, VideoRecord};
use crate::config::SnapshotSettings;

/// Writes `videos` as pretty JSON to `path`.
///
/// The data goes to a temporary file in the same directory first and is then
/// renamed over the target, so readers never see a half-written snapshot.
pub fn write_snapshot(path: &Path, videos: &[VideoRecord]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating snapshot directory {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary snapshot in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut file, videos).context("serializing catalog snapshot")?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.persist(path)
        .with_context(|| format!("replacing snapshot {}", path.display()))?;
    Ok(())
}

/// Copies the catalog and writes it out on the blocking pool. Failures are
/// logged and swallowed.
pub async fn flush(catalog: &CatalogStore, settings: &SnapshotSettings) {
    let videos = catalog.list_all();
    let path = settings.path.clone();
    let count = videos.len();

    let result = task::spawn_blocking(move || write_snapshot(&path, &videos)).await;
    match result {
        Ok(Ok(())) => info!(
            path = %settings.path.display(),
            videos = count,
            "catalog snapshot saved"
        ),
        Ok(Err(err)) => warn!(
            path = %settings.path.display(),
            "failed to save catalog snapshot: {err:#}"
        ),
        Err(err) => warn!("snapshot task join error: {err}"),
    }
}

/// Background task that flushes the catalog on a fixed interval and once more
/// when it is stopped.
pub struct SnapshotTask {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SnapshotTask {
    pub fn spawn(catalog: Arc<CatalogStore>, settings: SnapshotSettings) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker =
                time::interval_at(Instant::now() + settings.interval, settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(
                path = %settings.path.display(),
                interval_secs = settings.interval.as_secs(),
                "snapshot task started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => flush(&catalog, &settings).await,
                    // A dropped sender counts as a stop request too.
                    _ = &mut stop_rx => {
                        flush(&catalog, &settings).await;
                        break;
                    }
                }
            }

            debug!("snapshot task stopped");
        });

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Stops the ticker and waits for the final flush to finish.
    pub async fn shutdown(self) {
        let SnapshotTask { stop, handle } = self;
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        if let Err(err) = handle.await {
            warn!("snapshot task ended abnormally: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{UserId, VideoId};
    use std::time::Duration;
    use tempfile::tempdir;

    fn read_snapshot(path: &Path) -> Result<Vec<VideoRecord>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    #[test]
    fn write_snapshot_matches_listing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("videos-data.json");
        let catalog = CatalogStore::seeded()?;

        write_snapshot(&path, &catalog.list_all())?;

        assert_eq!(read_snapshot(&path)?, catalog.list_all());
        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.starts_with("[\n  {"));
        Ok(())
    }

    #[test]
    fn write_snapshot_replaces_previous_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos-data.json");
        let catalog = CatalogStore::seeded()?;

        write_snapshot(&path, &catalog.list_all())?;
        catalog.adjust_shares(VideoId(2), 1)?;
        write_snapshot(&path, &catalog.list_all())?;

        let saved = read_snapshot(&path)?;
        assert_eq!(saved[1].shares, 234);
        Ok(())
    }

    #[tokio::test]
    async fn flush_swallows_write_errors() -> Result<()> {
        let dir = tempdir()?;
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("taken");
        std::fs::create_dir(&path)?;
        let catalog = CatalogStore::seeded()?;
        let settings = SnapshotSettings {
            path,
            interval: Duration::from_secs(60),
        };

        flush(&catalog, &settings).await;
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_writes_final_snapshot() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos-data.json");
        let catalog = Arc::new(CatalogStore::seeded()?);
        let settings = SnapshotSettings {
            path: path.clone(),
            interval: Duration::from_secs(3600),
        };

        let task = SnapshotTask::spawn(Arc::clone(&catalog), settings);
        catalog.toggle_like(VideoId(1), &UserId::new("u1"))?;
        task.shutdown().await;

        let saved = read_snapshot(&path)?;
        assert_eq!(saved[0].likes, 246);
        Ok(())
    }

    #[tokio::test]
    async fn ticker_writes_on_interval() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("videos-data.json");
        let catalog = Arc::new(CatalogStore::seeded()?);
        let settings = SnapshotSettings {
            path: path.clone(),
            interval: Duration::from_millis(20),
        };

        let task = SnapshotTask::spawn(Arc::clone(&catalog), settings);
        for _ in 0..200 {
            if path.exists() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());

        task.shutdown().await;
        Ok(())
    }
}
