use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const CONCURRENT_DELETES: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

// files whose last modification is older than `max_age`
async fn stale_files(dir: &Path, max_age: Duration) -> std::io::Result<(usize, Vec<PathBuf>)> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((0, Vec::new())),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut scanned = 0;
    let mut stale = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            // deleted by its request between listing and stat
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        scanned += 1;

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age >= max_age {
            stale.push(entry.path());
        }
    }

    Ok((scanned, stale))
}

/// One pass over the upload directory. Deletion races with per-request
/// removal; a file that is already gone is not a failure.
pub async fn sweep(dir: &Path, max_age: Duration) -> std::io::Result<CleanupReport> {
    let (scanned, stale) = stale_files(dir, max_age).await?;

    let removed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    stream::iter(stale)
        .for_each_concurrent(CONCURRENT_DELETES, |path| {
            let removed = removed.clone();
            let failed = failed.clone();
            async move {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("swept stale upload {}", path.display());
                        removed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!("failed to sweep {}: {}", path.display(), e);
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    Ok(CleanupReport {
        scanned,
        removed: removed.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    })
}

pub fn spawn_sweeper(dir: PathBuf, interval: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "upload sweeper started: every {:?}, max age {:?}, dir {}",
            interval,
            max_age,
            dir.display()
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sweep(&dir, max_age).await {
                Ok(report) if report.removed > 0 || report.failed > 0 => {
                    info!(
                        "upload sweep: scanned {}, removed {}, failed {}",
                        report.scanned, report.removed, report.failed
                    );
                }
                Ok(_) => {}
                Err(e) => error!("upload sweep of {} failed: {}", dir.display(), e),
            }
        }
    })
}
