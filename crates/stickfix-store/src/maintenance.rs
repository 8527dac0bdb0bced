//! Periodic maintenance: backup flush, integrity check, cache sweep.
//!
//! Each job runs on its own tokio interval and dispatches the blocking
//! engine call onto the blocking pool via `tokio::task::spawn_blocking`.
//! Jobs share the engine's registry lock with interactive callers, so a
//! job never interleaves with a query or mutation.
//!
//! ```text
//! backup          every  5 min   StickerStore::save
//! integrity check every  1 h     StickerStore::check_integrity
//! cache sweep     every  3 days  StickerStore::sweep_caches
//! ```

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::StoreConfig;
use crate::engine::{IntegrityStatus, StickerStore};
use crate::error::StoreResult;

/// A single maintenance job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceJob {
    Backup,
    IntegrityCheck,
    CacheSweep,
}

impl MaintenanceJob {
    /// Run the job on the current thread.
    pub fn run(self, store: &StickerStore) -> StoreResult<()> {
        match self {
            Self::Backup => store.save(),
            Self::IntegrityCheck => match store.check_integrity()? {
                IntegrityStatus::Healthy => Ok(()),
                IntegrityStatus::Restored(generation) => {
                    info!(%generation, "integrity check restored registry from backup");
                    Ok(())
                }
            },
            Self::CacheSweep => store.sweep_caches().map(|_| ()),
        }
    }

    /// Run the job on the blocking pool.
    pub async fn run_blocking(self, store: StickerStore) -> StoreResult<()> {
        tokio::task::spawn_blocking(move || self.run(&store)).await?
    }
}

impl fmt::Display for MaintenanceJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backup => "backup",
            Self::IntegrityCheck => "integrity_check",
            Self::CacheSweep => "cache_sweep",
        })
    }
}

/// How often each job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub backup: Duration,
    pub integrity_check: Duration,
    pub cache_sweep: Duration,
}

impl MaintenanceSchedule {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            backup: config.backup_interval(),
            integrity_check: config.integrity_check_interval(),
            cache_sweep: config.cache_sweep_interval(),
        }
    }

    fn jobs(&self) -> [(MaintenanceJob, Duration); 3] {
        [
            (MaintenanceJob::Backup, self.backup),
            (MaintenanceJob::IntegrityCheck, self.integrity_check),
            (MaintenanceJob::CacheSweep, self.cache_sweep),
        ]
    }
}

/// Handle to the running maintenance tasks.
///
/// Dropping the handle leaves the tasks running; call
/// [`shutdown`](Self::shutdown) to stop them.
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Start every job on its own interval. The first run of each job
    /// happens one full period after startup.
    pub fn spawn(store: StickerStore, schedule: MaintenanceSchedule) -> Self {
        let tasks = schedule
            .jobs()
            .into_iter()
            .map(|(job, period)| tokio::spawn(run_periodically(store.clone(), job, period)))
            .collect();
        info!(?schedule, "maintenance started");
        Self { tasks }
    }

    /// Abort every task and wait for them to finish.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
        info!("maintenance stopped");
    }
}

async fn run_periodically(store: StickerStore, job: MaintenanceJob, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        debug!(%job, "running maintenance job");
        if let Err(e) = job.run_blocking(store.clone()).await {
            error!(%job, error = %e, "maintenance job failed");
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Generation, Persistence};
    use crate::query::Window;

    fn open(dir: &tempfile::TempDir) -> StickerStore {
        StickerStore::with_persistence(Persistence::new(dir.path().join("users.json")), 49)
            .unwrap()
    }

    #[test]
    fn schedule_from_config() {
        let schedule = MaintenanceSchedule::from_config(&StoreConfig::default());
        assert_eq!(schedule.backup, Duration::from_secs(300));
        assert_eq!(schedule.integrity_check, Duration::from_secs(3600));
        assert_eq!(schedule.cache_sweep, Duration::from_secs(259_200));
    }

    #[test]
    fn job_names() {
        assert_eq!(MaintenanceJob::IntegrityCheck.to_string(), "integrity_check");
    }

    #[tokio::test]
    async fn backup_job_writes_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.add_sticker("42", "s1", &["cat"]).unwrap();

        MaintenanceJob::Backup.run_blocking(store.clone()).await.unwrap();

        let reopened = open(&dir);
        assert_eq!(reopened.snapshot().unwrap(), store.snapshot().unwrap());
    }

    #[tokio::test]
    async fn integrity_job_restores_corrupt_primary() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.add_sticker("42", "s1", &["cat"]).unwrap();
        store.save().unwrap();
        store.save().unwrap();
        let good = store.snapshot().unwrap();

        let persistence = Persistence::new(dir.path().join("users.json"));
        std::fs::write(persistence.path(), "{ broken").unwrap();
        assert!(persistence.backup_path(Generation::First).exists());

        MaintenanceJob::IntegrityCheck
            .run_blocking(store.clone())
            .await
            .unwrap();

        persistence.verify().unwrap();
        assert_eq!(store.snapshot().unwrap(), good);
    }

    #[tokio::test]
    async fn sweep_job_clears_caches() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.add_sticker("42", "s1", &["cat"]).unwrap();
        store
            .get_sticker_list("42", &["cat".to_string()], false, Window::all())
            .unwrap();

        MaintenanceJob::CacheSweep
            .run_blocking(store.clone())
            .await
            .unwrap();
        assert_eq!(store.stats().unwrap().cached_results, 0);
    }

    #[tokio::test]
    async fn periodic_backup_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.add_sticker("42", "s1", &["cat"]).unwrap();

        let long = Duration::from_secs(3600);
        let handle = MaintenanceHandle::spawn(
            store.clone(),
            MaintenanceSchedule {
                backup: Duration::from_millis(20),
                integrity_check: long,
                cache_sweep: long,
            },
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let persistence = Persistence::new(dir.path().join("users.json"));
        assert!(persistence.backup_path(Generation::First).exists());
        assert_eq!(open(&dir).snapshot().unwrap(), store.snapshot().unwrap());
    }
}
