use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use utoipa::ToSchema;
use uuid::Uuid;

use super::miner::{CancelFlag, MinedBlock, Miner, MiningError, MiningProgress};

/// State of a background mining job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running { attempts: u64 },
    Completed { index: u64, proof: u64, hash: String, attempts: u64 },
    Cancelled { attempts: u64 },
    Failed { error: String, attempts: u64 },
}

impl JobStatus {
    fn finished(result: &Result<MinedBlock, MiningError>) -> Self {
        match result {
            Ok(mined) => JobStatus::Completed {
                index: mined.index,
                proof: mined.proof,
                hash: mined.hash.clone(),
                attempts: mined.attempts,
            },
            Err(MiningError::Cancelled { attempts }) => JobStatus::Cancelled {
                attempts: *attempts,
            },
            Err(err) => JobStatus::Failed {
                error: err.to_string(),
                attempts: err.attempts(),
            },
        }
    }
}

/// Finished detached jobs kept for polling before the oldest are evicted
pub const RETAINED_FINISHED_JOBS: usize = 100;

type SearchResult = Result<MinedBlock, MiningError>;

#[derive(Debug)]
struct JobEntry {
    cancel: CancelFlag,
    progress: MiningProgress,
    finished: Option<(Instant, JobStatus)>,
}

impl JobEntry {
    fn status(&self) -> JobStatus {
        match &self.finished {
            Some((_, status)) => status.clone(),
            None => JobStatus::Running {
                attempts: self.progress.attempts(),
            },
        }
    }
}

/// A search whose result belongs to one caller
///
/// The job is visible in the registry while it runs. Once `finish` returns
/// the entry is removed; if the guard is dropped first the search is
/// cancelled and the entry is left for eviction like any detached job.
#[derive(Debug)]
pub struct AttachedJob {
    id: Uuid,
    cancel: CancelFlag,
    handle: JoinHandle<SearchResult>,
    jobs: Arc<DashMap<Uuid, JobEntry>>,
    settled: bool,
}

impl AttachedJob {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the search and forgets the job
    pub async fn finish(mut self) -> Result<SearchResult, JoinError> {
        let outcome = (&mut self.handle).await;
        self.settled = true;
        self.jobs.remove(&self.id);
        outcome
    }
}

impl Drop for AttachedJob {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Mining job {} abandoned by its caller, cancelling", self.id);
            self.cancel.cancel();
        }
    }
}

/// Registry of mining searches running off the request threads
///
/// Each job runs on tokio's blocking pool and can be polled or aborted by id.
/// Finished detached jobs are kept until more than `retain_finished` of them
/// pile up, then the oldest are evicted.
#[derive(Debug, Clone)]
pub struct MiningJobs {
    miner: Miner,
    jobs: Arc<DashMap<Uuid, JobEntry>>,
    retain_finished: usize,
}

impl MiningJobs {
    pub fn new(miner: Miner) -> Self {
        Self::with_retention(miner, RETAINED_FINISHED_JOBS)
    }

    pub fn with_retention(miner: Miner, retain_finished: usize) -> Self {
        MiningJobs {
            miner,
            jobs: Arc::new(DashMap::new()),
            retain_finished,
        }
    }

    /// Starts a detached search on the blocking pool
    ///
    /// Must be called from within a tokio runtime. The handle resolves to the
    /// search result; dropping it does not stop the job.
    pub fn start(&self) -> (Uuid, JoinHandle<SearchResult>) {
        let (id, _cancel, handle) = self.spawn();
        (id, handle)
    }

    /// Starts a search owned by the caller
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_attached(&self) -> AttachedJob {
        let (id, cancel, handle) = self.spawn();
        AttachedJob {
            id,
            cancel,
            handle,
            jobs: Arc::clone(&self.jobs),
            settled: false,
        }
    }

    fn spawn(&self) -> (Uuid, CancelFlag, JoinHandle<SearchResult>) {
        self.prune_finished();

        let id = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let progress = MiningProgress::default();

        self.jobs.insert(
            id,
            JobEntry {
                cancel: cancel.clone(),
                progress: progress.clone(),
                finished: None,
            },
        );

        let miner = self.miner.clone();
        let jobs = Arc::clone(&self.jobs);
        let flag = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let result = miner.mine(&flag, &progress);
            if let Some(mut entry) = jobs.get_mut(&id) {
                entry.finished = Some((Instant::now(), JobStatus::finished(&result)));
            }
            result
        });

        (id, cancel, handle)
    }

    /// Evicts the oldest finished jobs beyond the retention limit
    fn prune_finished(&self) {
        let mut finished: Vec<(Instant, Uuid)> = self
            .jobs
            .iter()
            .filter_map(|entry| entry.finished.as_ref().map(|(at, _)| (*at, *entry.key())))
            .collect();
        if finished.len() <= self.retain_finished {
            return;
        }

        finished.sort_unstable();
        let excess = finished.len() - self.retain_finished;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.status())
    }

    /// Requests that a job stop
    ///
    /// Returns the job's status at the time of the request, or `None` for an
    /// unknown id. Finished jobs are left as they are.
    pub fn cancel(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| {
            if entry.finished.is_none() {
                entry.cancel.cancel();
            }
            entry.status()
        })
    }

    /// Requests that every running job stop
    pub fn cancel_all(&self) {
        for entry in self.jobs.iter() {
            entry.cancel.cancel();
        }
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<Uuid> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::GENESIS_DATA;
    use crate::blockchain::chain::Ledger;
    use crate::blockchain::events::testing::NoopObserver;
    use crate::blockchain::miner::MiningLimits;
    use serde_json::json;

    fn jobs_for(difficulty: u32) -> (Ledger, MiningJobs) {
        let ledger = Ledger::with_observer(
            difficulty,
            vec![json!(GENESIS_DATA)],
            Arc::new(NoopObserver),
        )
        .unwrap();
        let miner = Miner::new(ledger.clone(), MiningLimits::default());
        (ledger, MiningJobs::new(miner))
    }

    #[tokio::test]
    async fn test_job_completes() {
        let (ledger, jobs) = jobs_for(1);
        ledger.submit_data(json!("x"));

        let (id, handle) = jobs.start();
        let mined = handle.await.unwrap().unwrap();

        assert_eq!(mined.index, 1);
        assert_eq!(
            jobs.status(&id),
            Some(JobStatus::Completed {
                index: 1,
                proof: mined.proof,
                hash: mined.hash.clone(),
                attempts: mined.attempts,
            })
        );
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_job_can_be_cancelled() {
        let (ledger, jobs) = jobs_for(64);

        let (id, handle) = jobs.start();
        assert!(matches!(
            jobs.cancel(&id),
            Some(JobStatus::Running { .. })
        ));

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MiningError::Cancelled { .. }));
        assert!(matches!(
            jobs.status(&id),
            Some(JobStatus::Cancelled { .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (_ledger, jobs) = jobs_for(64);

        let (first, first_handle) = jobs.start();
        let (second, second_handle) = jobs.start();
        jobs.cancel_all();

        assert!(first_handle.await.unwrap().is_err());
        assert!(second_handle.await.unwrap().is_err());
        assert!(matches!(jobs.status(&first), Some(JobStatus::Cancelled { .. })));
        assert!(matches!(jobs.status(&second), Some(JobStatus::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_attached_job_is_forgotten_once_finished() {
        let (ledger, jobs) = jobs_for(1);

        for expected in 1..=5 {
            let job = jobs.start_attached();
            let id = job.id();
            let mined = job.finish().await.unwrap().unwrap();

            assert_eq!(mined.index, expected);
            assert_eq!(jobs.status(&id), None);
        }
        assert!(jobs.ids().is_empty());
        assert_eq!(ledger.len(), 6);
    }

    #[tokio::test]
    async fn test_abandoned_attached_job_is_cancelled() {
        let (ledger, jobs) = jobs_for(64);

        let job = jobs.start_attached();
        let id = job.id();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), job.finish()).await;
        assert!(waited.is_err());

        let mut status = jobs.status(&id);
        for _ in 0..200 {
            if !matches!(status, Some(JobStatus::Running { .. })) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            status = jobs.status(&id);
        }
        assert!(matches!(status, Some(JobStatus::Cancelled { .. })));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_evicted_past_retention() {
        let (ledger, _) = jobs_for(1);
        let miner = Miner::new(ledger.clone(), MiningLimits::default());
        let jobs = MiningJobs::with_retention(miner, 3);

        let mut ids = Vec::new();
        for _ in 0..10 {
            let (id, handle) = jobs.start();
            handle.await.unwrap().unwrap();
            ids.push(id);
        }

        // The last job is never pruned by its own start.
        assert_eq!(jobs.ids().len(), 4);
        assert_eq!(jobs.status(&ids[0]), None);
        assert!(matches!(
            jobs.status(&ids[9]),
            Some(JobStatus::Completed { index: 10, .. })
        ));
        assert_eq!(ledger.len(), 11);
    }

    #[test]
    fn test_unknown_job() {
        let (_ledger, jobs) = jobs_for(1);
        let id = Uuid::new_v4();

        assert_eq!(jobs.status(&id), None);
        assert_eq!(jobs.cancel(&id), None);
    }
}
