//! Background execution of conversion jobs.
//!
//! Each submitted job gets its own tokio task. A semaphore caps how many of
//! those tasks may run ffmpeg at once; the rest wait in `Pending`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::Job;
use crate::processor::{TranscodeOutcome, Transcoder};
use crate::store::JobStore;

#[derive(Clone)]
pub struct ConversionDispatcher {
    store: JobStore,
    transcoder: Arc<Transcoder>,
    permits: Arc<Semaphore>,
}

impl ConversionDispatcher {
    pub fn new(store: JobStore, transcoder: Arc<Transcoder>, max_concurrent_jobs: usize) -> Self {
        Self {
            store,
            transcoder,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Stores the job, then schedules it. The job is visible through `fetch`
    /// by the time this returns.
    pub fn submit(&self, job: Job) -> Uuid {
        let id = job.id;
        self.store.insert(job);

        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.process_job(id).await });

        id
    }

    /// Stops admitting jobs. Jobs still waiting for a permit, and any
    /// submitted later, end up `Failed`; running conversions finish.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    pub fn fetch(&self, id: &Uuid) -> Option<Job> {
        self.store.get(id)
    }

    pub fn list(&self) -> Vec<Job> {
        self.store.list()
    }

    async fn process_job(&self, id: Uuid) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(job_id = %id, "worker pool closed before the job could start");
                let failed = self
                    .store
                    .update(&id, |job| job.fail("Processing error: worker pool shut down"));
                if let Some(Err(err)) = failed {
                    error!(job_id = %id, "could not record shutdown: {err}");
                }
                return;
            }
        };

        let job = match self.store.update(&id, |job| job.start()) {
            Some(Ok(job)) => job,
            Some(Err(err)) => {
                warn!(job_id = %id, "not starting job: {err}");
                return;
            }
            None => {
                warn!(job_id = %id, "no such job registered, ignoring");
                return;
            }
        };

        info!(job_id = %id, target = %job.target_format, "Starting async conversion");

        let outcome = self.transcoder.run(&job).await;

        let applied = match &outcome {
            TranscodeOutcome::Completed { output_size } => {
                self.store.update(&id, |job| job.complete(*output_size))
            }
            TranscodeOutcome::Failed { message } => {
                self.store.update(&id, |job| job.fail(message.clone()))
            }
        };

        match applied {
            Some(Ok(job)) => info!(job_id = %id, state = ?job.state, "Conversion finished"),
            Some(Err(err)) => error!(job_id = %id, "could not record outcome: {err}"),
            None => warn!(job_id = %id, "job vanished while converting"),
        }
    }

    /// Drops finished jobs older than `max_age` along with their files.
    pub async fn purge_expired(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };

        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return 0;
        };

        let expired = self.store.remove_completed_before(cutoff);

        for job in &expired {
            info!(job_id = %job.id, "Removing expired job");
            // The files may already be gone.
            let _ = tokio::fs::remove_file(&job.source_path).await;
            let _ = tokio::fs::remove_file(&job.output_path).await;
        }

        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::format::Format;
    use crate::hwaccel::EncoderDetector;
    use crate::models::{test_job, State};
    use std::path::PathBuf;

    fn dispatcher(workers: usize) -> ConversionDispatcher {
        let mut config = Config::default();
        config.ffmpeg_path = PathBuf::from("/nonexistent/ffmpeg-for-tests");
        config.output_dir = std::env::temp_dir().join("ffconvert-dispatcher-tests");
        config.gpu.enabled = false;
        let detector = Arc::new(EncoderDetector::new(&config));
        let transcoder = Arc::new(Transcoder::new(&config, detector));
        ConversionDispatcher::new(JobStore::new(), transcoder, workers)
    }

    async fn wait_for_terminal(dispatcher: &ConversionDispatcher, id: &Uuid) -> Job {
        for _ in 0..200 {
            let job = dispatcher.fetch(id).unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test]
    async fn submitted_job_is_immediately_visible() {
        let dispatcher = dispatcher(1);
        let mut job = test_job(Format::Mp4);
        job.output_path = std::env::temp_dir()
            .join("ffconvert-dispatcher-tests")
            .join(&job.output_file_name);
        let id = dispatcher.submit(job);

        let seen = dispatcher.fetch(&id).expect("job visible after submit");
        assert_eq!(seen.id, id);
    }

    #[tokio::test]
    async fn spawn_failure_ends_in_failed_state() {
        let dispatcher = dispatcher(2);
        let mut job = test_job(Format::Flac);
        job.output_path = std::env::temp_dir()
            .join("ffconvert-dispatcher-tests")
            .join(&job.output_file_name);
        let id = dispatcher.submit(job);

        let job = wait_for_terminal(&dispatcher, &id).await;
        assert_eq!(job.state, State::Failed);
        assert!(job.error_message.unwrap().starts_with("Conversion error"));
        assert!(job.completed_at.unwrap() >= job.created_at);
        assert!(job.output_size.is_none());
    }

    #[tokio::test]
    async fn fetch_unknown_is_none() {
        let dispatcher = dispatcher(1);
        assert!(dispatcher.fetch(&Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn purge_removes_old_finished_jobs() {
        let dispatcher = dispatcher(1);
        let mut job = test_job(Format::Mp4);
        job.start().unwrap();
        job.fail("old").unwrap();
        job.completed_at = Some(Utc::now() - chrono::Duration::hours(3));
        let id = job.id;
        dispatcher.store.insert(job);

        assert_eq!(dispatcher.purge_expired(Duration::from_secs(3600)).await, 1);
        assert!(dispatcher.fetch(&id).is_none());
        assert_eq!(dispatcher.purge_expired(Duration::from_secs(3600)).await, 0);
    }

    #[tokio::test]
    async fn huge_retention_expires_nothing() {
        let dispatcher = dispatcher(1);
        let mut job = test_job(Format::Mp4);
        job.start().unwrap();
        job.fail("old").unwrap();
        let id = job.id;
        dispatcher.store.insert(job);

        let ages = [Duration::from_secs(100_000_000_000_000), Duration::MAX];
        for age in ages {
            assert_eq!(dispatcher.purge_expired(age).await, 0);
        }
        assert!(dispatcher.fetch(&id).is_some());
    }

    #[tokio::test]
    async fn jobs_submitted_after_shutdown_fail() {
        let dispatcher = dispatcher(1);
        dispatcher.shutdown();

        let mut job = test_job(Format::Mp3);
        job.output_path = std::env::temp_dir()
            .join("ffconvert-dispatcher-tests")
            .join(&job.output_file_name);
        let id = dispatcher.submit(job);

        let job = wait_for_terminal(&dispatcher, &id).await;
        assert_eq!(job.state, State::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Processing error: worker pool shut down")
        );
        assert!(job.completed_at.is_some());
    }
}
