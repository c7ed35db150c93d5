use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Job, TransitionError};

/// Thread-safe job table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<DashMap<Uuid, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    /// Snapshot of the job, if known.
    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Applies `transition` under the entry lock and returns the updated job.
    ///
    /// `None` means the job is unknown; `Some(Err(_))` means the transition was
    /// refused and the job is unchanged.
    pub fn update<F>(&self, id: &Uuid, transition: F) -> Option<Result<Job, TransitionError>>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut entry = self.jobs.get_mut(id)?;
        Some(transition(entry.value_mut()).map(|_| entry.value().clone()))
    }

    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Removes terminal jobs that finished before `cutoff` and returns them.
    pub fn remove_completed_before(&self, cutoff: DateTime<Utc>) -> Vec<Job> {
        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.state.is_terminal()
                    && entry.completed_at.map(|at| at < cutoff).unwrap_or(false)
            })
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.jobs.remove(&id).map(|(_, job)| job))
            .collect()
    }
}
