//! Queue, active set and adaptive concurrency limit of the publish scheduler.
//!
//! Invariants: `active.len() <= limit` and `limit >= 1` after every call.
//! The limit only shrinks on failure and only grows back (to its default)
//! once nothing is pending or active.

use std::collections::{HashSet, VecDeque};

use crate::domain::jobs::PublishJob;
use crate::domain::lifecycle::{Lifecycle, LifecycleRegistry};
use crate::error::{EngineError, EngineResult};

/// What happened to a video when one of its jobs left without being requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// Last job of a non-stopped cycle succeeded: the video must be finalized.
    pub finalize: bool,
    pub limit_reset: bool,
}

#[derive(Debug)]
pub struct SchedulerState {
    pending: VecDeque<PublishJob>,
    active: HashSet<PublishJob>,
    limit: usize,
    default_limit: usize,
    lifecycles: LifecycleRegistry,
}

impl SchedulerState {
    pub fn new(default_limit: usize) -> Self {
        let default_limit = default_limit.max(1);
        Self {
            pending: VecDeque::new(),
            active: HashSet::new(),
            limit: default_limit,
            default_limit,
            lifecycles: LifecycleRegistry::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending(&self) -> impl Iterator<Item = &PublishJob> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    pub fn is_stopping(&self, video_id: &str) -> bool {
        self.lifecycles.is_stopping(video_id)
    }

    pub fn lifecycle(&self, video_id: &str) -> Option<Lifecycle> {
        self.lifecycles.state(video_id)
    }

    fn has_jobs(&self, video_id: &str) -> bool {
        self.pending.iter().any(|job| job.video_id == video_id)
            || self.active.iter().any(|job| job.video_id == video_id)
    }

    /// Appends a job. Returns `false` when the same job is already pending or active.
    pub fn enqueue(&mut self, job: PublishJob) -> EngineResult<bool> {
        match self.lifecycles.state(&job.video_id) {
            Some(Lifecycle::Stopping) => return Err(EngineError::PublishingStopping),
            None | Some(Lifecycle::Stopped) => {
                self.lifecycles
                    .transition(&job.video_id, Lifecycle::Pending)
                    .map_err(|_| EngineError::PublishingStopping)?;
            }
            Some(Lifecycle::Pending) | Some(Lifecycle::Running) => {}
        }
        if self.pending.contains(&job) || self.active.contains(&job) {
            return Ok(false);
        }
        self.pending.push_back(job);
        Ok(true)
    }

    /// Moves head jobs into the active set while a slot is free.
    pub fn take_ready(&mut self) -> Vec<PublishJob> {
        let mut ready = Vec::new();
        while self.active.len() < self.limit {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            // Pending -> Running, or Running -> Running for a video already in flight.
            let _ = self.lifecycles.transition(&job.video_id, Lifecycle::Running);
            self.active.insert(job.clone());
            ready.push(job);
        }
        ready
    }

    pub fn complete(&mut self, job: &PublishJob) -> Departure {
        self.active.remove(job);
        self.depart(&job.video_id, true)
    }

    /// Drops a job for good: stopped video or a failure retrying cannot fix.
    pub fn discard(&mut self, job: &PublishJob) -> Departure {
        self.active.remove(job);
        self.depart(&job.video_id, false)
    }

    /// Requeues at the tail and shrinks the limit by one, never below one.
    pub fn fail(&mut self, job: PublishJob) {
        self.active.remove(&job);
        self.pending.push_back(job);
        self.limit = self.limit.saturating_sub(1).max(1);
    }

    /// Marks the video as stopping and removes its pending jobs, which are returned.
    pub fn stop_video(&mut self, video_id: &str) -> Vec<PublishJob> {
        if self.lifecycles.state(video_id).is_none() {
            return Vec::new();
        }
        let _ = self.lifecycles.transition(video_id, Lifecycle::Stopping);

        let (removed, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|job| job.video_id == video_id);
        self.pending = kept.into();

        if !self.has_jobs(video_id) {
            self.end_cycle(video_id);
        }
        self.reset_if_idle();
        removed
    }

    fn depart(&mut self, video_id: &str, succeeded: bool) -> Departure {
        let mut finalize = false;
        if !self.has_jobs(video_id) {
            finalize = succeeded && !self.lifecycles.is_stopping(video_id);
            self.end_cycle(video_id);
        }
        Departure {
            finalize,
            limit_reset: self.reset_if_idle(),
        }
    }

    fn end_cycle(&mut self, video_id: &str) {
        let _ = self.lifecycles.transition(video_id, Lifecycle::Stopped);
        self.lifecycles.forget(video_id);
    }

    fn reset_if_idle(&mut self) -> bool {
        if self.is_idle() && self.limit != self.default_limit {
            self.limit = self.default_limit;
            true
        } else {
            false
        }
    }
}
