//! Per-section stopwatch for one lesson visit.
//!
//! Wraps the core tracking records with the lifecycle the engine needs:
//! start on navigate-in, end on navigate-away or completion, and a running
//! list of ended durations for pacing analytics. Restarting a section that
//! is already timed replaces the old run; availability beats strictness.

use std::collections::HashMap;

use lesson_core::Clock;
use lesson_core::model::{LessonId, SectionId, SectionTimeTracking};
use storage::repository::SectionTimeRecord;

pub struct SectionTimerService {
    clock: Clock,
    lesson_id: LessonId,
    active: HashMap<SectionId, SectionTimeTracking>,
    ended_secs: Vec<i64>,
}

impl SectionTimerService {
    #[must_use]
    pub fn new(lesson_id: LessonId, clock: Clock) -> Self {
        Self {
            clock,
            lesson_id,
            active: HashMap::new(),
            ended_secs: Vec::new(),
        }
    }

    /// Seeds the ended durations from persisted records, oldest first.
    pub fn hydrate(&mut self, records: &[SectionTimeRecord]) {
        self.ended_secs = records
            .iter()
            .map(|record| record.time_spent_secs)
            .collect();
    }

    /// Starts (or restarts) timing a section.
    pub fn start(&mut self, section_id: SectionId) {
        let tracking = SectionTimeTracking::start(section_id, self.clock.now());
        self.active.insert(section_id, tracking);
    }

    /// Opens a pause window; a no-op while already paused or not running.
    pub fn pause(&mut self, section_id: &SectionId) {
        let now = self.clock.now();
        if let Some(tracking) = self.active.get_mut(section_id) {
            tracking.pause(now);
        }
    }

    /// Closes the open pause window; a no-op while not paused.
    pub fn resume(&mut self, section_id: &SectionId) {
        let now = self.clock.now();
        if let Some(tracking) = self.active.get_mut(section_id) {
            tracking.resume(now);
        }
    }

    /// Ends a running section and returns its persistable record.
    ///
    /// Ending a section that was never started is a no-op.
    pub fn end(&mut self, section_id: &SectionId) -> Option<SectionTimeRecord> {
        let mut tracking = self.active.remove(section_id)?;
        let spent = tracking.end(self.clock.now())?;
        self.ended_secs.push(spent.num_seconds());
        SectionTimeRecord::from_tracking(self.lesson_id, &tracking)
    }

    #[must_use]
    pub fn is_running(&self, section_id: &SectionId) -> bool {
        self.active.contains_key(section_id)
    }

    /// Net seconds of every ended section this visit, oldest first.
    #[must_use]
    pub fn section_secs(&self) -> &[i64] {
        &self.ended_secs
    }

    /// Drops all running timers and the ended history.
    pub fn clear(&mut self) {
        self.active.clear();
        self.ended_secs.clear();
    }
}
