use chrono::{DateTime, Duration, Utc};

use crate::model::section::SectionId;

//
// ─── PAUSE INTERVAL ────────────────────────────────────────────────────────────
//

/// One pause window inside a section timing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseInterval {
    paused_at: DateTime<Utc>,
    resumed_at: Option<DateTime<Utc>>,
}

impl PauseInterval {
    fn open(paused_at: DateTime<Utc>) -> Self {
        Self {
            paused_at,
            resumed_at: None,
        }
    }

    #[must_use]
    pub fn paused_at(&self) -> DateTime<Utc> {
        self.paused_at
    }

    #[must_use]
    pub fn resumed_at(&self) -> Option<DateTime<Utc>> {
        self.resumed_at
    }

    /// Length of the pause; `None` while it is still open.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.resumed_at.map(|resumed| resumed - self.paused_at)
    }
}

//
// ─── SECTION TIME TRACKING ─────────────────────────────────────────────────────
//

/// Wall-clock timing for one section visit, pause aware.
///
/// Net time spent is wall time from start to end minus every closed pause;
/// a pause still open at end time subtracts nothing. Once ended the record
/// is frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTimeTracking {
    section_id: SectionId,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    pauses: Vec<PauseInterval>,
    time_spent: Option<Duration>,
}

impl SectionTimeTracking {
    /// Starts timing a section visit.
    #[must_use]
    pub fn start(section_id: SectionId, now: DateTime<Utc>) -> Self {
        Self {
            section_id,
            started_at: now,
            ended_at: None,
            pauses: Vec::new(),
            time_spent: None,
        }
    }

    /// Opens a pause window. No-op while already paused or after end.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.ended_at.is_some() || self.open_pause().is_some() {
            return;
        }
        self.pauses.push(PauseInterval::open(now));
    }

    /// Closes the open pause window, if any. No-op after end.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.ended_at.is_some() {
            return;
        }
        if let Some(pause) = self.pauses.last_mut() {
            if pause.resumed_at.is_none() {
                pause.resumed_at = Some(now);
            }
        }
    }

    /// Freezes the record and returns the net time spent.
    ///
    /// Repeated calls return the original result without recomputing.
    pub fn end(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        if self.ended_at.is_some() {
            return self.time_spent;
        }

        let net = (now - self.started_at) - self.paused_total();
        let net = if net < Duration::zero() {
            Duration::zero()
        } else {
            net
        };

        self.ended_at = Some(now);
        self.time_spent = Some(net);
        self.time_spent
    }

    #[must_use]
    pub fn section_id(&self) -> &SectionId {
        &self.section_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    #[must_use]
    pub fn pauses(&self) -> &[PauseInterval] {
        &self.pauses
    }

    /// Net time spent; `None` until the record is ended.
    #[must_use]
    pub fn time_spent(&self) -> Option<Duration> {
        self.time_spent
    }

    /// Sum of the closed pause windows so far.
    #[must_use]
    pub fn paused_total(&self) -> Duration {
        self.pauses
            .iter()
            .filter_map(PauseInterval::duration)
            .fold(Duration::zero(), |total, pause| total + pause)
    }

    fn open_pause(&self) -> Option<&PauseInterval> {
        self.pauses.iter().find(|pause| pause.resumed_at.is_none())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn at(secs: i64) -> DateTime<Utc> {
        fixed_now() + Duration::seconds(secs)
    }

    #[test]
    fn net_time_subtracts_closed_pause() {
        let mut tracking = SectionTimeTracking::start(SectionId::Overview, at(0));
        tracking.pause(at(10));
        tracking.resume(at(15));
        let net = tracking.end(at(25));
        assert_eq!(net, Some(Duration::seconds(20)));
        assert!(tracking.is_ended());
    }

    #[test]
    fn open_pause_at_end_subtracts_nothing() {
        let mut tracking = SectionTimeTracking::start(SectionId::Overview, at(0));
        tracking.pause(at(10));
        let net = tracking.end(at(25));
        assert_eq!(net, Some(Duration::seconds(25)));
    }

    #[test]
    fn double_pause_and_blind_resume_are_no_ops() {
        let mut tracking = SectionTimeTracking::start(SectionId::Overview, at(0));
        tracking.resume(at(1));
        tracking.pause(at(2));
        tracking.pause(at(3));
        assert_eq!(tracking.pauses().len(), 1);
        tracking.resume(at(6));
        let net = tracking.end(at(10));
        assert_eq!(net, Some(Duration::seconds(6)));
    }

    #[test]
    fn ending_twice_keeps_the_first_result() {
        let mut tracking = SectionTimeTracking::start(SectionId::Overview, at(0));
        assert_eq!(tracking.end(at(8)), Some(Duration::seconds(8)));
        assert_eq!(tracking.end(at(100)), Some(Duration::seconds(8)));
        assert_eq!(tracking.ended_at(), Some(at(8)));
    }

    #[test]
    fn mutations_after_end_are_ignored() {
        let mut tracking = SectionTimeTracking::start(SectionId::Overview, at(0));
        tracking.end(at(5));
        tracking.pause(at(6));
        tracking.resume(at(7));
        assert!(tracking.pauses().is_empty());
        assert_eq!(tracking.time_spent(), Some(Duration::seconds(5)));
    }

    #[test]
    fn multiple_closed_pauses_accumulate() {
        let mut tracking = SectionTimeTracking::start(SectionId::GeneralExercises, at(0));
        tracking.pause(at(5));
        tracking.resume(at(8));
        tracking.pause(at(20));
        tracking.resume(at(24));
        assert_eq!(tracking.paused_total(), Duration::seconds(7));
        assert_eq!(tracking.end(at(30)), Some(Duration::seconds(23)));
    }
}
