//! FIFO queue of actions deferred while the learner is offline.
//!
//! The engine feeds it mutating calls it could not make and drains it on
//! reconnect, strictly in enqueue order. An action that keeps failing is
//! abandoned after its fourth failure; the caller who queued it has long
//! moved on.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use lesson_core::model::{AnswerCode, ExerciseId};

use crate::api::ExerciseScope;

/// How many failed replays one action survives before it is dropped.
pub const RETRY_CEILING: u32 = 3;

/// The operations that can be deferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedActionKind {
    SubmitAnswer {
        exercise_id: ExerciseId,
        answer: AnswerCode,
        scope: ExerciseScope,
    },
    RefreshContent {
        subject_slug: String,
        topic_slug: String,
    },
}

impl QueuedActionKind {
    /// Stable name for logs and the pending badge.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            QueuedActionKind::SubmitAnswer { .. } => "submit_answer",
            QueuedActionKind::RefreshContent { .. } => "refresh_content",
        }
    }
}

/// One deferred operation with its replay bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAction {
    pub kind: QueuedActionKind,
    pub queued_at: DateTime<Utc>,
    pub retries: u32,
}

impl QueuedAction {
    /// Accounts one failed replay.
    ///
    /// Returns `None` once the counter passes [`RETRY_CEILING`]; the action
    /// is then abandoned instead of requeued.
    #[must_use]
    pub fn into_retry(mut self) -> Option<Self> {
        self.retries += 1;
        if self.retries > RETRY_CEILING {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug, Default)]
pub struct OfflineQueue {
    actions: VecDeque<QueuedAction>,
}

impl OfflineQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, kind: QueuedActionKind, now: DateTime<Utc>) {
        tracing::debug!("queueing {} for replay", kind.name());
        self.actions.push_back(QueuedAction {
            kind,
            queued_at: now,
            retries: 0,
        });
    }

    pub fn pop(&mut self) -> Option<QueuedAction> {
        self.actions.pop_front()
    }

    /// Puts a failed action back at the tail for the next drain.
    pub fn requeue(&mut self, action: QueuedAction) {
        self.actions.push_back(action);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}
