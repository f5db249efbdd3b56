use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use lesson_core::analytics::{AnalyticsSnapshot, compute_snapshot};
use lesson_core::model::{
    AnswerCode, ExerciseId, LessonDocument, SectionData, SectionId, max_step, section_data_at,
    section_id_at,
};
use lesson_core::time::Clock;
use storage::{ProgressRepository, SectionTimeRepository, Storage};

use crate::api::{AnswerChecks, AnswerVerdict, CompletionChecks, ContentSource, ExerciseScope};
use crate::engine::events::{EVENT_CAPACITY, EngineEvent};
use crate::engine::outcome::{
    BlockReason, SubmissionOutcome, VerifyOutcome, check_failed_message, incomplete_message,
    missing_record_message, offline_deferred_message, submission_failed_message,
};
use crate::error::{ApiError, EngineError};
use crate::ledger::ProgressLedger;
use crate::offline::{OfflineQueue, QueuedActionKind};
use crate::retry::RetryPolicy;
use crate::timer::SectionTimerService;
use crate::verifier::{CompletionVerifier, RemoteCompletion};

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Orchestrates one learner working through one lesson.
///
/// Owns the ledger, the section timers, and the offline queue, and talks to
/// the platform through the `api` traits. Completion verification and answer
/// grading stay remote; everything else is applied locally first and
/// persisted through the repositories.
///
/// All mutating calls take `&mut self`, so a host task serializes operations
/// naturally. Dropping a returned future cancels the in-flight request and
/// leaves the ledger as it was before the call.
pub struct LessonEngine {
    document: LessonDocument,
    ledger: ProgressLedger,
    timer: SectionTimerService,
    queue: OfflineQueue,
    verifier: CompletionVerifier,
    retry: RetryPolicy,
    answers: Arc<dyn AnswerChecks>,
    content: Arc<dyn ContentSource>,
    progress_store: Arc<dyn ProgressRepository>,
    time_store: Arc<dyn SectionTimeRepository>,
    clock: Clock,
    step: usize,
    online: bool,
    auto_advance_delay: Option<Duration>,
    events: broadcast::Sender<EngineEvent>,
}

impl LessonEngine {
    #[must_use]
    pub fn new(
        document: LessonDocument,
        completion_checks: Arc<dyn CompletionChecks>,
        answer_checks: Arc<dyn AnswerChecks>,
        content: Arc<dyn ContentSource>,
        storage: Storage,
        clock: Clock,
    ) -> Self {
        let now = clock.now();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ledger: ProgressLedger::new(&document, now),
            timer: SectionTimerService::new(document.id(), clock),
            queue: OfflineQueue::new(),
            verifier: CompletionVerifier::new(completion_checks),
            retry: RetryPolicy::default(),
            answers: answer_checks,
            content,
            progress_store: storage.progress,
            time_store: storage.section_times,
            clock,
            step: 0,
            online: true,
            auto_advance_delay: None,
            events,
            document,
        }
    }

    /// Replaces the default retry policy on both the completion verifier
    /// and the submission pipeline.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.verifier = self.verifier.with_retry(retry.clone());
        self.retry = retry;
        self
    }

    /// Enables delayed auto-advance to the next incomplete section.
    #[must_use]
    pub fn with_auto_advance(mut self, delay: Duration) -> Self {
        self.auto_advance_delay = Some(delay);
        self
    }

    /// Loads persisted progress and timing history, resumes the view at the
    /// first incomplete section, and starts its timer.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the repositories fail.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        let lesson_id = self.document.id();
        let snapshot = self.progress_store.load_progress(lesson_id).await?;
        self.ledger.hydrate(snapshot, self.clock.now());
        let times = self.time_store.load_section_times(lesson_id).await?;
        self.timer.hydrate(&times);
        self.persist_metadata().await?;

        self.step = self
            .ledger
            .next_incomplete()
            .and_then(|section_id| self.ledger.step_of(&section_id))
            .unwrap_or(0);
        let section_id = self.current_section_id();
        self.timer.start(section_id);
        self.emit(EngineEvent::Navigated {
            step: self.step,
            section_id,
        });
        Ok(())
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Advances one step. Returns `false` when already at the last section.
    ///
    /// Navigation never verifies completion; hosts that want gated forward
    /// movement call [`Self::verify_current_section`] first and check
    /// [`VerifyOutcome::is_complete`].
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the outgoing timer record cannot
    /// be persisted.
    pub async fn next(&mut self) -> Result<bool, EngineError> {
        if self.step >= max_step(self.document.concept_count()) {
            return Ok(false);
        }
        self.move_to(self.step + 1).await?;
        Ok(true)
    }

    /// Retreats one step. Returns `false` when already at the overview.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the outgoing timer record cannot
    /// be persisted.
    pub async fn previous(&mut self) -> Result<bool, EngineError> {
        if self.step == 0 {
            return Ok(false);
        }
        self.move_to(self.step - 1).await?;
        Ok(true)
    }

    /// Jumps straight to a step when the accessibility rule allows it: the
    /// target must be a completed section, the section already in view, or
    /// the overview. Steps past the end are clamped first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the outgoing timer record cannot
    /// be persisted.
    pub async fn jump_to(&mut self, step: usize) -> Result<bool, EngineError> {
        let step = step.min(max_step(self.document.concept_count()));
        if step == self.step {
            return Ok(true);
        }
        let target = section_id_at(&self.document, step).unwrap_or(SectionId::Overview);
        if step != 0 && !self.ledger.is_section_complete(&target) {
            tracing::debug!("refusing jump to step {}; {} is not completed", step, target);
            return Ok(false);
        }
        self.move_to(step).await?;
        Ok(true)
    }

    /// First canonical section the ledger has no completion for.
    #[must_use]
    pub fn resolve_next_incomplete(&self) -> Option<SectionId> {
        self.ledger.next_incomplete()
    }

    /// Waits the configured delay, then moves the view to the next
    /// incomplete section and reports where it landed.
    ///
    /// Returns `None` without moving when auto-advance is not configured or
    /// every section is already complete. The delay gives the learner a
    /// moment to read the completion feedback before the view changes.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the outgoing timer record cannot
    /// be persisted.
    pub async fn auto_advance(&mut self) -> Result<Option<SectionId>, EngineError> {
        let Some(delay) = self.auto_advance_delay else {
            return Ok(None);
        };
        let Some(section_id) = self.ledger.next_incomplete() else {
            return Ok(None);
        };
        let Some(step) = self.ledger.step_of(&section_id) else {
            return Ok(None);
        };
        tokio::time::sleep(delay).await;
        if step != self.step {
            self.move_to(step).await?;
        }
        Ok(Some(section_id))
    }

    /// Pauses the stopwatch of the section in view.
    pub fn pause_timer(&mut self) {
        let section_id = self.current_section_id();
        self.timer.pause(&section_id);
    }

    /// Resumes the stopwatch of the section in view.
    pub fn resume_timer(&mut self) {
        let section_id = self.current_section_id();
        self.timer.resume(&section_id);
    }

    async fn move_to(&mut self, step: usize) -> Result<(), EngineError> {
        let outgoing = self.current_section_id();
        if let Some(record) = self.timer.end(&outgoing) {
            self.time_store.record_section_time(&record).await?;
        }
        self.step = step;
        let section_id = self.current_section_id();
        self.timer.start(section_id);
        tracing::debug!("moved to step {} ({})", step, section_id);
        self.emit(EngineEvent::Navigated { step, section_id });
        Ok(())
    }

    //
    // ─── COMPLETION ────────────────────────────────────────────────────────────
    //

    /// Verifies the section currently in view.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the marked progress cannot be
    /// persisted.
    pub async fn verify_current_section(&mut self) -> Result<VerifyOutcome, EngineError> {
        let section_id = self.current_section_id();
        self.verify_section(section_id).await
    }

    /// Asks the platform whether `section_id` is complete and records the
    /// answer in the ledger.
    ///
    /// A missing completion record counts as complete; the outcome then
    /// carries a warning instead of blocking the learner on a platform data
    /// gap. Remote failures never surface as `Err` here; they come back as
    /// [`VerifyOutcome::Blocked`] with a learner-facing message.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the marked progress cannot be
    /// persisted.
    pub async fn verify_section(
        &mut self,
        section_id: SectionId,
    ) -> Result<VerifyOutcome, EngineError> {
        match self.verifier.check(self.document.id(), &section_id).await {
            Ok(RemoteCompletion::Confirmed) => self.confirm_section(section_id, None).await,
            Ok(RemoteCompletion::MissingRecord) => {
                let warning = missing_record_message(&section_id);
                self.confirm_section(section_id, Some(warning)).await
            }
            Ok(RemoteCompletion::Denied) => Ok(VerifyOutcome::Blocked(BlockReason::Incomplete {
                message: incomplete_message(&section_id),
                section_id,
            })),
            Err(error) => {
                tracing::warn!("completion check for {} failed: {}", section_id, error);
                Ok(VerifyOutcome::Blocked(BlockReason::CheckFailed {
                    message: check_failed_message(&section_id, &error),
                    section_id,
                }))
            }
        }
    }

    async fn confirm_section(
        &mut self,
        section_id: SectionId,
        warning: Option<String>,
    ) -> Result<VerifyOutcome, EngineError> {
        let marked = self.ledger.mark_section_complete(section_id, self.clock.now());

        if marked.newly_completed {
            // The first completion also closes the section's stopwatch.
            if let Some(record) = self.timer.end(&section_id) {
                self.time_store.record_section_time(&record).await?;
            }
        }
        self.persist_section(&section_id).await?;
        self.persist_metadata().await?;

        if marked.newly_completed {
            self.emit(EngineEvent::SectionCompleted {
                section_id,
                newly_completed: true,
                warning: warning.clone(),
            });
            self.emit_progress();
            if self.ledger.is_lesson_complete() {
                self.emit(EngineEvent::LessonCompleted {
                    lesson_id: self.document.id(),
                });
            }
        }

        Ok(match warning {
            Some(warning) => VerifyOutcome::CompletedWithWarning {
                section_id,
                newly_completed: marked.newly_completed,
                warning,
            },
            None => VerifyOutcome::Completed {
                section_id,
                newly_completed: marked.newly_completed,
            },
        })
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    /// Pushes one answer through the dedup, offline, and retry guards.
    ///
    /// Resolution order: an exercise already answered correctly returns
    /// [`SubmissionOutcome::AlreadyAnswered`] without touching the network;
    /// while offline the answer is queued and comes back as `Deferred`;
    /// otherwise the platform grades it. A correct answer that settles the
    /// last open exercise of its section triggers a completion check for
    /// that section in the background.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` only; platform failures fold into the
    /// outcome.
    pub async fn submit_answer(
        &mut self,
        exercise_id: ExerciseId,
        answer: AnswerCode,
    ) -> Result<SubmissionOutcome, EngineError> {
        let scope = if self.document.concept_owning_exercise(exercise_id).is_some() {
            ExerciseScope::Concept
        } else if self.document.exercise_by_id(exercise_id).is_some() {
            ExerciseScope::General
        } else {
            return Ok(SubmissionOutcome::Failed {
                exercise_id,
                message: "This exercise is not part of the current lesson.".to_string(),
            });
        };
        self.submit_with_scope(exercise_id, answer, scope).await
    }

    async fn submit_with_scope(
        &mut self,
        exercise_id: ExerciseId,
        answer: AnswerCode,
        scope: ExerciseScope,
    ) -> Result<SubmissionOutcome, EngineError> {
        if self.ledger.is_exercise_answered(exercise_id) {
            return Ok(SubmissionOutcome::AlreadyAnswered { exercise_id });
        }

        if !self.online {
            self.queue.enqueue(
                QueuedActionKind::SubmitAnswer {
                    exercise_id,
                    answer,
                    scope,
                },
                self.clock.now(),
            );
            self.emit(EngineEvent::AnswerDeferred { exercise_id });
            return Ok(SubmissionOutcome::Deferred {
                exercise_id,
                message: offline_deferred_message(),
            });
        }

        let answers = &self.answers;
        let result = self
            .retry
            .run(ApiError::is_retryable, || {
                answers.check_answer(exercise_id, answer, scope)
            })
            .await;

        match result {
            Ok(verdict) => self.apply_verdict(exercise_id, answer, &verdict).await,
            Err(ApiError::AlreadyAnswered) => {
                // Another submission for the same exercise won the race; the
                // platform's record stands and nothing local changes.
                Ok(SubmissionOutcome::AlreadyAnswered { exercise_id })
            }
            Err(error) => {
                tracing::warn!("answer check for exercise {} failed: {}", exercise_id, error);
                Ok(SubmissionOutcome::Failed {
                    exercise_id,
                    message: submission_failed_message(&error),
                })
            }
        }
    }

    async fn apply_verdict(
        &mut self,
        exercise_id: ExerciseId,
        answer: AnswerCode,
        verdict: &AnswerVerdict,
    ) -> Result<SubmissionOutcome, EngineError> {
        self.ledger
            .record_exercise_result(exercise_id, answer, verdict.is_correct, self.clock.now());
        self.persist_exercise(exercise_id).await?;
        let owning_section = self.ledger.section_of_exercise(exercise_id);
        if let Some(section_id) = owning_section {
            self.persist_section(&section_id).await?;
        }
        self.persist_metadata().await?;

        if verdict.is_correct {
            if let Some(section_id) = owning_section {
                if !self.ledger.is_section_complete(&section_id)
                    && self.ledger.section_exercises_answered(&section_id)
                {
                    // That answer settled the section's last open exercise.
                    // Re-check silently: the ledger effect and events stick,
                    // the outcome message is dropped.
                    let _ = self.verify_section(section_id).await?;
                }
            }
        }

        Ok(SubmissionOutcome::Answered {
            exercise_id,
            correct: verdict.is_correct,
            message: verdict.message.clone(),
        })
    }

    //
    // ─── OFFLINE QUEUE AND CONTENT ─────────────────────────────────────────────
    //

    /// Feeds the host's connectivity signal. Transitioning from offline to
    /// online drains the queue in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when replayed progress cannot be
    /// persisted.
    pub async fn set_online(&mut self, online: bool) -> Result<(), EngineError> {
        let was_online = self.online;
        self.online = online;
        if was_online != online {
            self.emit(EngineEvent::ConnectivityChanged { online });
        }
        if online && !was_online && !self.queue.is_empty() {
            self.drain_queue().await?;
        }
        Ok(())
    }

    /// Re-fetches the lesson document and carries current progress over to
    /// it. While offline the refresh is queued instead; `Ok(false)` means
    /// the document has not changed yet.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the refreshed metadata cannot be
    /// persisted.
    pub async fn refresh_document(&mut self) -> Result<bool, EngineError> {
        let subject_slug = self.document.subject_slug().to_string();
        let topic_slug = self.document.topic().to_string();
        if !self.online {
            self.queue.enqueue(
                QueuedActionKind::RefreshContent {
                    subject_slug,
                    topic_slug,
                },
                self.clock.now(),
            );
            return Ok(false);
        }
        match self.fetch_document(&subject_slug, &topic_slug).await {
            Ok(document) => {
                self.apply_document(document);
                self.persist_metadata().await?;
                Ok(true)
            }
            Err(error) => {
                tracing::warn!("content refresh failed: {}", error);
                Ok(false)
            }
        }
    }

    /// Clears all progress for the lesson, locally and in storage, and
    /// returns the view to the overview. Timing history and queued offline
    /// actions are dropped with it.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` when the stored rows cannot be
    /// deleted.
    pub async fn reset(&mut self) -> Result<(), EngineError> {
        self.ledger.reset(self.clock.now());
        self.timer.clear();
        self.queue.clear();
        self.progress_store
            .delete_progress(self.document.id())
            .await?;
        self.persist_metadata().await?;
        self.step = 0;
        self.timer.start(self.current_section_id());
        self.emit_progress();
        Ok(())
    }

    async fn drain_queue(&mut self) -> Result<(), EngineError> {
        let pending = self.queue.len();
        let mut replayed = 0usize;
        let mut dropped = 0usize;
        for _ in 0..pending {
            let Some(action) = self.queue.pop() else { break };
            let name = action.kind.name();
            let succeeded = self.replay_action(action.kind.clone()).await?;
            if succeeded {
                replayed += 1;
            } else if let Some(retry) = action.into_retry() {
                self.queue.requeue(retry);
            } else {
                dropped += 1;
                tracing::warn!("abandoning queued {} after repeated replay failures", name);
            }
        }
        self.emit(EngineEvent::QueueDrained {
            replayed,
            dropped,
            pending: self.queue.len(),
        });
        Ok(())
    }

    async fn replay_action(&mut self, kind: QueuedActionKind) -> Result<bool, EngineError> {
        match kind {
            QueuedActionKind::SubmitAnswer {
                exercise_id,
                answer,
                scope,
            } => {
                let outcome = self.submit_with_scope(exercise_id, answer, scope).await?;
                Ok(!matches!(outcome, SubmissionOutcome::Failed { .. }))
            }
            QueuedActionKind::RefreshContent {
                subject_slug,
                topic_slug,
            } => match self.fetch_document(&subject_slug, &topic_slug).await {
                Ok(document) => {
                    self.apply_document(document);
                    self.persist_metadata().await?;
                    Ok(true)
                }
                Err(error) => {
                    tracing::warn!("queued content refresh failed: {}", error);
                    Ok(false)
                }
            },
        }
    }

    async fn fetch_document(
        &self,
        subject_slug: &str,
        topic_slug: &str,
    ) -> Result<LessonDocument, ApiError> {
        let content = &self.content;
        self.retry
            .run(ApiError::is_retryable, || {
                content.fetch_lesson(subject_slug, topic_slug)
            })
            .await
    }

    fn apply_document(&mut self, document: LessonDocument) {
        let now = self.clock.now();
        let snapshot = self.ledger.to_snapshot();
        let mut ledger = ProgressLedger::new(&document, now);
        ledger.hydrate(snapshot, now);
        self.ledger = ledger;
        self.document = document;
        // A shrunken document can leave the step past the end.
        self.step = self.step.min(max_step(self.document.concept_count()));
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    /// Derived performance figures over the current ledger and pacing
    /// history.
    #[must_use]
    pub fn analytics(&self) -> AnalyticsSnapshot {
        compute_snapshot(
            &self.document,
            self.ledger.metadata(),
            self.ledger.exercises(),
            self.timer.section_secs(),
            self.clock.now(),
        )
    }

    #[must_use]
    pub fn current_step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub fn current_section(&self) -> SectionId {
        self.current_section_id()
    }

    /// Payload of the section in view.
    #[must_use]
    pub fn current_section_data(&self) -> Option<SectionData<'_>> {
        section_data_at(&self.document, self.step)
    }

    #[must_use]
    pub fn document(&self) -> &LessonDocument {
        &self.document
    }

    #[must_use]
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Offline actions waiting for a reconnect.
    #[must_use]
    pub fn queued_actions(&self) -> usize {
        self.queue.len()
    }

    /// New receiver on the engine's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn current_section_id(&self) -> SectionId {
        section_id_at(&self.document, self.step).unwrap_or(SectionId::Overview)
    }

    fn emit(&self, event: EngineEvent) {
        // No observers is fine.
        let _ = self.events.send(event);
    }

    fn emit_progress(&self) {
        let metadata = self.ledger.metadata();
        self.emit(EngineEvent::ProgressChanged {
            completed_sections: metadata.completed_sections(),
            total_sections: metadata.total_sections(),
            overall_progress: metadata.overall_progress(),
        });
    }

    async fn persist_metadata(&self) -> Result<(), EngineError> {
        self.progress_store
            .upsert_metadata(self.ledger.metadata())
            .await?;
        Ok(())
    }

    async fn persist_section(&self, section_id: &SectionId) -> Result<(), EngineError> {
        if let Some(progress) = self.ledger.section(section_id) {
            self.progress_store
                .upsert_section_progress(self.document.id(), progress)
                .await?;
        }
        Ok(())
    }

    async fn persist_exercise(&self, exercise_id: ExerciseId) -> Result<(), EngineError> {
        if let Some(progress) = self.ledger.exercise(exercise_id) {
            self.progress_store
                .upsert_exercise_progress(self.document.id(), progress)
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LessonEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LessonEngine")
            .field("lesson_id", &self.document.id())
            .field("step", &self.step)
            .field("online", &self.online)
            .field("queued_actions", &self.queue.len())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use lesson_core::model::{
        Concept, ConceptId, Exercise, LessonId, LessonNarrative, Objective, canonical_sections,
    };
    use lesson_core::time::fixed_clock;

    use super::*;
    use crate::api::CompletionCheck;

    fn exercise(id: u64) -> Exercise {
        Exercise {
            id: ExerciseId::new(id),
            title: format!("Exercise {id}"),
            problem: "1/2 + 1/4 = ?".to_string(),
            solution_steps: Vec::new(),
            answer_options: vec!["3/4".to_string(), "2/6".to_string()],
            correct_answer: "A".to_string(),
        }
    }

    fn concept(id: u64, order_index: u32, exercise_ids: &[u64]) -> Concept {
        Concept {
            id: ConceptId::new(id),
            order_index,
            title: format!("Concept {id}"),
            blocks: Vec::new(),
            examples: Vec::new(),
            exercises: exercise_ids.iter().map(|&id| exercise(id)).collect(),
        }
    }

    fn narrative() -> LessonNarrative {
        LessonNarrative {
            overview: "What fractions are".to_string(),
            objectives: vec![Objective {
                description: "Recognize a fraction".to_string(),
                points: Vec::new(),
            }],
            key_concepts: BTreeMap::new(),
            summary: "Parts of a whole".to_string(),
            application: "Sharing fairly".to_string(),
            video_path: None,
        }
    }

    // Two concepts and one general exercise: five canonical sections.
    fn document() -> LessonDocument {
        LessonDocument::new(
            LessonId::new(1),
            "mathematics",
            "fractions",
            narrative(),
            vec![concept(5, 1, &[51, 52]), concept(7, 2, &[71])],
            vec![exercise(90)],
        )
        .expect("valid document")
    }

    fn expanded_document() -> LessonDocument {
        LessonDocument::new(
            LessonId::new(1),
            "mathematics",
            "fractions",
            narrative(),
            vec![
                concept(5, 1, &[51, 52]),
                concept(7, 2, &[71]),
                concept(9, 3, &[91]),
            ],
            vec![exercise(90)],
        )
        .expect("valid document")
    }

    fn answer(letter: char) -> AnswerCode {
        AnswerCode::new(letter).expect("valid answer code")
    }

    #[derive(Default)]
    struct FakeCompletion {
        complete: Mutex<HashSet<SectionId>>,
        missing: Mutex<HashSet<SectionId>>,
        scripted_failure: Mutex<Option<ApiError>>,
        calls: Mutex<u32>,
    }

    impl FakeCompletion {
        fn confirm(&self, section_id: SectionId) {
            self.complete.lock().unwrap().insert(section_id);
        }

        fn confirm_all(&self, document: &LessonDocument) {
            for section_id in canonical_sections(document) {
                self.confirm(section_id);
            }
        }

        fn lose_record(&self, section_id: SectionId) {
            self.missing.lock().unwrap().insert(section_id);
        }

        fn fail_once(&self, error: ApiError) {
            *self.scripted_failure.lock().unwrap() = Some(error);
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }

        fn result_for(&self, section_id: SectionId) -> Result<CompletionCheck, ApiError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(error) = self.scripted_failure.lock().unwrap().take() {
                return Err(error);
            }
            if self.missing.lock().unwrap().contains(&section_id) {
                return Err(ApiError::NoCompletionRecord);
            }
            Ok(CompletionCheck {
                is_completed: self.complete.lock().unwrap().contains(&section_id),
            })
        }
    }

    #[async_trait]
    impl CompletionChecks for FakeCompletion {
        async fn overview_completed(
            &self,
            _lesson_id: LessonId,
        ) -> Result<CompletionCheck, ApiError> {
            self.result_for(SectionId::Overview)
        }

        async fn concept_completed(
            &self,
            _lesson_id: LessonId,
            concept_id: ConceptId,
        ) -> Result<CompletionCheck, ApiError> {
            self.result_for(SectionId::Concept(concept_id))
        }

        async fn summary_completed(
            &self,
            _lesson_id: LessonId,
        ) -> Result<CompletionCheck, ApiError> {
            self.result_for(SectionId::SummaryApplication)
        }

        async fn general_exercises_completed(
            &self,
            _lesson_id: LessonId,
        ) -> Result<CompletionCheck, ApiError> {
            self.result_for(SectionId::GeneralExercises)
        }
    }

    struct FakeAnswers {
        correct: char,
        failures: Mutex<VecDeque<ApiError>>,
        calls: Mutex<u32>,
    }

    impl FakeAnswers {
        fn grading(correct: char) -> Self {
            Self {
                correct,
                failures: Mutex::new(VecDeque::new()),
                calls: Mutex::new(0),
            }
        }

        fn push_failure(&self, error: ApiError) {
            self.failures.lock().unwrap().push_back(error);
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AnswerChecks for FakeAnswers {
        async fn check_answer(
            &self,
            _exercise_id: ExerciseId,
            answer: AnswerCode,
            _scope: ExerciseScope,
        ) -> Result<AnswerVerdict, ApiError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(error) = self.failures.lock().unwrap().pop_front() {
                return Err(error);
            }
            let is_correct = answer.letter() == self.correct;
            Ok(AnswerVerdict {
                is_correct,
                message: if is_correct {
                    "Correct answer.".to_string()
                } else {
                    "Wrong answer.".to_string()
                },
            })
        }
    }

    struct FakeContent {
        next: Mutex<Option<LessonDocument>>,
        calls: Mutex<u32>,
    }

    impl FakeContent {
        fn empty() -> Self {
            Self {
                next: Mutex::new(None),
                calls: Mutex::new(0),
            }
        }

        fn serve(&self, document: LessonDocument) {
            *self.next.lock().unwrap() = Some(document);
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ContentSource for FakeContent {
        async fn fetch_lesson(
            &self,
            _subject_slug: &str,
            _topic_slug: &str,
        ) -> Result<LessonDocument, ApiError> {
            *self.calls.lock().unwrap() += 1;
            self.next.lock().unwrap().clone().ok_or(ApiError::Server {
                status: 503,
                message: "content unavailable".to_string(),
            })
        }

        async fn fetch_lesson_by_id(
            &self,
            _lesson_id: LessonId,
        ) -> Result<LessonDocument, ApiError> {
            self.fetch_lesson("", "").await
        }
    }

    struct Harness {
        engine: LessonEngine,
        completion: Arc<FakeCompletion>,
        answers: Arc<FakeAnswers>,
        content: Arc<FakeContent>,
        storage: Storage,
    }

    fn harness() -> Harness {
        let completion = Arc::new(FakeCompletion::default());
        let answers = Arc::new(FakeAnswers::grading('A'));
        let content = Arc::new(FakeContent::empty());
        let storage = Storage::in_memory();
        let engine = LessonEngine::new(
            document(),
            Arc::clone(&completion) as Arc<dyn CompletionChecks>,
            Arc::clone(&answers) as Arc<dyn AnswerChecks>,
            Arc::clone(&content) as Arc<dyn ContentSource>,
            Storage {
                progress: Arc::clone(&storage.progress),
                section_times: Arc::clone(&storage.section_times),
            },
            fixed_clock(),
        )
        .with_retry(RetryPolicy::new(3, Duration::ZERO));
        Harness {
            engine,
            completion,
            answers,
            content,
            storage,
        }
    }

    #[tokio::test]
    async fn verified_sections_accumulate_to_full_progress() {
        let mut h = harness();
        h.completion.confirm_all(h.engine.document());
        let mut events = h.engine.subscribe();

        for section_id in canonical_sections(h.engine.document()) {
            let outcome = h.engine.verify_section(section_id).await.expect("verify");
            assert!(outcome.is_complete());
        }

        let metadata = h.engine.ledger().metadata();
        assert_eq!(metadata.completed_sections(), 5);
        assert_eq!(metadata.overall_progress(), 100);
        assert!(h.engine.ledger().is_lesson_complete());

        let mut saw_lesson_completed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::LessonCompleted { .. }) {
                saw_lesson_completed = true;
            }
        }
        assert!(saw_lesson_completed);
    }

    #[tokio::test]
    async fn re_verifying_a_section_does_not_inflate_progress() {
        let mut h = harness();
        h.completion.confirm(SectionId::Overview);

        let first = h
            .engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");
        let second = h
            .engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");

        assert!(matches!(
            first,
            VerifyOutcome::Completed {
                newly_completed: true,
                ..
            }
        ));
        assert!(matches!(
            second,
            VerifyOutcome::Completed {
                newly_completed: false,
                ..
            }
        ));
        assert_eq!(h.engine.ledger().metadata().completed_sections(), 1);
        let row = h
            .engine
            .ledger()
            .section(&SectionId::Overview)
            .expect("section row");
        assert_eq!(row.attempts(), 2);
    }

    #[tokio::test]
    async fn missing_completion_record_completes_with_warning() {
        let mut h = harness();
        h.completion.lose_record(SectionId::SummaryApplication);

        let outcome = h
            .engine
            .verify_section(SectionId::SummaryApplication)
            .await
            .expect("verify");

        match outcome {
            VerifyOutcome::CompletedWithWarning {
                newly_completed,
                warning,
                ..
            } => {
                assert!(newly_completed);
                assert!(warning.contains("No completion record"));
            }
            other => panic!("expected lenient completion, got {other:?}"),
        }
        assert!(
            h.engine
                .ledger()
                .is_section_complete(&SectionId::SummaryApplication)
        );
        assert_eq!(h.completion.calls(), 1);
    }

    #[tokio::test]
    async fn denied_and_failed_checks_block_without_marking() {
        let mut h = harness();

        let denied = h
            .engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");
        assert!(matches!(
            denied,
            VerifyOutcome::Blocked(BlockReason::Incomplete { .. })
        ));

        h.completion.fail_once(ApiError::Server {
            status: 500,
            message: "maintenance".to_string(),
        });
        let failed = h
            .engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");
        match failed {
            VerifyOutcome::Blocked(BlockReason::CheckFailed { message, .. }) => {
                assert!(message.contains("Could not confirm"));
            }
            other => panic!("expected a failed check, got {other:?}"),
        }
        assert_eq!(h.engine.ledger().metadata().completed_sections(), 0);
    }

    #[tokio::test]
    async fn correct_answer_settles_the_exercise_once() {
        let mut h = harness();
        let id = ExerciseId::new(51);

        let graded = h.engine.submit_answer(id, answer('a')).await.expect("submit");
        assert!(matches!(
            graded,
            SubmissionOutcome::Answered { correct: true, .. }
        ));
        assert!(h.engine.ledger().is_exercise_answered(id));

        let repeat = h.engine.submit_answer(id, answer('b')).await.expect("submit");
        assert!(matches!(repeat, SubmissionOutcome::AlreadyAnswered { .. }));
        assert_eq!(h.answers.calls(), 1);

        let row = h.engine.ledger().exercise(id).expect("exercise row");
        assert_eq!(row.attempts(), 1);
        assert!(row.correct_on_first_try());
    }

    #[tokio::test]
    async fn wrong_answer_leaves_the_exercise_open() {
        let mut h = harness();
        let id = ExerciseId::new(51);

        let graded = h.engine.submit_answer(id, answer('b')).await.expect("submit");
        assert!(matches!(
            graded,
            SubmissionOutcome::Answered { correct: false, .. }
        ));
        assert!(!h.engine.ledger().is_exercise_answered(id));

        let retry = h.engine.submit_answer(id, answer('a')).await.expect("submit");
        assert!(matches!(
            retry,
            SubmissionOutcome::Answered { correct: true, .. }
        ));
        assert_eq!(h.answers.calls(), 2);
        let row = h.engine.ledger().exercise(id).expect("exercise row");
        assert_eq!(row.attempts(), 2);
        assert!(!row.correct_on_first_try());
    }

    #[tokio::test]
    async fn remote_duplicate_report_does_not_touch_the_ledger() {
        let mut h = harness();
        let id = ExerciseId::new(51);
        h.answers.push_failure(ApiError::AlreadyAnswered);

        let outcome = h.engine.submit_answer(id, answer('a')).await.expect("submit");

        assert!(matches!(outcome, SubmissionOutcome::AlreadyAnswered { .. }));
        assert!(h.engine.ledger().exercise(id).is_none());
    }

    #[tokio::test]
    async fn unknown_exercise_fails_without_a_network_call() {
        let mut h = harness();

        let outcome = h
            .engine
            .submit_answer(ExerciseId::new(999), answer('a'))
            .await
            .expect("submit");

        assert!(matches!(outcome, SubmissionOutcome::Failed { .. }));
        assert_eq!(h.answers.calls(), 0);
    }

    #[tokio::test]
    async fn terminal_submission_failure_preserves_state() {
        let mut h = harness();
        let id = ExerciseId::new(51);
        h.answers.push_failure(ApiError::Auth);

        let outcome = h.engine.submit_answer(id, answer('a')).await.expect("submit");

        match outcome {
            SubmissionOutcome::Failed { message, .. } => {
                assert!(message.contains("session has expired"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(h.engine.ledger().exercise(id).is_none());
        assert_eq!(h.answers.calls(), 1);
    }

    #[tokio::test]
    async fn settling_the_last_exercise_checks_the_section() {
        let mut h = harness();
        let section_id = SectionId::Concept(ConceptId::new(5));
        h.completion.confirm(section_id);

        h.engine
            .submit_answer(ExerciseId::new(51), answer('a'))
            .await
            .expect("submit");
        assert!(!h.engine.ledger().is_section_complete(&section_id));
        assert_eq!(h.completion.calls(), 0);

        h.engine
            .submit_answer(ExerciseId::new(52), answer('a'))
            .await
            .expect("submit");

        assert!(h.engine.ledger().is_section_complete(&section_id));
        assert_eq!(h.completion.calls(), 1);
    }

    #[tokio::test]
    async fn offline_submissions_queue_and_replay_on_reconnect() {
        let mut h = harness();
        let id = ExerciseId::new(51);
        h.engine.set_online(false).await.expect("go offline");

        let outcome = h.engine.submit_answer(id, answer('a')).await.expect("submit");
        assert!(matches!(outcome, SubmissionOutcome::Deferred { .. }));
        assert_eq!(h.engine.queued_actions(), 1);
        assert_eq!(h.answers.calls(), 0);

        let mut events = h.engine.subscribe();
        h.engine.set_online(true).await.expect("reconnect");

        assert_eq!(h.engine.queued_actions(), 0);
        assert!(h.engine.ledger().is_exercise_answered(id));
        assert_eq!(h.answers.calls(), 1);

        let mut drained = None;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::QueueDrained {
                replayed,
                dropped,
                pending,
            } = event
            {
                drained = Some((replayed, dropped, pending));
            }
        }
        assert_eq!(drained, Some((1, 0, 0)));
    }

    #[tokio::test]
    async fn queued_answer_is_abandoned_after_four_failed_replays() {
        let mut h = harness();
        let id = ExerciseId::new(51);
        for _ in 0..4 {
            h.answers.push_failure(ApiError::Server {
                status: 500,
                message: "down".to_string(),
            });
        }

        h.engine.set_online(false).await.expect("go offline");
        h.engine.submit_answer(id, answer('a')).await.expect("submit");

        for _ in 0..3 {
            h.engine.set_online(true).await.expect("reconnect");
            assert_eq!(h.engine.queued_actions(), 1);
            h.engine.set_online(false).await.expect("go offline");
        }

        let mut events = h.engine.subscribe();
        h.engine.set_online(true).await.expect("reconnect");

        assert_eq!(h.engine.queued_actions(), 0);
        assert!(!h.engine.ledger().is_exercise_answered(id));
        assert_eq!(h.answers.calls(), 4);

        let mut last_drain = None;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::QueueDrained {
                replayed, dropped, ..
            } = event
            {
                last_drain = Some((replayed, dropped));
            }
        }
        assert_eq!(last_drain, Some((0, 1)));
    }

    #[tokio::test]
    async fn jumps_require_completed_targets() {
        let mut h = harness();
        let concept_five = SectionId::Concept(ConceptId::new(5));

        assert!(!h.engine.jump_to(3).await.expect("jump"));
        assert_eq!(h.engine.current_step(), 0);

        h.completion.confirm(concept_five);
        h.engine.verify_section(concept_five).await.expect("verify");

        assert!(h.engine.jump_to(1).await.expect("jump"));
        assert_eq!(h.engine.current_section(), concept_five);

        assert!(h.engine.jump_to(0).await.expect("jump"));
        assert_eq!(h.engine.current_step(), 0);

        // Steps past the end clamp to the last section, still gated.
        assert!(!h.engine.jump_to(99).await.expect("jump"));
        assert_eq!(h.engine.current_step(), 0);
    }

    #[tokio::test]
    async fn stepping_clamps_at_both_ends() {
        let mut h = harness();

        assert!(!h.engine.previous().await.expect("previous"));
        for expected in 1..=4 {
            assert!(h.engine.next().await.expect("next"));
            assert_eq!(h.engine.current_step(), expected);
        }
        assert!(!h.engine.next().await.expect("next"));
        assert_eq!(h.engine.current_section(), SectionId::GeneralExercises);
    }

    #[tokio::test]
    async fn auto_advance_moves_to_the_next_incomplete_section() {
        let mut h = harness();
        assert_eq!(h.engine.auto_advance().await.expect("advance"), None);

        h.engine = h.engine.with_auto_advance(Duration::ZERO);
        h.completion.confirm(SectionId::Overview);
        h.engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");

        let landed = h.engine.auto_advance().await.expect("advance");
        assert_eq!(landed, Some(SectionId::Concept(ConceptId::new(5))));
        assert_eq!(h.engine.current_step(), 1);
    }

    #[tokio::test]
    async fn start_resumes_at_the_first_incomplete_section() {
        let mut h = harness();
        h.completion.confirm_all(h.engine.document());
        h.engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");
        h.engine
            .verify_section(SectionId::Concept(ConceptId::new(5)))
            .await
            .expect("verify");

        let mut resumed = LessonEngine::new(
            document(),
            Arc::clone(&h.completion) as Arc<dyn CompletionChecks>,
            Arc::clone(&h.answers) as Arc<dyn AnswerChecks>,
            Arc::clone(&h.content) as Arc<dyn ContentSource>,
            Storage {
                progress: Arc::clone(&h.storage.progress),
                section_times: Arc::clone(&h.storage.section_times),
            },
            fixed_clock(),
        );
        resumed.start().await.expect("start");

        assert_eq!(resumed.current_step(), 2);
        assert_eq!(
            resumed.current_section(),
            SectionId::Concept(ConceptId::new(7))
        );
        assert_eq!(resumed.ledger().metadata().completed_sections(), 2);
    }

    #[tokio::test]
    async fn reset_clears_local_state_and_storage() {
        let mut h = harness();
        h.completion.confirm_all(h.engine.document());
        h.engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");
        h.engine
            .submit_answer(ExerciseId::new(51), answer('a'))
            .await
            .expect("submit");

        h.engine.reset().await.expect("reset");

        assert_eq!(h.engine.current_step(), 0);
        assert_eq!(h.engine.ledger().metadata().overall_progress(), 0);
        assert!(h.engine.ledger().exercise(ExerciseId::new(51)).is_none());

        let snapshot = h
            .storage
            .progress
            .load_progress(LessonId::new(1))
            .await
            .expect("load");
        assert!(snapshot.sections.is_empty());
        assert!(snapshot.exercises.is_empty());
        let metadata = snapshot.metadata.expect("fresh metadata");
        assert_eq!(metadata.completed_sections(), 0);
    }

    #[tokio::test]
    async fn document_refresh_carries_progress_over() {
        let mut h = harness();
        h.completion.confirm(SectionId::Overview);
        h.engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");

        h.content.serve(expanded_document());
        assert!(h.engine.refresh_document().await.expect("refresh"));

        assert_eq!(h.engine.document().concept_count(), 3);
        assert!(h.engine.ledger().is_section_complete(&SectionId::Overview));
        assert_eq!(h.engine.ledger().metadata().total_sections(), 6);
    }

    #[tokio::test]
    async fn offline_refresh_waits_for_reconnect() {
        let mut h = harness();
        h.engine.set_online(false).await.expect("go offline");

        assert!(!h.engine.refresh_document().await.expect("refresh"));
        assert_eq!(h.engine.queued_actions(), 1);
        assert_eq!(h.content.calls(), 0);

        h.content.serve(expanded_document());
        h.engine.set_online(true).await.expect("reconnect");

        assert_eq!(h.engine.queued_actions(), 0);
        assert_eq!(h.engine.document().concept_count(), 3);
    }

    #[tokio::test]
    async fn observers_see_completion_and_progress_events() {
        let mut h = harness();
        let mut events = h.engine.subscribe();
        h.completion.confirm(SectionId::Overview);

        h.engine
            .verify_section(SectionId::Overview)
            .await
            .expect("verify");

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.iter().any(|event| matches!(
            event,
            EngineEvent::SectionCompleted {
                section_id: SectionId::Overview,
                newly_completed: true,
                ..
            }
        )));
        assert!(seen.iter().any(|event| matches!(
            event,
            EngineEvent::ProgressChanged {
                completed_sections: 1,
                ..
            }
        )));
    }
}
