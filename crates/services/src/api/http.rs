use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;

use lesson_core::model::{AnswerCode, ConceptId, ExerciseId, LessonDocument, LessonId};

use crate::api::types::{
    AnswerVerdict, ApiEnvelope, CompletionCheck, ExerciseScope, LessonContentDto,
};
use crate::api::{AnswerChecks, ApiConfig, CompletionChecks, ContentSource};
use crate::error::ApiError;

/// `reqwest`-backed client for the lesson platform.
///
/// Implements all three API traits so one instance can serve the whole
/// engine. Each request carries a fresh UUID request id; the bearer token is
/// attached when the configuration has one.
#[derive(Clone)]
pub struct HttpLessonApi {
    client: Client,
    config: ApiConfig,
}

impl HttpLessonApi {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json")
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string());
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<(u16, ApiEnvelope<T>), ApiError> {
        tracing::debug!("GET {}", path);
        self.execute(self.request(Method::GET, path)).await
    }

    async fn post_envelope<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, ApiEnvelope<T>), ApiError> {
        tracing::debug!("POST {}", path);
        self.execute(self.request(Method::POST, path).json(body))
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(u16, ApiEnvelope<T>), ApiError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        match serde_json::from_str::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => Ok((status, envelope)),
            // Gateways answer failures with non-envelope bodies; fold those
            // into a synthetic envelope so status mapping still applies.
            Err(_) if status >= 400 => Ok((
                status,
                ApiEnvelope {
                    success: false,
                    message: format!("http status {status}"),
                    content: None,
                    code: status,
                    errors: BTreeMap::new(),
                },
            )),
            Err(error) => Err(ApiError::Decode(error.to_string())),
        }
    }

    async fn completion_check(&self, path: &str) -> Result<CompletionCheck, ApiError> {
        let (status, envelope) = self.get_envelope::<CompletionCheck>(path).await?;
        match effective_code(status, envelope.code) {
            401 => Err(ApiError::Auth),
            // The platform answers 404 on check routes when the learner has
            // no completion row at all for the lesson.
            404 => Err(ApiError::NoCompletionRecord),
            422 => Err(ApiError::Validation {
                errors: envelope.field_errors(),
                message: envelope.message,
            }),
            code if code >= 500 => Err(ApiError::Server {
                status: code,
                message: envelope.message,
            }),
            _ if envelope.success => envelope
                .content
                .ok_or_else(|| ApiError::Decode("completion check response had no content".into())),
            _ => Ok(CompletionCheck {
                is_completed: false,
            }),
        }
    }

    async fn answer_check<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AnswerVerdict, ApiError> {
        let (status, envelope) = self.post_envelope::<serde_json::Value, B>(path, body).await?;
        match effective_code(status, envelope.code) {
            401 => Err(ApiError::Auth),
            409 => Err(ApiError::AlreadyAnswered),
            422 => Err(ApiError::Validation {
                errors: envelope.field_errors(),
                message: envelope.message,
            }),
            code if code >= 500 => Err(ApiError::Server {
                status: code,
                message: envelope.message,
            }),
            // Older deployments report duplicates as a plain 400 with a
            // sentence instead of a 409.
            _ if !envelope.success && is_duplicate_submission(&envelope.message) => {
                Err(ApiError::AlreadyAnswered)
            }
            // A wrong answer is a graded response, not a failure: the
            // envelope's success flag is the verdict.
            _ => Ok(AnswerVerdict {
                is_correct: envelope.success,
                message: envelope.message,
            }),
        }
    }

    async fn lesson_content(&self, path: &str) -> Result<LessonDocument, ApiError> {
        let (status, envelope) = self.get_envelope::<LessonContentDto>(path).await?;
        match effective_code(status, envelope.code) {
            401 => Err(ApiError::Auth),
            422 => Err(ApiError::Validation {
                errors: envelope.field_errors(),
                message: envelope.message,
            }),
            code if code >= 500 => Err(ApiError::Server {
                status: code,
                message: envelope.message,
            }),
            code => {
                if envelope.success {
                    let content = envelope.content.ok_or_else(|| {
                        ApiError::Decode("lesson content response had no content".into())
                    })?;
                    Ok(LessonDocument::try_from(content.lesson)?)
                } else {
                    Err(ApiError::Server {
                        status: code,
                        message: envelope.message,
                    })
                }
            }
        }
    }
}

/// Prefers the envelope's own code and falls back to the HTTP status when
/// the body omits it.
fn effective_code(status: u16, envelope_code: u16) -> u16 {
    if envelope_code == 0 {
        status
    } else {
        envelope_code
    }
}

fn is_duplicate_submission(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already answered")
}

#[derive(Debug, Serialize)]
struct ExerciseAnswerPayload {
    exercise_id: ExerciseId,
    answer: AnswerCode,
}

#[derive(Debug, Serialize)]
struct GeneralExerciseAnswerPayload {
    general_exercise_id: ExerciseId,
    answer: AnswerCode,
}

#[async_trait]
impl CompletionChecks for HttpLessonApi {
    async fn overview_completed(&self, lesson_id: LessonId) -> Result<CompletionCheck, ApiError> {
        self.completion_check(&format!("lessons/check/overview/{lesson_id}"))
            .await
    }

    async fn concept_completed(
        &self,
        lesson_id: LessonId,
        concept_id: ConceptId,
    ) -> Result<CompletionCheck, ApiError> {
        self.completion_check(&format!("lessons/check/concept/{lesson_id}/{concept_id}"))
            .await
    }

    async fn summary_completed(&self, lesson_id: LessonId) -> Result<CompletionCheck, ApiError> {
        self.completion_check(&format!("lessons/check/summary-and-application/{lesson_id}"))
            .await
    }

    async fn general_exercises_completed(
        &self,
        lesson_id: LessonId,
    ) -> Result<CompletionCheck, ApiError> {
        self.completion_check(&format!("lessons/check/general-exercises/{lesson_id}"))
            .await
    }
}

#[async_trait]
impl AnswerChecks for HttpLessonApi {
    async fn check_answer(
        &self,
        exercise_id: ExerciseId,
        answer: AnswerCode,
        scope: ExerciseScope,
    ) -> Result<AnswerVerdict, ApiError> {
        match scope {
            ExerciseScope::Concept => {
                self.answer_check(
                    "lessons/check-exercise-answer",
                    &ExerciseAnswerPayload {
                        exercise_id,
                        answer,
                    },
                )
                .await
            }
            ExerciseScope::General => {
                self.answer_check(
                    "lessons/check-general-exercise-answer",
                    &GeneralExerciseAnswerPayload {
                        general_exercise_id: exercise_id,
                        answer,
                    },
                )
                .await
            }
        }
    }
}

#[async_trait]
impl ContentSource for HttpLessonApi {
    async fn fetch_lesson(
        &self,
        subject_slug: &str,
        topic_slug: &str,
    ) -> Result<LessonDocument, ApiError> {
        self.lesson_content(&format!("lessons/{subject_slug}/{topic_slug}/content"))
            .await
    }

    async fn fetch_lesson_by_id(&self, lesson_id: LessonId) -> Result<LessonDocument, ApiError> {
        self.lesson_content(&format!("lessons/lesson/{lesson_id}/content"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining_tolerates_trailing_slash() {
        let api = HttpLessonApi::new(ApiConfig {
            base_url: "https://example.test/api/v1/".into(),
            api_token: None,
        });
        assert_eq!(
            api.url("lessons/check/overview/7"),
            "https://example.test/api/v1/lessons/check/overview/7"
        );
    }

    #[test]
    fn envelope_code_wins_over_http_status() {
        assert_eq!(effective_code(200, 422), 422);
        assert_eq!(effective_code(404, 0), 404);
    }

    #[test]
    fn duplicate_submission_signature_is_case_insensitive() {
        assert!(is_duplicate_submission(
            "You have Already Answered this exercise."
        ));
        assert!(!is_duplicate_submission("Wrong answer, try again."));
    }
}
