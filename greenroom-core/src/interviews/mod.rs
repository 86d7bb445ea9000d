use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    is_valid_capability_token, random_capability_token, AssessmentEngine, AssessmentRequest,
    Database, DatabaseError, Difficulty, InterviewData, InterviewStatus, LiveSessionGateway,
    NewInterview, NewUser, NewUserKind, PrimaryKey, RoomTimers, SessionRecording, UserMetadata,
};

/// Workers draining the analysis queue concurrently
const WORKER_COUNT: usize = 4;
/// Pending analyses the queue holds before admission applies back-pressure
const QUEUE_CAPACITY: usize = 64;

/// The interview job orchestrator. Admits jobs, runs the assessment off the
/// request path on a bounded worker pool, and records the terminal state.
pub struct Interviews<Db> {
    db: Arc<Db>,
    sender: Mutex<Option<mpsc::Sender<AnalysisJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Error)]
pub enum InterviewError {
    /// Unknown id, unknown token, and malformed token all surface the same
    /// way, so a caller can't probe which interviews exist
    #[error("Interview not found")]
    NotFound,
    /// The analysis queue has been closed for shutdown
    #[error("Analysis queue is closed")]
    QueueClosed,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

struct AnalysisJob {
    interview: InterviewData,
}

/// A request to analyze a finished live session
#[derive(Debug)]
pub struct NewSubmission {
    pub room_name: String,
    pub participant_identity: String,
    pub recording: SessionRecording,
    pub case_question: String,
    pub difficulty: Difficulty,
    pub candidate_answer: Option<String>,
}

/// What admission hands back, before any analysis has run
#[derive(Debug)]
pub struct Admission {
    pub interview_id: PrimaryKey,
    pub capability_token: String,
    pub status: InterviewStatus,
}

/// A trimmed interview row for listings
#[derive(Debug, Clone)]
pub struct InterviewSummary {
    pub id: PrimaryKey,
    pub status: InterviewStatus,
    pub created_at: DateTime<Utc>,
    pub duration: f64,
    pub case_question: String,
    pub difficulty: Difficulty,
    pub candidate_answer: Option<String>,
    pub overall_score: Option<f64>,
    pub overall_label: Option<String>,
}

#[derive(Debug)]
pub struct InterviewPage {
    pub interviews: Vec<InterviewSummary>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

impl<Db> Interviews<Db>
where
    Db: Database,
{
    /// Creates the orchestrator and spawns its worker pool. Must be called
    /// from within a tokio runtime.
    pub fn new<E, G>(db: &Arc<Db>, engine: &Arc<E>, timers: &RoomTimers<G>) -> Self
    where
        E: AssessmentEngine,
        G: LiveSessionGateway,
    {
        let (sender, receiver) = mpsc::channel::<AnalysisJob>(QUEUE_CAPACITY);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..WORKER_COUNT)
            .map(|_| {
                let db = db.clone();
                let engine = engine.clone();
                let timers = timers.clone();
                let receiver = receiver.clone();

                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };

                        match job {
                            Some(job) => {
                                run_analysis(&*db, &*engine, &timers, job.interview).await
                            }
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Self {
            db: db.clone(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Admits an interview for analysis. The row is persisted as processing
    /// and the assessment runs detached; the caller gets the id and
    /// capability token back without waiting on analysis latency.
    pub async fn submit(&self, submission: NewSubmission) -> Result<Admission, InterviewError> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(InterviewError::QueueClosed)?;

        let owner = self.resolve_owner(&submission.participant_identity).await?;
        let capability_token = random_capability_token();

        let interview = self
            .db
            .create_interview(NewInterview {
                owner_id: owner.id,
                room_name: submission.room_name,
                participant_alias: submission.participant_identity,
                recording: submission.recording,
                case_question: submission.case_question,
                difficulty: submission.difficulty,
                candidate_answer: submission.candidate_answer,
                capability_token: capability_token.clone(),
            })
            .await
            .map_err(InterviewError::Db)?;

        info!(
            "Interview {} admitted for room {}",
            interview.id, interview.room_name
        );

        let admission = Admission {
            interview_id: interview.id,
            capability_token,
            status: interview.status,
        };

        sender
            .send(AnalysisJob { interview })
            .await
            .map_err(|_| InterviewError::QueueClosed)?;

        Ok(admission)
    }

    /// Fetches an interview by its capability token. The token shape is
    /// checked before any store access; malformed and unknown tokens are
    /// indistinguishable to the caller.
    pub async fn interview_by_token(&self, token: &str) -> Result<InterviewData, InterviewError> {
        if !is_valid_capability_token(token) {
            return Err(InterviewError::NotFound);
        }

        self.db
            .interview_by_capability_token(token)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => InterviewError::NotFound,
                err => InterviewError::Db(err),
            })
    }

    /// Fetches an interview for its owner. Someone else's interview resolves
    /// to not-found rather than forbidden, so existence is never leaked.
    pub async fn interview_for_owner(
        &self,
        owner_id: PrimaryKey,
        interview_id: PrimaryKey,
    ) -> Result<InterviewData, InterviewError> {
        let interview = self
            .db
            .interview_by_id(interview_id)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => InterviewError::NotFound,
                err => InterviewError::Db(err),
            })?;

        if interview.owner_id != owner_id {
            return Err(InterviewError::NotFound);
        }

        Ok(interview)
    }

    /// Lists an owner's interviews as summaries, newest first
    pub async fn summaries_for_owner(
        &self,
        owner_id: PrimaryKey,
        pagination: Pagination,
    ) -> Result<InterviewPage, InterviewError> {
        let interviews = self
            .db
            .interviews_by_owner(owner_id, pagination.limit, pagination.offset)
            .await
            .map_err(InterviewError::Db)?;

        let total = self
            .db
            .count_interviews_by_owner(owner_id)
            .await
            .map_err(InterviewError::Db)?;

        let summaries = interviews.into_iter().map(summarize).collect();

        Ok(InterviewPage {
            interviews: summaries,
            total,
        })
    }

    /// Closes the queue and waits for in-flight analyses to settle
    pub async fn shutdown(&self) {
        self.sender.lock().take();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();

        for worker in workers {
            let _ = worker.await;
        }
    }

    async fn resolve_owner(&self, alias: &str) -> Result<crate::UserData, InterviewError> {
        match self.db.user_by_device_alias(alias).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_not_found() => self
                .db
                .create_user(NewUser {
                    name: alias.to_string(),
                    metadata: UserMetadata::default(),
                    kind: NewUserKind::Anonymous {
                        device_alias: alias.to_string(),
                    },
                })
                .await
                .map_err(InterviewError::Db),
            Err(e) => Err(InterviewError::Db(e)),
        }
    }
}

/// One detached analysis. The terminal-state write always happens before the
/// timer cancel, so an observer can't see the room reclaimed as "still
/// processing" ordering-wise. Failures are recorded, never retried.
async fn run_analysis<Db, E, G>(
    db: &Db,
    engine: &E,
    timers: &RoomTimers<G>,
    interview: InterviewData,
) where
    Db: Database,
    E: AssessmentEngine,
    G: LiveSessionGateway,
{
    let outcome = engine
        .analyze(AssessmentRequest {
            recording: &interview.recording,
            case_question: &interview.case_question,
            difficulty: interview.difficulty,
            candidate_answer: interview.candidate_answer.as_deref(),
        })
        .await;

    match outcome {
        Ok(report) => {
            info!(
                "Analysis completed for interview {}. Score: {}/5 ({})",
                interview.id, report.overall_score, report.overall_label
            );

            if let Err(error) = db.complete_interview(interview.id, report).await {
                error!(
                    "Could not record completion of interview {}: {error}",
                    interview.id
                );
            }
        }
        Err(error) => {
            error!("Analysis failed for interview {}: {error}", interview.id);

            if let Err(error) = db.fail_interview(interview.id).await {
                error!(
                    "Could not record failure of interview {}: {error}",
                    interview.id
                );
            }
        }
    }

    timers.cancel(&interview.room_name);
}

fn summarize(interview: InterviewData) -> InterviewSummary {
    InterviewSummary {
        id: interview.id,
        status: interview.status,
        created_at: interview.created_at,
        duration: interview.recording.duration,
        case_question: interview.case_question,
        difficulty: interview.difficulty,
        candidate_answer: interview.candidate_answer,
        overall_score: interview.report.as_ref().map(|r| r.overall_score),
        overall_label: interview.report.map(|r| r.overall_label),
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::task::yield_now;

    use super::*;
    use crate::{
        AssessmentError, AssessmentReport, Auth, AuthConfig, GatewayError, LiveSessionGateway,
        MemoryDatabase, NewAccount, RoomCredential,
    };

    struct CompletingEngine;

    #[async_trait]
    impl AssessmentEngine for CompletingEngine {
        async fn analyze(
            &self,
            _request: AssessmentRequest<'_>,
        ) -> Result<AssessmentReport, AssessmentError> {
            Ok(AssessmentReport {
                overall_score: 4.2,
                overall_label: "Very Good".to_string(),
                sections: json!({ "communication": { "score": 4 } }),
            })
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl AssessmentEngine for FailingEngine {
        async fn analyze(
            &self,
            _request: AssessmentRequest<'_>,
        ) -> Result<AssessmentReport, AssessmentError> {
            Err(AssessmentError::Rejected(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }

    /// Never resolves, keeping submitted jobs in processing
    struct PendingEngine;

    #[async_trait]
    impl AssessmentEngine for PendingEngine {
        async fn analyze(
            &self,
            _request: AssessmentRequest<'_>,
        ) -> Result<AssessmentReport, AssessmentError> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        deleted: AtomicUsize,
    }

    #[async_trait]
    impl LiveSessionGateway for RecordingGateway {
        async fn issue_credential(
            &self,
            _room_name: &str,
            _identity: &str,
        ) -> Result<RoomCredential, GatewayError> {
            Ok(RoomCredential {
                token: "token".to_string(),
                url: "wss://media.test".to_string(),
            })
        }

        async fn delete_room(&self, _room_name: &str) -> Result<(), GatewayError> {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        db: Arc<MemoryDatabase>,
        gateway: Arc<RecordingGateway>,
        timers: RoomTimers<RecordingGateway>,
        interviews: Interviews<MemoryDatabase>,
    }

    fn harness<E: AssessmentEngine>(engine: E) -> Harness {
        let db = Arc::new(MemoryDatabase::new());
        let gateway = Arc::new(RecordingGateway::default());
        let engine = Arc::new(engine);
        let timers = RoomTimers::new(&gateway, Duration::from_secs(300));
        let interviews = Interviews::new(&db, &engine, &timers);

        Harness {
            db,
            gateway,
            timers,
            interviews,
        }
    }

    fn submission(room: &str, alias: &str) -> NewSubmission {
        NewSubmission {
            room_name: room.to_string(),
            participant_identity: alias.to_string(),
            recording: SessionRecording {
                duration: 300.0,
                transcript: "The market is roughly ten million units.".to_string(),
                total_words: 7,
                average_pace: 140.0,
                pace_timeline: vec![],
                fillers: vec![],
                pauses: vec![],
                words: vec![],
                transcript_segments: vec![],
            },
            case_question: "Estimate the coffee market in Berlin".to_string(),
            difficulty: Difficulty::Medium,
            candidate_answer: Some("Around 400 million euros".to_string()),
        }
    }

    async fn wait_for_terminal(db: &MemoryDatabase, interview_id: PrimaryKey) -> InterviewData {
        for _ in 0..1000 {
            yield_now().await;

            let interview = db.interview_by_id(interview_id).await.unwrap();
            if interview.status.is_terminal() {
                return interview;
            }
        }

        panic!("interview {interview_id} never settled");
    }

    #[tokio::test]
    async fn admission_returns_before_analysis_settles() {
        let harness = harness(PendingEngine);

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        assert_eq!(admission.status, InterviewStatus::Processing);
        assert!(is_valid_capability_token(&admission.capability_token));

        let stored = harness
            .db
            .interview_by_id(admission.interview_id)
            .await
            .unwrap();
        assert_eq!(stored.status, InterviewStatus::Processing);
        assert!(stored.report.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_records_report_and_cancels_the_room_timer() {
        let harness = harness(CompletingEngine);

        harness.timers.start("room-1", None);

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        let settled = wait_for_terminal(&harness.db, admission.interview_id).await;
        assert_eq!(settled.status, InterviewStatus::Completed);
        assert!(settled.processed_at.is_some());

        let report = settled.report.expect("completed interview has a report");
        assert_eq!(report.overall_label, "Very Good");

        // The room timer was cancelled, so the deadline passes quietly
        assert!(!harness.timers.is_scheduled("room-1"));
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(harness.gateway.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_records_no_partial_result_and_cancels_the_timer() {
        let harness = harness(FailingEngine);

        harness.timers.start("room-1", None);

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        let settled = wait_for_terminal(&harness.db, admission.interview_id).await;
        assert_eq!(settled.status, InterviewStatus::Failed);
        assert!(settled.report.is_none());

        assert!(!harness.timers.is_scheduled("room-1"));
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(harness.gateway.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submissions_reuse_the_aliased_identity() {
        let harness = harness(CompletingEngine);

        let first = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();
        let second = harness
            .interviews
            .submit(submission("room-2", "dev-123"))
            .await
            .unwrap();

        let a = harness.db.interview_by_id(first.interview_id).await.unwrap();
        let b = harness
            .db
            .interview_by_id(second.interview_id)
            .await
            .unwrap();

        assert_eq!(a.owner_id, b.owner_id);
    }

    #[tokio::test]
    async fn malformed_tokens_are_rejected_before_lookup() {
        let harness = harness(PendingEngine);

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        let truncated = &admission.capability_token[..63];
        let non_hex = "z".repeat(64);
        let uppercase = admission.capability_token.to_uppercase();

        // Wrong length, non-hex, and uppercase variants all fail the shape check
        for token in ["", "abc123", truncated, non_hex.as_str(), uppercase.as_str()] {
            let result = harness.interviews.interview_by_token(token).await;
            assert!(matches!(result, Err(InterviewError::NotFound)));
        }

        // A well-formed but unknown token is indistinguishable from malformed
        let result = harness.interviews.interview_by_token(&"0".repeat(64)).await;
        assert!(matches!(result, Err(InterviewError::NotFound)));

        // The real token still resolves
        let interview = harness
            .interviews
            .interview_by_token(&admission.capability_token)
            .await
            .unwrap();
        assert_eq!(interview.id, admission.interview_id);
    }

    #[tokio::test]
    async fn owner_scoped_retrieval_never_leaks() {
        let harness = harness(PendingEngine);

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        let interview = harness
            .db
            .interview_by_id(admission.interview_id)
            .await
            .unwrap();

        let found = harness
            .interviews
            .interview_for_owner(interview.owner_id, interview.id)
            .await
            .unwrap();
        assert_eq!(found.id, interview.id);

        // Another identity sees not-found, not forbidden
        let result = harness
            .interviews
            .interview_for_owner(interview.owner_id + 1, interview.id)
            .await;
        assert!(matches!(result, Err(InterviewError::NotFound)));
    }

    #[tokio::test]
    async fn summaries_are_paginated_newest_first() {
        let harness = harness(CompletingEngine);

        let mut owner_id = None;
        for i in 0..3 {
            let admission = harness
                .interviews
                .submit(submission(&format!("room-{i}"), "dev-123"))
                .await
                .unwrap();

            let settled = wait_for_terminal(&harness.db, admission.interview_id).await;
            owner_id = Some(settled.owner_id);
        }

        let page = harness
            .interviews
            .summaries_for_owner(owner_id.unwrap(), Pagination { limit: 2, offset: 0 })
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.interviews.len(), 2);
        assert!(page.interviews[0].id > page.interviews[1].id);

        // Completed summaries expose the report envelope
        let summary = &page.interviews[0];
        assert_eq!(summary.status, InterviewStatus::Completed);
        assert_eq!(summary.overall_score, Some(4.2));
        assert_eq!(summary.overall_label.as_deref(), Some("Very Good"));
    }

    #[tokio::test]
    async fn upgrade_preserves_interview_ownership() {
        let harness = harness(PendingEngine);
        let auth = Auth::new(
            &harness.db,
            AuthConfig::new("access-secret-for-tests", "refresh-secret-for-tests"),
        );

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        let upgraded = auth
            .upgrade(
                "dev-123",
                NewAccount {
                    email: "a@b.com".to_string(),
                    name: "Ann".to_string(),
                    password: "Passw0rd1".to_string(),
                },
            )
            .await
            .unwrap();

        let page = harness
            .interviews
            .summaries_for_owner(upgraded.user.id, Pagination::default())
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.interviews[0].id, admission.interview_id);
        assert_eq!(page.interviews[0].status, InterviewStatus::Processing);
    }

    #[tokio::test]
    async fn shutdown_drains_inflight_analyses() {
        let harness = harness(CompletingEngine);

        let admission = harness
            .interviews
            .submit(submission("room-1", "dev-123"))
            .await
            .unwrap();

        harness.interviews.shutdown().await;

        let settled = harness
            .db
            .interview_by_id(admission.interview_id)
            .await
            .unwrap();
        assert_eq!(settled.status, InterviewStatus::Completed);

        // The closed queue refuses further admissions
        let result = harness.interviews.submit(submission("room-2", "dev-123")).await;
        assert!(matches!(result, Err(InterviewError::QueueClosed)));
    }
}
