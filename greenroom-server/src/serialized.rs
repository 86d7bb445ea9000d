//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use chrono::{DateTime, Utc};
use serde::Serialize;

use greenroom_core::{
    Admission, AssessmentReport, AuthSession, Difficulty, IdentityKind, InterviewData,
    InterviewPage, InterviewStatus, InterviewSummary as CoreInterviewSummary, PaceSample,
    RoomCredential, TokenPair, UserData,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    name: String,
    user_type: IdentityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    participant_identity: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upgraded_at: Option<DateTime<Utc>>,
    metadata: UserMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    has_granted_interview_consent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    access_token: String,
    refresh_token: String,
    user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisAdmitted {
    interview_id: i32,
    status: InterviewStatus,
    message: &'static str,
    /// The interview's capability token, presented via x-interview-token
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    id: i32,
    user_id: i32,
    created_at: DateTime<Utc>,
    duration: f64,
    transcript: String,
    metrics: InterviewMetrics,
    case_question: String,
    difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    case_analysis: Option<AssessmentReport>,
    status: InterviewStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewMetrics {
    average_pace: f64,
    total_words: u32,
    filler_count: usize,
    pause_count: usize,
    pace_timeline: Vec<PaceSample>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSummary {
    id: i32,
    status: InterviewStatus,
    created_at: DateTime<Utc>,
    duration: f64,
    case_question: String,
    difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overall_weighted_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overall_label: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewList {
    interviews: Vec<InterviewSummary>,
    total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredential {
    token: String,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    message: &'static str,
}

impl Message {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            user_type: self.identity_kind(),
            email: self.email().map(str::to_string),
            participant_identity: self.device_alias().map(str::to_string),
            created_at: self.created_at,
            upgraded_at: self.upgraded_at(),
            metadata: UserMetadata {
                has_granted_interview_consent: self.metadata.has_granted_interview_consent,
            },
        }
    }
}

impl ToSerialized<AuthResult> for AuthSession {
    fn to_serialized(&self) -> AuthResult {
        AuthResult {
            access_token: self.tokens.access_token.clone(),
            refresh_token: self.tokens.refresh_token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Tokens> for TokenPair {
    fn to_serialized(&self) -> Tokens {
        Tokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

impl ToSerialized<AnalysisAdmitted> for Admission {
    fn to_serialized(&self) -> AnalysisAdmitted {
        AnalysisAdmitted {
            interview_id: self.interview_id,
            status: self.status,
            message: "Interview saved. Analysis in progress...",
            access_token: self.capability_token.clone(),
        }
    }
}

impl ToSerialized<Interview> for InterviewData {
    fn to_serialized(&self) -> Interview {
        Interview {
            id: self.id,
            user_id: self.owner_id,
            created_at: self.created_at,
            duration: self.recording.duration,
            transcript: self.recording.transcript.clone(),
            metrics: InterviewMetrics {
                average_pace: self.recording.average_pace,
                total_words: self.recording.total_words,
                filler_count: self.recording.fillers.len(),
                pause_count: self.recording.pauses.len(),
                pace_timeline: self.recording.pace_timeline.clone(),
            },
            case_question: self.case_question.clone(),
            difficulty: self.difficulty,
            candidate_answer: self.candidate_answer.clone(),
            case_analysis: self.report.clone(),
            status: self.status,
            processed_at: self.processed_at,
        }
    }
}

impl ToSerialized<InterviewSummary> for CoreInterviewSummary {
    fn to_serialized(&self) -> InterviewSummary {
        InterviewSummary {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
            duration: self.duration,
            case_question: self.case_question.clone(),
            difficulty: self.difficulty,
            candidate_answer: self.candidate_answer.clone(),
            overall_weighted_score: self.overall_score,
            overall_label: self.overall_label.clone(),
        }
    }
}

impl ToSerialized<InterviewList> for InterviewPage {
    fn to_serialized(&self) -> InterviewList {
        InterviewList {
            interviews: self.interviews.to_serialized(),
            total: self.total,
        }
    }
}

impl ToSerialized<SessionCredential> for RoomCredential {
    fn to_serialized(&self) -> SessionCredential {
        SessionCredential {
            token: self.token.clone(),
            url: self.url.clone(),
        }
    }
}
