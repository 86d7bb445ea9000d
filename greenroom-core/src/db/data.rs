use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A greenroom identity. One record per person, whether they signed up or not.
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub name: String,
    /// Deactivated accounts cannot log in or refresh tokens
    pub is_active: bool,
    pub metadata: UserMetadata,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub kind: UserKind,
}

/// The two identity kinds a record can be in. Upgrading converts the record
/// in place, so the id stays stable across the transition.
#[derive(Debug, Clone)]
pub enum UserKind {
    Anonymous {
        /// Device-derived alias, unique among anonymous records
        device_alias: String,
    },
    Authenticated {
        /// Unique among authenticated records
        email: String,
        password_hash: String,
        /// Set when the record started out anonymous
        upgraded_at: Option<DateTime<Utc>>,
    },
}

/// The discriminant of [UserKind], carried in token claims and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Anonymous,
    Authenticated,
}

/// Per-user consent flags, merged on update
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    pub has_granted_interview_consent: bool,
}

impl UserData {
    pub fn identity_kind(&self) -> IdentityKind {
        match self.kind {
            UserKind::Anonymous { .. } => IdentityKind::Anonymous,
            UserKind::Authenticated { .. } => IdentityKind::Authenticated,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match &self.kind {
            UserKind::Authenticated { email, .. } => Some(email),
            UserKind::Anonymous { .. } => None,
        }
    }

    pub fn device_alias(&self) -> Option<&str> {
        match &self.kind {
            UserKind::Anonymous { device_alias } => Some(device_alias),
            UserKind::Authenticated { .. } => None,
        }
    }

    pub fn password_hash(&self) -> Option<&str> {
        match &self.kind {
            UserKind::Authenticated { password_hash, .. } => Some(password_hash),
            UserKind::Anonymous { .. } => None,
        }
    }

    pub fn upgraded_at(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            UserKind::Authenticated { upgraded_at, .. } => *upgraded_at,
            UserKind::Anonymous { .. } => None,
        }
    }
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticated => "authenticated",
        }
    }
}

/// One interview-analysis unit of work
#[derive(Debug, Clone)]
pub struct InterviewData {
    pub id: PrimaryKey,
    /// The identity that submitted the interview
    pub owner_id: PrimaryKey,
    pub room_name: String,
    pub participant_alias: String,
    pub recording: SessionRecording,
    pub case_question: String,
    pub difficulty: Difficulty,
    pub candidate_answer: Option<String>,
    /// The unguessable token granting access to this interview alone
    pub capability_token: String,
    pub status: InterviewStatus,
    /// Present only once the interview reaches [InterviewStatus::Completed]
    pub report: Option<AssessmentReport>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Lifecycle of an interview. Transitions exactly once, from processing
/// to either terminal state, and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewStatus {
    Processing,
    Completed,
    Failed,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// Everything captured from the live session, submitted for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecording {
    /// Session length in seconds
    pub duration: f64,
    pub transcript: String,
    pub total_words: u32,
    /// Words per minute over the whole session
    pub average_pace: f64,
    pub pace_timeline: Vec<PaceSample>,
    pub fillers: Vec<FillerWord>,
    pub pauses: Vec<PauseSpan>,
    #[serde(default)]
    pub words: Vec<WordTiming>,
    #[serde(default)]
    pub transcript_segments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaceSample {
    pub timestamp: f64,
    pub wpm: f64,
    pub segment_start: f64,
    pub segment_end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillerWord {
    pub word: String,
    pub timestamp: f64,
    pub context_before: String,
    pub context_after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseSpan {
    pub duration: f64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

/// The assessment engine's verdict. The scoring body stays opaque to the
/// platform; the envelope carries the fields summary listings need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReport {
    /// Weighted overall score on a 1..=5 scale
    pub overall_score: f64,
    pub overall_label: String,
    /// Per-dimension scoring as produced by the engine
    pub sections: serde_json::Value,
}
