use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Represents a type that can fetch and store greenroom data durably
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    /// Looks up an authenticated record by email. Anonymous records never match.
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    /// Looks up an anonymous record by device alias. Authenticated records never match.
    async fn user_by_device_alias(&self, alias: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    /// Converts an anonymous record to authenticated in place. The id is
    /// unchanged, so rows referencing it stay valid.
    async fn promote_user(&self, promotion: UserPromotion) -> Result<UserData>;
    async fn record_login(&self, user_id: PrimaryKey) -> Result<()>;
    async fn update_metadata(&self, user_id: PrimaryKey, metadata: UserMetadata)
        -> Result<UserData>;

    async fn interview_by_id(&self, interview_id: PrimaryKey) -> Result<InterviewData>;
    async fn interview_by_capability_token(&self, token: &str) -> Result<InterviewData>;
    async fn create_interview(&self, new_interview: NewInterview) -> Result<InterviewData>;
    /// Marks an interview completed with its report. Fails with a conflict if
    /// the interview already reached a terminal state.
    async fn complete_interview(
        &self,
        interview_id: PrimaryKey,
        report: AssessmentReport,
    ) -> Result<InterviewData>;
    /// Marks an interview failed, recording no partial result. Fails with a
    /// conflict if the interview already reached a terminal state.
    async fn fail_interview(&self, interview_id: PrimaryKey) -> Result<InterviewData>;
    /// Lists interviews owned by a user, newest first
    async fn interviews_by_owner(
        &self,
        owner_id: PrimaryKey,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InterviewData>>;
    async fn count_interviews_by_owner(&self, owner_id: PrimaryKey) -> Result<i64>;
}

#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub metadata: UserMetadata,
    pub kind: NewUserKind,
}

#[derive(Debug)]
pub enum NewUserKind {
    Anonymous { device_alias: String },
    Authenticated { email: String, password_hash: String },
}

/// The in-place conversion of an anonymous record to an authenticated one
#[derive(Debug)]
pub struct UserPromotion {
    pub id: PrimaryKey,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub upgraded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewInterview {
    pub owner_id: PrimaryKey,
    pub room_name: String,
    pub participant_alias: String,
    pub recording: SessionRecording,
    pub case_question: String,
    pub difficulty: Difficulty,
    pub candidate_answer: Option<String>,
    pub capability_token: String,
}
