use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Error as SqlxError, PgPool, Row,
};

use crate::{
    AssessmentReport, Database, DatabaseError, Difficulty, IntoDatabaseError, InterviewData,
    InterviewStatus, NewInterview, NewUser, NewUserKind, PrimaryKey, Result, SessionRecording,
    UserData, UserKind, UserMetadata, UserPromotion,
};

/// A postgres database implementation for greenroom
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    fn user_from_row(row: &PgRow) -> Result<UserData> {
        let kind: String = row.try_get("kind").map_err(|e| e.any())?;

        let kind = match kind.as_str() {
            "anonymous" => UserKind::Anonymous {
                device_alias: row.try_get("device_alias").map_err(|e| e.any())?,
            },
            "authenticated" => UserKind::Authenticated {
                email: row.try_get("email").map_err(|e| e.any())?,
                password_hash: row.try_get("password").map_err(|e| e.any())?,
                upgraded_at: row.try_get("upgraded_at").map_err(|e| e.any())?,
            },
            other => {
                return Err(DatabaseError::Internal(
                    format!("unknown user kind {other}").into(),
                ))
            }
        };

        Ok(UserData {
            id: row.try_get("id").map_err(|e| e.any())?,
            name: row.try_get("name").map_err(|e| e.any())?,
            is_active: row.try_get("is_active").map_err(|e| e.any())?,
            metadata: UserMetadata {
                has_granted_interview_consent: row
                    .try_get("has_granted_interview_consent")
                    .map_err(|e| e.any())?,
            },
            created_at: row.try_get("created_at").map_err(|e| e.any())?,
            last_login_at: row.try_get("last_login_at").map_err(|e| e.any())?,
            kind,
        })
    }

    fn interview_from_row(row: &PgRow) -> Result<InterviewData> {
        let status: String = row.try_get("status").map_err(|e| e.any())?;
        let difficulty: String = row.try_get("difficulty").map_err(|e| e.any())?;

        let recording: Json<SessionRecording> = row.try_get("recording").map_err(|e| e.any())?;
        let report: Option<Json<AssessmentReport>> =
            row.try_get("report").map_err(|e| e.any())?;

        Ok(InterviewData {
            id: row.try_get("id").map_err(|e| e.any())?,
            owner_id: row.try_get("owner_id").map_err(|e| e.any())?,
            room_name: row.try_get("room_name").map_err(|e| e.any())?,
            participant_alias: row.try_get("participant_alias").map_err(|e| e.any())?,
            recording: recording.0,
            case_question: row.try_get("case_question").map_err(|e| e.any())?,
            difficulty: parse_difficulty(&difficulty)?,
            candidate_answer: row.try_get("candidate_answer").map_err(|e| e.any())?,
            capability_token: row.try_get("capability_token").map_err(|e| e.any())?,
            status: parse_status(&status)?,
            report: report.map(|r| r.0),
            created_at: row.try_get("created_at").map_err(|e| e.any())?,
            processed_at: row.try_get("processed_at").map_err(|e| e.any())?,
        })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?;

        Self::user_from_row(&row)
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1 AND kind = 'authenticated'")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))?;

        Self::user_from_row(&row)
    }

    async fn user_by_device_alias(&self, alias: &str) -> Result<UserData> {
        let row = sqlx::query("SELECT * FROM users WHERE device_alias = $1 AND kind = 'anonymous'")
            .bind(alias)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "device_alias"))?;

        Self::user_from_row(&row)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let row = match new_user.kind {
            NewUserKind::Anonymous { device_alias } => {
                sqlx::query(
                    "INSERT INTO users (kind, name, device_alias, has_granted_interview_consent, last_login_at)
                     VALUES ('anonymous', $1, $2, $3, now())
                     RETURNING *",
                )
                .bind(&new_user.name)
                .bind(&device_alias)
                .bind(new_user.metadata.has_granted_interview_consent)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.conflict_or_any("user", "device_alias", &device_alias))?
            }
            NewUserKind::Authenticated {
                email,
                password_hash,
            } => {
                sqlx::query(
                    "INSERT INTO users (kind, name, email, password, has_granted_interview_consent, last_login_at)
                     VALUES ('authenticated', $1, $2, $3, $4, now())
                     RETURNING *",
                )
                .bind(&new_user.name)
                .bind(&email)
                .bind(&password_hash)
                .bind(new_user.metadata.has_granted_interview_consent)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.conflict_or_any("user", "email", &email))?
            }
        };

        Self::user_from_row(&row)
    }

    async fn promote_user(&self, promotion: UserPromotion) -> Result<UserData> {
        let row = sqlx::query(
            "UPDATE users SET
                kind = 'authenticated',
                email = $1,
                name = $2,
                password = $3,
                device_alias = NULL,
                upgraded_at = $4,
                last_login_at = $4
            WHERE id = $5 AND kind = 'anonymous'
            RETURNING *",
        )
        .bind(&promotion.email)
        .bind(&promotion.name)
        .bind(&promotion.password_hash)
        .bind(promotion.upgraded_at)
        .bind(promotion.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.conflict_or_any("user", "email", &promotion.email))?;

        match row {
            Some(row) => Self::user_from_row(&row),
            None => Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            }),
        }
    }

    async fn record_login(&self, user_id: PrimaryKey) -> Result<()> {
        let result = sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        Ok(())
    }

    async fn update_metadata(
        &self,
        user_id: PrimaryKey,
        metadata: UserMetadata,
    ) -> Result<UserData> {
        let row = sqlx::query(
            "UPDATE users SET has_granted_interview_consent = $1 WHERE id = $2 RETURNING *",
        )
        .bind(metadata.has_granted_interview_consent)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("user", "id"))?;

        Self::user_from_row(&row)
    }

    async fn interview_by_id(&self, interview_id: PrimaryKey) -> Result<InterviewData> {
        let row = sqlx::query("SELECT * FROM interviews WHERE id = $1")
            .bind(interview_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("interview", "id"))?;

        Self::interview_from_row(&row)
    }

    async fn interview_by_capability_token(&self, token: &str) -> Result<InterviewData> {
        let row = sqlx::query("SELECT * FROM interviews WHERE capability_token = $1")
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("interview", "capability_token"))?;

        Self::interview_from_row(&row)
    }

    async fn create_interview(&self, new_interview: NewInterview) -> Result<InterviewData> {
        let row = sqlx::query(
            "INSERT INTO interviews
                (owner_id, room_name, participant_alias, recording, case_question,
                 difficulty, candidate_answer, capability_token, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'processing')
             RETURNING *",
        )
        .bind(new_interview.owner_id)
        .bind(&new_interview.room_name)
        .bind(&new_interview.participant_alias)
        .bind(Json(&new_interview.recording))
        .bind(&new_interview.case_question)
        .bind(new_interview.difficulty.as_str())
        .bind(&new_interview.candidate_answer)
        .bind(&new_interview.capability_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            e.conflict_or_any(
                "interview",
                "capability_token",
                &new_interview.capability_token,
            )
        })?;

        Self::interview_from_row(&row)
    }

    async fn complete_interview(
        &self,
        interview_id: PrimaryKey,
        report: AssessmentReport,
    ) -> Result<InterviewData> {
        let row = sqlx::query(
            "UPDATE interviews SET status = 'completed', report = $1, processed_at = $2
             WHERE id = $3 AND status = 'processing'
             RETURNING *",
        )
        .bind(Json(&report))
        .bind(Utc::now())
        .bind(interview_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        match row {
            Some(row) => Self::interview_from_row(&row),
            // Either the interview doesn't exist, or it already settled
            None => {
                let existing = self.interview_by_id(interview_id).await?;

                Err(DatabaseError::Conflict {
                    resource: "interview",
                    field: "status",
                    value: existing.status.as_str().to_string(),
                })
            }
        }
    }

    async fn fail_interview(&self, interview_id: PrimaryKey) -> Result<InterviewData> {
        let row = sqlx::query(
            "UPDATE interviews SET status = 'failed', processed_at = $1
             WHERE id = $2 AND status = 'processing'
             RETURNING *",
        )
        .bind(Utc::now())
        .bind(interview_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?;

        match row {
            Some(row) => Self::interview_from_row(&row),
            None => {
                let existing = self.interview_by_id(interview_id).await?;

                Err(DatabaseError::Conflict {
                    resource: "interview",
                    field: "status",
                    value: existing.status.as_str().to_string(),
                })
            }
        }
    }

    async fn interviews_by_owner(
        &self,
        owner_id: PrimaryKey,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InterviewData>> {
        let rows = sqlx::query(
            "SELECT * FROM interviews WHERE owner_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.iter().map(Self::interview_from_row).collect()
    }

    async fn count_interviews_by_owner(&self, owner_id: PrimaryKey) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM interviews WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        row.try_get("total").map_err(|e| e.any())
    }
}

fn parse_status(value: &str) -> Result<InterviewStatus> {
    match value {
        "processing" => Ok(InterviewStatus::Processing),
        "completed" => Ok(InterviewStatus::Completed),
        "failed" => Ok(InterviewStatus::Failed),
        other => Err(DatabaseError::Internal(
            format!("unknown interview status {other}").into(),
        )),
    }
}

fn parse_difficulty(value: &str) -> Result<Difficulty> {
    match value {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => Err(DatabaseError::Internal(
            format!("unknown difficulty {other}").into(),
        )),
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}

/// Maps unique index violations to conflicts, so concurrent inserts of the
/// same email or alias settle with exactly one winner
trait ConflictExt {
    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError;
}

impl ConflictExt for SqlxError {
    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError {
        let is_unique_violation = self
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);

        if is_unique_violation {
            DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }
        } else {
            self.any()
        }
    }
}
