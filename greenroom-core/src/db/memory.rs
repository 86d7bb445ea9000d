use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{
    AssessmentReport, Database, DatabaseError, InterviewData, InterviewStatus, NewInterview,
    NewUser, NewUserKind, PrimaryKey, Result, UserData, UserKind, UserMetadata, UserPromotion,
};

/// An in-memory database implementation, used by tests and local development
#[derive(Default)]
pub struct MemoryDatabase {
    users: RwLock<HashMap<PrimaryKey, UserData>>,
    interviews: RwLock<HashMap<PrimaryKey, InterviewData>>,
    next_user_id: AtomicI32,
    next_interview_id: AtomicI32,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the active flag of a user (for testing purposes)
    pub fn set_active(&self, user_id: PrimaryKey, is_active: bool) -> Result<()> {
        let mut users = self.users.write();

        let user = users.get_mut(&user_id).ok_or(DatabaseError::NotFound {
            resource: "user",
            identifier: "id",
        })?;

        user.is_active = is_active;
        Ok(())
    }

    fn next_user_id(&self) -> PrimaryKey {
        self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_interview_id(&self) -> PrimaryKey {
        self.next_interview_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .read()
            .get(&user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.users
            .read()
            .values()
            .find(|u| u.email() == Some(email))
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "email",
            })
    }

    async fn user_by_device_alias(&self, alias: &str) -> Result<UserData> {
        self.users
            .read()
            .values()
            .find(|u| u.device_alias() == Some(alias))
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "device_alias",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut users = self.users.write();

        let kind = match new_user.kind {
            NewUserKind::Anonymous { device_alias } => {
                if users.values().any(|u| u.device_alias() == Some(device_alias.as_str())) {
                    return Err(DatabaseError::Conflict {
                        resource: "user",
                        field: "device_alias",
                        value: device_alias,
                    });
                }

                UserKind::Anonymous { device_alias }
            }
            NewUserKind::Authenticated {
                email,
                password_hash,
            } => {
                if users.values().any(|u| u.email() == Some(email.as_str())) {
                    return Err(DatabaseError::Conflict {
                        resource: "user",
                        field: "email",
                        value: email,
                    });
                }

                UserKind::Authenticated {
                    email,
                    password_hash,
                    upgraded_at: None,
                }
            }
        };

        let now = Utc::now();
        let user = UserData {
            id: self.next_user_id(),
            name: new_user.name,
            is_active: true,
            metadata: new_user.metadata,
            created_at: now,
            last_login_at: Some(now),
            kind,
        };

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn promote_user(&self, promotion: UserPromotion) -> Result<UserData> {
        let mut users = self.users.write();

        if users.values().any(|u| u.email() == Some(promotion.email.as_str())) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "email",
                value: promotion.email,
            });
        }

        let user = users.get_mut(&promotion.id).ok_or(DatabaseError::NotFound {
            resource: "user",
            identifier: "id",
        })?;

        if !matches!(user.kind, UserKind::Anonymous { .. }) {
            return Err(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            });
        }

        user.name = promotion.name;
        user.last_login_at = Some(promotion.upgraded_at);
        user.kind = UserKind::Authenticated {
            email: promotion.email,
            password_hash: promotion.password_hash,
            upgraded_at: Some(promotion.upgraded_at),
        };

        Ok(user.clone())
    }

    async fn record_login(&self, user_id: PrimaryKey) -> Result<()> {
        let mut users = self.users.write();

        let user = users.get_mut(&user_id).ok_or(DatabaseError::NotFound {
            resource: "user",
            identifier: "id",
        })?;

        user.last_login_at = Some(Utc::now());
        Ok(())
    }

    async fn update_metadata(
        &self,
        user_id: PrimaryKey,
        metadata: UserMetadata,
    ) -> Result<UserData> {
        let mut users = self.users.write();

        let user = users.get_mut(&user_id).ok_or(DatabaseError::NotFound {
            resource: "user",
            identifier: "id",
        })?;

        user.metadata = metadata;
        Ok(user.clone())
    }

    async fn interview_by_id(&self, interview_id: PrimaryKey) -> Result<InterviewData> {
        self.interviews
            .read()
            .get(&interview_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "interview",
                identifier: "id",
            })
    }

    async fn interview_by_capability_token(&self, token: &str) -> Result<InterviewData> {
        self.interviews
            .read()
            .values()
            .find(|i| i.capability_token == token)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "interview",
                identifier: "capability_token",
            })
    }

    async fn create_interview(&self, new_interview: NewInterview) -> Result<InterviewData> {
        let mut interviews = self.interviews.write();

        let interview = InterviewData {
            id: self.next_interview_id(),
            owner_id: new_interview.owner_id,
            room_name: new_interview.room_name,
            participant_alias: new_interview.participant_alias,
            recording: new_interview.recording,
            case_question: new_interview.case_question,
            difficulty: new_interview.difficulty,
            candidate_answer: new_interview.candidate_answer,
            capability_token: new_interview.capability_token,
            status: InterviewStatus::Processing,
            report: None,
            created_at: Utc::now(),
            processed_at: None,
        };

        interviews.insert(interview.id, interview.clone());
        Ok(interview)
    }

    async fn complete_interview(
        &self,
        interview_id: PrimaryKey,
        report: AssessmentReport,
    ) -> Result<InterviewData> {
        let mut interviews = self.interviews.write();

        let interview = interviews
            .get_mut(&interview_id)
            .ok_or(DatabaseError::NotFound {
                resource: "interview",
                identifier: "id",
            })?;

        if interview.status.is_terminal() {
            return Err(DatabaseError::Conflict {
                resource: "interview",
                field: "status",
                value: interview.status.as_str().to_string(),
            });
        }

        interview.status = InterviewStatus::Completed;
        interview.report = Some(report);
        interview.processed_at = Some(Utc::now());

        Ok(interview.clone())
    }

    async fn fail_interview(&self, interview_id: PrimaryKey) -> Result<InterviewData> {
        let mut interviews = self.interviews.write();

        let interview = interviews
            .get_mut(&interview_id)
            .ok_or(DatabaseError::NotFound {
                resource: "interview",
                identifier: "id",
            })?;

        if interview.status.is_terminal() {
            return Err(DatabaseError::Conflict {
                resource: "interview",
                field: "status",
                value: interview.status.as_str().to_string(),
            });
        }

        interview.status = InterviewStatus::Failed;
        interview.processed_at = Some(Utc::now());

        Ok(interview.clone())
    }

    async fn interviews_by_owner(
        &self,
        owner_id: PrimaryKey,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InterviewData>> {
        let mut owned: Vec<_> = self
            .interviews
            .read()
            .values()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();

        // Newest first, ids break ties within the same instant
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_interviews_by_owner(&self, owner_id: PrimaryKey) -> Result<i64> {
        Ok(self
            .interviews
            .read()
            .values()
            .filter(|i| i.owner_id == owner_id)
            .count() as i64)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::Difficulty;

    fn recording() -> crate::SessionRecording {
        crate::SessionRecording {
            duration: 300.0,
            transcript: "The market is roughly ten million units.".to_string(),
            total_words: 7,
            average_pace: 140.0,
            pace_timeline: vec![],
            fillers: vec![],
            pauses: vec![],
            words: vec![],
            transcript_segments: vec![],
        }
    }

    fn new_interview(owner_id: PrimaryKey, token: &str) -> NewInterview {
        NewInterview {
            owner_id,
            room_name: "room-1".to_string(),
            participant_alias: "dev-123".to_string(),
            recording: recording(),
            case_question: "Estimate the coffee market in Berlin".to_string(),
            difficulty: Difficulty::Medium,
            candidate_answer: None,
            capability_token: token.to_string(),
        }
    }

    fn report() -> AssessmentReport {
        AssessmentReport {
            overall_score: 4.2,
            overall_label: "Very Good".to_string(),
            sections: json!({}),
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = MemoryDatabase::new();

        let new_user = |email: &str| NewUser {
            name: "Ann".to_string(),
            metadata: UserMetadata::default(),
            kind: NewUserKind::Authenticated {
                email: email.to_string(),
                password_hash: "hash".to_string(),
            },
        };

        db.create_user(new_user("a@b.com")).await.unwrap();

        let result = db.create_user(new_user("a@b.com")).await;
        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));
    }

    #[tokio::test]
    async fn promotion_keeps_the_id() {
        let db = MemoryDatabase::new();

        let anonymous = db
            .create_user(NewUser {
                name: "Guest-dev-123".to_string(),
                metadata: UserMetadata::default(),
                kind: NewUserKind::Anonymous {
                    device_alias: "dev-123".to_string(),
                },
            })
            .await
            .unwrap();

        let promoted = db
            .promote_user(UserPromotion {
                id: anonymous.id,
                email: "a@b.com".to_string(),
                name: "Ann".to_string(),
                password_hash: "hash".to_string(),
                upgraded_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(promoted.id, anonymous.id);
        assert_eq!(promoted.email(), Some("a@b.com"));
        assert!(promoted.upgraded_at().is_some());

        // The alias is released along with the anonymous kind
        let result = db.user_by_device_alias("dev-123").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn terminal_status_never_reverts() {
        let db = MemoryDatabase::new();

        let user = db
            .create_user(NewUser {
                name: "Guest-dev-123".to_string(),
                metadata: UserMetadata::default(),
                kind: NewUserKind::Anonymous {
                    device_alias: "dev-123".to_string(),
                },
            })
            .await
            .unwrap();

        let interview = db
            .create_interview(new_interview(user.id, &"a".repeat(64)))
            .await
            .unwrap();
        assert_eq!(interview.status, InterviewStatus::Processing);

        let completed = db
            .complete_interview(interview.id, report())
            .await
            .unwrap();
        assert_eq!(completed.status, InterviewStatus::Completed);
        assert!(completed.report.is_some());

        // A settled interview cannot transition again, in either direction
        let result = db.fail_interview(interview.id).await;
        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));

        let result = db.complete_interview(interview.id, report()).await;
        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_paginated() {
        let db = MemoryDatabase::new();

        let user = db
            .create_user(NewUser {
                name: "Guest-dev-123".to_string(),
                metadata: UserMetadata::default(),
                kind: NewUserKind::Anonymous {
                    device_alias: "dev-123".to_string(),
                },
            })
            .await
            .unwrap();

        for i in 0..5 {
            db.create_interview(new_interview(user.id, &format!("{i}").repeat(64)))
                .await
                .unwrap();
        }

        let page = db.interviews_by_owner(user.id, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].id > page[1].id);

        let rest = db.interviews_by_owner(user.id, 10, 2).await.unwrap();
        assert_eq!(rest.len(), 3);

        assert_eq!(db.count_interviews_by_owner(user.id).await.unwrap(), 5);
    }
}
