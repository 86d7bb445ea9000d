use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use validator::Validate;

use greenroom_core::{Difficulty, SessionRecording, UserMetadata};

use crate::errors::ServerError;

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnonymousSessionSchema {
    #[validate(length(min = 1, max = 128))]
    pub device_id: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupSchema {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(length(min = 8, max = 64))]
    pub password: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 128))]
    pub email: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefreshSchema {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogoutSchema {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetadataSchema {
    pub metadata: UserMetadata,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalyzeSchema {
    #[validate(length(min = 1, max = 256))]
    pub room_name: String,
    #[validate(length(min = 1, max = 128))]
    pub participant_identity: String,
    pub session_data: SessionRecording,
    #[validate(length(min = 1, max = 2048))]
    pub case_question: String,
    pub difficulty: Difficulty,
    #[validate(length(max = 2048))]
    pub candidate_answer: Option<String>,
}

#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionTokenSchema {
    #[validate(length(min = 1, max = 256))]
    pub room_name: String,
    #[validate(length(min = 1, max = 128))]
    pub participant_name: String,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| ServerError::Validation("JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| ServerError::Validation("Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
