use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    routing::{get, post},
    Json,
};
use serde::Deserialize;

use greenroom_core::{NewSubmission, Pagination};

use crate::{
    auth::CurrentUser,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{AnalyzeSchema, ValidatedJson},
    serialized::{AnalysisAdmitted, Interview, InterviewList, ToSerialized},
    Router,
};

/// The header carrying an interview's capability token
const INTERVIEW_TOKEN_HEADER: &str = "x-interview-token";

/// The raw capability token presented with the request. Shape validation
/// happens in the orchestrator, before any store access.
pub struct InterviewToken(pub String);

#[async_trait]
impl FromRequestParts<ServerContext> for InterviewToken {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(INTERVIEW_TOKEN_HEADER)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::InvalidOrExpiredToken)?;

        Ok(Self(token.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PageQuery {
    fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();

        Pagination {
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, 100),
            offset: self.offset.unwrap_or(defaults.offset).max(0),
        }
    }
}

async fn analyze(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<AnalyzeSchema>,
) -> ServerResult<Json<AnalysisAdmitted>> {
    let admission = context
        .greenroom
        .interviews
        .submit(NewSubmission {
            room_name: body.room_name,
            participant_identity: body.participant_identity,
            recording: body.session_data,
            case_question: body.case_question,
            difficulty: body.difficulty,
            candidate_answer: body.candidate_answer,
        })
        .await?;

    Ok(Json(admission.to_serialized()))
}

async fn shared(
    State(context): State<ServerContext>,
    InterviewToken(token): InterviewToken,
) -> ServerResult<Json<Interview>> {
    let interview = context.greenroom.interviews.interview_by_token(&token).await?;

    Ok(Json(interview.to_serialized()))
}

async fn list(
    CurrentUser(user): CurrentUser,
    State(context): State<ServerContext>,
    Query(page): Query<PageQuery>,
) -> ServerResult<Json<InterviewList>> {
    let interviews = context
        .greenroom
        .interviews
        .summaries_for_owner(user.id, page.pagination())
        .await?;

    Ok(Json(interviews.to_serialized()))
}

async fn by_id(
    CurrentUser(user): CurrentUser,
    State(context): State<ServerContext>,
    Path(interview_id): Path<i32>,
) -> ServerResult<Json<Interview>> {
    let interview = context
        .greenroom
        .interviews
        .interview_for_owner(user.id, interview_id)
        .await?;

    Ok(Json(interview.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list))
        .route("/analyze", post(analyze))
        .route("/shared", get(shared))
        .route("/:id", get(by_id))
}
