use axum::{extract::State, routing::post, Json};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{SessionTokenSchema, ValidatedJson},
    serialized::{SessionCredential, ToSerialized},
    Router,
};

async fn token(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SessionTokenSchema>,
) -> ServerResult<Json<SessionCredential>> {
    let credential = context
        .greenroom
        .sessions
        .open(&body.room_name, &body.participant_name)
        .await?;

    Ok(Json(credential.to_serialized()))
}

pub fn router() -> Router {
    Router::new().route("/token", post(token))
}
