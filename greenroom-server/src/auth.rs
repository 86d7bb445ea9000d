use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    routing::{patch, post},
    Json,
};

use greenroom_core::{Credentials, NewAccount, UserData};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{
        AnonymousSessionSchema, LoginSchema, LogoutSchema, MetadataSchema, RefreshSchema,
        SignupSchema, ValidatedJson,
    },
    serialized::{AuthResult, Message, Tokens, ToSerialized, User},
    Router,
};

/// The user resolved from the request's Bearer access token
pub struct CurrentUser(pub UserData);

#[async_trait]
impl FromRequestParts<ServerContext> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::InvalidOrExpiredToken)?;

        let token = token
            .strip_prefix("Bearer ")
            .ok_or(ServerError::InvalidOrExpiredToken)?;

        let user = state.greenroom.auth.current_user(token).await?;

        Ok(Self(user))
    }
}

async fn anonymous_session(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<AnonymousSessionSchema>,
) -> ServerResult<Json<AuthResult>> {
    let session = context.greenroom.auth.create_anonymous(&body.device_id).await?;

    Ok(Json(session.to_serialized()))
}

async fn signup(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SignupSchema>,
) -> ServerResult<(StatusCode, Json<AuthResult>)> {
    let session = context
        .greenroom
        .auth
        .signup(NewAccount {
            email: body.email,
            name: body.name,
            password: body.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(session.to_serialized())))
}

async fn login(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<AuthResult>> {
    let session = context
        .greenroom
        .auth
        .login(Credentials {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

async fn refresh(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<RefreshSchema>,
) -> ServerResult<Json<Tokens>> {
    let pair = context.greenroom.auth.refresh(&body.refresh_token).await?;

    Ok(Json(pair.to_serialized()))
}

async fn logout(
    CurrentUser(user): CurrentUser,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<LogoutSchema>,
) -> ServerResult<Json<Message>> {
    context
        .greenroom
        .auth
        .logout(user.id, body.refresh_token.as_deref());

    Ok(Json(Message::new("Logout successful")))
}

async fn upgrade(
    State(context): State<ServerContext>,
    Path(device_alias): Path<String>,
    ValidatedJson(body): ValidatedJson<SignupSchema>,
) -> ServerResult<Json<AuthResult>> {
    let session = context
        .greenroom
        .auth
        .upgrade(
            &device_alias,
            NewAccount {
                email: body.email,
                name: body.name,
                password: body.password,
            },
        )
        .await?;

    Ok(Json(session.to_serialized()))
}

async fn update_metadata(
    CurrentUser(user): CurrentUser,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<MetadataSchema>,
) -> ServerResult<Json<User>> {
    let updated = context
        .greenroom
        .auth
        .update_metadata(user.id, body.metadata)
        .await?;

    Ok(Json(updated.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/anonymous-session", post(anonymous_session))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/upgrade/:device_alias", post(upgrade))
        .route("/metadata", patch(update_metadata))
}
