use aide::axum::routing::{delete_with, get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::env;
use crate::error::{ServiceError, ServiceResult};
use crate::password::password_hash_verify;
use crate::request_state::RequestState;

use super::users::UserDto;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/auth/password",
            post_with(auth_password_based, auth_password_based_docs),
        )
        .api_route("/auth/user", get_with(auth_get_user, auth_get_user_docs))
        .api_route("/auth", delete_with(auth_delete, auth_delete_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct AuthTokenDto {
    pub token: String,
    pub valid_until: DateTime<Utc>,
    pub user: UserDto,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct AuthPasswordBasedDto {
    pub username: String,
    pub password: String,
}

const INVALID_LOGIN: &str = "Invalid username or password";

async fn auth_password_based(
    mut state: RequestState,
    form: Json<AuthPasswordBasedDto>,
) -> ServiceResult<Json<AuthTokenDto>> {
    let form = form.0;
    let user = state.db.get_user_by_username(&form.username).await?;

    let Some(user) = user else {
        return Err(ServiceError::Unauthorized(INVALID_LOGIN));
    };

    if !user.active || !password_hash_verify(&user.password_hash, &form.password)? {
        return Err(ServiceError::Unauthorized(INVALID_LOGIN));
    }

    let session = state
        .sessions
        .create(user, Duration::minutes(*env::SESSION_LIFETIME_MINUTES))
        .await;

    info!(
        "User {} logged in with role {}",
        session.user.username,
        session.user.role.as_str()
    );

    Ok(Json(AuthTokenDto {
        token: session.token,
        valid_until: session.valid_until,
        user: UserDto::from(&session.user),
    }))
}

fn auth_password_based_docs(op: TransformOperation) -> TransformOperation {
    op.description("Login with username and password.")
        .tag("auth")
        .response::<200, Json<AuthTokenDto>>()
        .response_with::<401, (), _>(|res| res.description("Invalid username or password!"))
}

async fn auth_get_user(state: RequestState) -> ServiceResult<Json<UserDto>> {
    let session = state.session_require()?;
    Ok(Json(UserDto::from(&session.user)))
}

fn auth_get_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the user of the current session.")
        .tag("auth")
        .response::<200, Json<UserDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn auth_delete(state: RequestState) -> ServiceResult<()> {
    let session = state.session_require()?;
    state.sessions.remove(&session.token).await;

    info!("User {} logged out", session.user.username);
    Ok(())
}

fn auth_delete_docs(op: TransformOperation) -> TransformOperation {
    op.description("Logout the current session.")
        .tag("auth")
        .response::<200, ()>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}
