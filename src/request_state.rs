use aide::OperationInput;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;

use crate::{
    database::{AppState, DatabaseConnection},
    error::{ServiceError, ServiceResult},
    models::{Permission, Session},
    session_store::SessionStore,
};

/// Per request view on the application: a pooled database connection and the session of the
/// bearer token, if any.
pub struct RequestState {
    pub db: DatabaseConnection,
    pub session: Option<Session>,
    pub sessions: SessionStore,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestState
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let db = state.connection().await?;

        let session = if let Ok(TypedHeader(Authorization(bearer))) =
            parts.extract::<TypedHeader<Authorization<Bearer>>>().await
        {
            state.sessions.get(bearer.token()).await
        } else {
            None
        };

        Ok(Self {
            db,
            session,
            sessions: state.sessions.clone(),
        })
    }
}

impl OperationInput for RequestState {}

impl RequestState {
    pub fn session_require(&self) -> ServiceResult<Session> {
        self.session
            .clone()
            .ok_or(ServiceError::Unauthorized("Missing login"))
    }

    pub fn session_require_permission(&self, permission: Permission) -> ServiceResult<Session> {
        let session = self.session_require()?;

        if session.has_permission(permission) {
            Ok(session)
        } else {
            Err(ServiceError::Forbidden)
        }
    }

    /// Allow access to the own user or with `UserManage`.
    pub fn session_require_manage_or_self(&self, user_id: u64) -> ServiceResult<Session> {
        let session = self.session_require()?;

        if session.user.id == user_id || session.has_permission(Permission::UserManage) {
            Ok(session)
        } else {
            Err(ServiceError::Forbidden)
        }
    }
}
