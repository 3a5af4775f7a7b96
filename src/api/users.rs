use aide::axum::routing::{get_with, put_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::Json;
use chrono::{DateTime, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, Permission};
use crate::password::password_hash_create;
use crate::request_state::RequestState;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/user/:id",
            get_with(get_user, get_user_docs)
                .put_with(update_user, update_user_docs)
                .delete_with(delete_user, delete_user_docs),
        )
        .api_route(
            "/user/:id/password",
            put_with(set_user_password, set_user_password_docs),
        )
        .api_route(
            "/users",
            get_with(list_users, list_users_docs).post_with(create_user, create_user_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleDto {
    Admin,
    Manager,
    Cashier,
}

impl From<&models::Role> for RoleDto {
    fn from(value: &models::Role) -> Self {
        match value {
            models::Role::Admin => RoleDto::Admin,
            models::Role::Manager => RoleDto::Manager,
            models::Role::Cashier => RoleDto::Cashier,
        }
    }
}

impl From<RoleDto> for models::Role {
    fn from(value: RoleDto) -> Self {
        match value {
            RoleDto::Admin => models::Role::Admin,
            RoleDto::Manager => models::Role::Manager,
            RoleDto::Cashier => models::Role::Cashier,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct UserDto {
    pub id: u64,
    pub username: String,
    pub role: RoleDto,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&models::User> for UserDto {
    fn from(value: &models::User) -> Self {
        Self {
            id: value.id,
            username: value.username.to_owned(),
            role: (&value.role).into(),
            active: value.active,
            created_at: value.created_at,
        }
    }
}

fn validate_username(username: &str) -> ServiceResult<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ServiceError::BadRequest(
            "Username must not be empty".to_owned(),
        ));
    }
    Ok(username.to_owned())
}

fn validate_password(password: &str) -> ServiceResult<()> {
    if password.is_empty() {
        return Err(ServiceError::BadRequest(
            "Password must not be empty".to_owned(),
        ));
    }
    Ok(())
}

async fn list_users(mut state: RequestState) -> ServiceResult<Json<Vec<UserDto>>> {
    state.session_require_permission(Permission::UserManage)?;

    let users = state.db.get_all_users().await?;
    Ok(Json(users.iter().map(|u| u.into()).collect()))
}

fn list_users_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all users.")
        .tag("users")
        .response::<200, Json<Vec<UserDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage"])
}

async fn get_user(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<Json<UserDto>> {
    state.session_require_manage_or_self(id)?;

    let user = state.db.get_user_by_id(id).await?;

    if let Some(user) = user {
        return Ok(Json(UserDto::from(&user)));
    }

    Err(ServiceError::NotFound)
}

fn get_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a user by id.")
        .tag("users")
        .response::<200, Json<UserDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage", "self"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateUserDto {
    pub username: String,
    pub password: String,
    pub role: RoleDto,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

async fn create_user(
    mut state: RequestState,
    form: Json<CreateUserDto>,
) -> ServiceResult<Json<UserDto>> {
    state.session_require_permission(Permission::UserManage)?;

    let form = form.0;
    let username = validate_username(&form.username)?;
    validate_password(&form.password)?;

    let user = models::User {
        id: 0,
        username,
        password_hash: password_hash_create(&form.password)?,
        role: form.role.into(),
        active: form.active,
        created_at: Utc::now(),
    };

    let user = state.db.store_user(user).await?;
    info!("Created user {} with ID {}", user.username, user.id);
    Ok(Json(UserDto::from(&user)))
}

fn create_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new user.")
        .tag("users")
        .response::<200, Json<UserDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid username or password!"))
        .response_with::<409, (), _>(|res| res.description("The username is already taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateUserDto {
    pub username: String,
    pub role: RoleDto,
    pub active: bool,
}

async fn update_user(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: Json<UpdateUserDto>,
) -> ServiceResult<Json<UserDto>> {
    let session = state.session_require_permission(Permission::UserManage)?;

    let form = form.0;
    let user = state.db.get_user_by_id(id).await?;

    if let Some(mut user) = user {
        let role: models::Role = form.role.into();

        if session.user.id == id && (!form.active || role != user.role) {
            return Err(ServiceError::BadRequest(
                "Cannot change role or deactivate the own account".to_owned(),
            ));
        }

        let ends_sessions = role != user.role || form.active != user.active;

        user.username = validate_username(&form.username)?;
        user.role = role;
        user.active = form.active;

        let user = state.db.store_user(user).await?;
        if ends_sessions {
            state.sessions.remove_user(user.id).await;
        }

        info!("Updated user ID {}", user.id);
        return Ok(Json(UserDto::from(&user)));
    }

    Err(ServiceError::NotFound)
}

fn update_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update a user. Changing the role or the active flag ends the user's sessions.")
        .tag("users")
        .response::<200, Json<UserDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid user data!"))
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<409, (), _>(|res| res.description("The username is already taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage"])
}

async fn delete_user(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<()> {
    let session = state.session_require_permission(Permission::UserManage)?;

    if session.user.id == id {
        return Err(ServiceError::BadRequest(
            "Cannot delete the own account".to_owned(),
        ));
    }

    state.db.delete_user(id).await?;
    state.sessions.remove_user(id).await;

    info!("Deleted user ID {}", id);
    Ok(())
}

fn delete_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a user. Users that recorded sales cannot be deleted, deactivate them instead.")
        .tag("users")
        .response::<200, ()>()
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<409, (), _>(|res| res.description("The user has recorded sales!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SetPasswordDto {
    pub password: String,
}

async fn set_user_password(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: Json<SetPasswordDto>,
) -> ServiceResult<()> {
    state.session_require_manage_or_self(id)?;

    let form = form.0;
    validate_password(&form.password)?;

    let hash = password_hash_create(&form.password)?;
    state.db.set_user_password(id, &hash).await?;

    info!("Changed password of user ID {}", id);
    Ok(())
}

fn set_user_password_docs(op: TransformOperation) -> TransformOperation {
    op.description("Set the password of a user.")
        .tag("users")
        .response::<200, ()>()
        .response_with::<400, (), _>(|res| res.description("The password is empty!"))
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage", "self"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  alice "), Ok("alice".to_owned()));
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn test_role_dto_serialization() {
        assert_eq!(serde_json::to_string(&RoleDto::Cashier).unwrap(), "\"cashier\"");
        let role: RoleDto = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(models::Role::from(role), models::Role::Manager);
    }
}
