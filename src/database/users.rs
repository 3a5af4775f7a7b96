use chrono::{DateTime, Utc};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Role, User};

use super::{DatabaseConnection, ADMIN_USERNAME};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ServiceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id as u64,
            username: row.username,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

const SELECT_USER: &str =
    "SELECT id, username, password_hash, role, active, created_at FROM users";

impl DatabaseConnection {
    pub async fn get_all_users(&mut self) -> ServiceResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} ORDER BY username"))
            .fetch_all(&mut *self.connection)
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    pub async fn get_user_by_id(&mut self, id: u64) -> ServiceResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id as i64)
            .fetch_optional(&mut *self.connection)
            .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn get_user_by_username(&mut self, username: &str) -> ServiceResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE username = $1"))
            .bind(username)
            .fetch_optional(&mut *self.connection)
            .await?;

        row.map(User::try_from).transpose()
    }

    /// Insert the user if its id is `0`, update username, role and active flag otherwise.
    ///
    /// The password hash is only written on insert, see [`Self::set_user_password`].
    pub async fn store_user(&mut self, user: User) -> ServiceResult<User> {
        let row = if user.id == 0 {
            sqlx::query_as::<_, UserRow>(
                r#"
                INSERT INTO users (username, password_hash, role, active)
                VALUES ($1, $2, $3, $4)
                RETURNING id, username, password_hash, role, active, created_at
                "#,
            )
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.active)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query_as::<_, UserRow>(
                r#"
                UPDATE users SET username = $2, role = $3, active = $4
                WHERE id = $1
                RETURNING id, username, password_hash, role, active, created_at
                "#,
            )
            .bind(user.id as i64)
            .bind(&user.username)
            .bind(user.role.as_str())
            .bind(user.active)
            .fetch_optional(&mut *self.connection)
            .await?
            .ok_or(ServiceError::NotFound)?
        };

        row.try_into()
    }

    pub async fn set_user_password(&mut self, id: u64, password_hash: &str) -> ServiceResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id as i64)
            .bind(password_hash)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }

    /// Fails with `Conflict` while sales reference the user.
    pub async fn delete_user(&mut self, id: u64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id as i64)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }

    /// Insert the default administrator unless a user named `admin` already exists.
    ///
    /// Returns `true` if the account was created by this call.
    pub async fn seed_admin(&mut self, password_hash: &str) -> ServiceResult<bool> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (username, password_hash, role, active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (username) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(ADMIN_USERNAME)
        .bind(password_hash)
        .bind(Role::Admin.as_str())
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(inserted.is_some())
    }
}
