use log::{info, warn};
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

use crate::env;
use crate::error::ServiceResult;
use crate::password;
use crate::session_store::SessionStore;

mod products;
mod reports;
mod sales;
mod users;

pub use sales::DEFAULT_SALES_LIMIT;


/// Schema migrations embedded into the binary.
static MIGRATOR: Migrator = sqlx::migrate!("src/database/sql");

/// The schema script. Every statement in it may be executed again on an initialized database.
pub const SCHEMA_SQL: &str = include_str!("database/sql/0001_pos_schema.sql");

/// Username of the account created by [`DatabaseConnection::seed_admin`].
pub const ADMIN_USERNAME: &str = "admin";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub sessions: SessionStore,
}

impl AppState {
    pub async fn connect(url: &str) -> ServiceResult<AppState> {
        let pool = PgPoolOptions::new()
            .max_connections(*env::DATABASE_MAX_CONNECTIONS)
            .connect(url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and bring its schema up to date.
    pub async fn from_pool(pool: PgPool) -> ServiceResult<AppState> {
        MIGRATOR.run(&pool).await?;

        Ok(AppState {
            pool,
            sessions: SessionStore::default(),
        })
    }

    pub async fn connection(&self) -> ServiceResult<DatabaseConnection> {
        Ok(DatabaseConnection {
            connection: self.pool.acquire().await?,
        })
    }

    /// Create the default `admin` account unless an account with that name exists.
    ///
    /// The password is taken from `ADMIN_PASSWORD` or generated.
    pub async fn ensure_admin(&self) -> ServiceResult<()> {
        let mut db = self.connection().await?;

        if db.get_user_by_username(ADMIN_USERNAME).await?.is_some() {
            return Ok(());
        }

        let (admin_password, generated) = match env::ADMIN_PASSWORD.as_ref() {
            Some(p) => (p.clone(), false),
            None => (password::generate_password(), true),
        };
        let hash = password::password_hash_create(&admin_password)?;

        if db.seed_admin(&hash).await? {
            if generated {
                warn!(
                    "Created user '{}' with generated password '{}', change it after the first login!",
                    ADMIN_USERNAME, admin_password
                );
            } else {
                info!("Created user '{}'", ADMIN_USERNAME);
            }
        }

        Ok(())
    }
}

pub struct DatabaseConnection {
    pub connection: PoolConnection<Postgres>,
}
