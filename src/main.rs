use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::openapi::OpenApi;
use axum::Extension;
use clap::{Parser, Subcommand};
use log::{error, info};
use tower_http::cors::CorsLayer;

use crate::database::{AppState, SCHEMA_SQL};
use crate::error::ServiceResult;

mod api;
mod database;
mod docs;
mod env;
mod error;
mod models;
mod password;
mod request_state;
mod session_store;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply the schema, create the admin account and start the web server (default)
    Run,
    /// Apply the schema and create the admin account, then exit
    Init,
    /// Print the database schema
    Schema,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::Init => init().await.map(|_| ()),
        Command::Schema => {
            println!("{SCHEMA_SQL}");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn init() -> ServiceResult<AppState> {
    let app_state = AppState::connect(env::DATABASE_URL.as_str()).await?;
    app_state.ensure_admin().await?;

    info!("Database schema initialized successfully.");
    Ok(app_state)
}

async fn run() -> ServiceResult<()> {
    let app_state = init().await?;

    let mut api = OpenApi::default();
    let app = ApiRouter::new()
        .nest("/api/v1", api::init(app_state))
        .nest_api_service("/docs", docs::docs_routes())
        .finish_api_with(&mut api, docs::api_docs)
        .layer(Extension(Arc::new(api)))
        .layer(CorsLayer::permissive());

    let address = format!("{}:{}", env::API_HOST.as_str(), env::API_PORT.as_str());
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("Start http server at {}", address);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
