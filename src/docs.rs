use std::sync::Arc;

use aide::{
    axum::{
        routing::{get, get_with},
        ApiRouter, IntoApiResponse,
    },
    openapi::{OpenApi, Tag},
    redoc::Redoc,
    transform::TransformOpenApi,
};
use axum::{response::IntoResponse, Extension, Json};

fn tag(name: &str, description: &str) -> Tag {
    Tag {
        name: name.into(),
        description: Some(description.into()),
        ..Default::default()
    }
}

pub fn api_docs(api: TransformOpenApi) -> TransformOpenApi {
    api.title("pos-server")
        .summary("Point-of-sale backend")
        .description("Users, inventory and sales of a point-of-sale system.")
        .tag(tag("auth", "Login and sessions"))
        .tag(tag("users", "User management"))
        .tag(tag("products", "Inventory management"))
        .tag(tag("sales", "Recorded sales"))
        .tag(tag("sale_draft", "Sale in progress of the current session"))
        .tag(tag("reports", "Sales reports"))
        .security_scheme(
            "SessionToken",
            aide::openapi::SecurityScheme::Http {
                scheme: "bearer".into(),
                bearer_format: None,
                description: Some("Token returned by `POST /api/v1/auth/password`.".into()),
                extensions: Default::default(),
            },
        )
}

pub fn docs_routes() -> ApiRouter {
    // Response inference is only enabled for the redoc page itself, so that it is
    // documented as `text/html`.
    aide::gen::infer_responses(true);

    let router = ApiRouter::new()
        .api_route_with(
            "/",
            get_with(
                Redoc::new("/docs/api.json")
                    .with_title("pos-server")
                    .axum_handler(),
                |op| op.description("This documentation page."),
            ),
            |p| p.security_requirement("SessionToken"),
        )
        .route("/api.json", get(serve_docs));

    aide::gen::infer_responses(false);

    router
}

async fn serve_docs(Extension(api): Extension<Arc<OpenApi>>) -> impl IntoApiResponse {
    Json(api.as_ref()).into_response()
}
