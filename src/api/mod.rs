use aide::axum::ApiRouter;

use crate::database::AppState;

pub mod auth;
pub mod products;
pub mod reports;
pub mod sale_draft;
pub mod sales;
pub mod users;

pub fn init(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .merge(auth::router(app_state.clone()))
        .merge(users::router(app_state.clone()))
        .merge(products::router(app_state.clone()))
        .merge(sales::router(app_state.clone()))
        .merge(sale_draft::router(app_state.clone()))
        .merge(reports::router(app_state))
}
