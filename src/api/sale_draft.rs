use aide::axum::routing::{delete_with, get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::{Path, Query};
use axum::Json;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, Permission};
use crate::request_state::RequestState;

use super::sales::{PaymentMethodDto, SaleDto};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/sale-draft",
            get_with(get_draft, get_draft_docs).delete_with(clear_draft, clear_draft_docs),
        )
        .api_route(
            "/sale-draft/items",
            post_with(add_draft_item, add_draft_item_docs),
        )
        .api_route(
            "/sale-draft/item/:product_id",
            delete_with(remove_draft_item, remove_draft_item_docs),
        )
        .api_route(
            "/sale-draft/checkout",
            post_with(checkout_draft, checkout_draft_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SaleDraftItemDto {
    pub product_id: u64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SaleDraftDto {
    pub items: Vec<SaleDraftItemDto>,
    pub total: Decimal,
}

impl From<&models::SaleDraft> for SaleDraftDto {
    fn from(value: &models::SaleDraft) -> Self {
        Self {
            items: value
                .items
                .iter()
                .map(|item| SaleDraftItemDto {
                    product_id: item.product_id,
                    product_name: item.product_name.to_owned(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price(),
                })
                .collect(),
            total: value.total(),
        }
    }
}

async fn get_draft(state: RequestState) -> ServiceResult<Json<SaleDraftDto>> {
    let session = state.session_require_permission(Permission::SalesCreate)?;
    Ok(Json(SaleDraftDto::from(&session.draft)))
}

fn get_draft_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the sale draft of the current session.")
        .tag("sale_draft")
        .response::<200, Json<SaleDraftDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_create"])
}

async fn clear_draft(state: RequestState) -> ServiceResult<Json<SaleDraftDto>> {
    let session = state.session_require_permission(Permission::SalesCreate)?;

    let draft = state
        .sessions
        .update_draft(&session.token, |draft| {
            draft.clear();
            Ok(())
        })
        .await?;

    Ok(Json(SaleDraftDto::from(&draft)))
}

fn clear_draft_docs(op: TransformOperation) -> TransformOperation {
    op.description("Remove all items from the sale draft.")
        .tag("sale_draft")
        .response::<200, Json<SaleDraftDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_create"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct AddDraftItemDto {
    /// Either `product_id` or `barcode` identifies the product.
    pub product_id: Option<u64>,
    pub barcode: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

async fn add_draft_item(
    mut state: RequestState,
    form: Json<AddDraftItemDto>,
) -> ServiceResult<Json<SaleDraftDto>> {
    let session = state.session_require_permission(Permission::SalesCreate)?;

    let form = form.0;
    let product = match (form.product_id, form.barcode) {
        (Some(id), _) => state.db.get_product_by_id(id).await?,
        (None, Some(barcode)) => state.db.get_product_by_barcode(barcode.trim()).await?,
        (None, None) => {
            return Err(ServiceError::BadRequest(
                "Either product_id or barcode is required".to_owned(),
            ))
        }
    };
    let product = product.ok_or(ServiceError::NotFound)?;

    let draft = state
        .sessions
        .update_draft(&session.token, |draft| {
            draft.add_product(&product, form.quantity)
        })
        .await?;

    Ok(Json(SaleDraftDto::from(&draft)))
}

fn add_draft_item_docs(op: TransformOperation) -> TransformOperation {
    op.description("Add a product to the sale draft, by id or barcode.")
        .tag("sale_draft")
        .response::<200, Json<SaleDraftDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid quantity or not enough stock!"))
        .response_with::<404, (), _>(|res| res.description("The requested product does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_create"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct RemoveDraftItemDto {
    /// Removes the whole line if missing.
    pub quantity: Option<i32>,
}

async fn remove_draft_item(
    state: RequestState,
    Path(product_id): Path<u64>,
    Query(form): Query<RemoveDraftItemDto>,
) -> ServiceResult<Json<SaleDraftDto>> {
    let session = state.session_require_permission(Permission::SalesCreate)?;

    let draft = state
        .sessions
        .update_draft(&session.token, |draft| {
            if draft.remove_product(product_id, form.quantity)? {
                Ok(())
            } else {
                Err(ServiceError::NotFound)
            }
        })
        .await?;

    Ok(Json(SaleDraftDto::from(&draft)))
}

fn remove_draft_item_docs(op: TransformOperation) -> TransformOperation {
    op.description("Remove a product, or some units of it, from the sale draft.")
        .tag("sale_draft")
        .response::<200, Json<SaleDraftDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid quantity!"))
        .response_with::<404, (), _>(|res| res.description("The product is not in the draft!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_create"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CheckoutDto {
    pub payment_method: PaymentMethodDto,
}

async fn checkout_draft(
    mut state: RequestState,
    form: Json<CheckoutDto>,
) -> ServiceResult<Json<SaleDto>> {
    let session = state.session_require_permission(Permission::SalesCreate)?;

    // the session draft stays empty while the sale is recorded
    let draft = state.sessions.take_draft(&session.token).await?;

    let sale = match state
        .db
        .create_sale(session.user.id, form.payment_method.into(), &draft)
        .await
    {
        Ok(sale) => sale,
        Err(e) => {
            state.sessions.restore_draft(&session.token, draft).await;
            return Err(e);
        }
    };

    Ok(Json(SaleDto::from(&sale)))
}

fn checkout_draft_docs(op: TransformOperation) -> TransformOperation {
    op.description("Record the sale draft as a sale and start a new draft.")
        .tag("sale_draft")
        .response::<200, Json<SaleDto>>()
        .response_with::<400, (), _>(|res| res.description("Empty draft or not enough stock!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_create"])
}
