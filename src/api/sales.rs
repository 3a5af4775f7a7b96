use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::{Path, Query};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::{AppState, DEFAULT_SALES_LIMIT};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, Permission};
use crate::request_state::RequestState;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/sale/:id",
            get_with(get_sale, get_sale_docs).delete_with(delete_sale, delete_sale_docs),
        )
        .api_route(
            "/sales/range",
            get_with(list_sales_by_date_range, list_sales_by_date_range_docs),
        )
        .api_route(
            "/sales",
            get_with(list_sales, list_sales_docs).post_with(create_sale, create_sale_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodDto {
    Cash,
    Card,
}

impl From<&models::PaymentMethod> for PaymentMethodDto {
    fn from(value: &models::PaymentMethod) -> Self {
        match value {
            models::PaymentMethod::Cash => PaymentMethodDto::Cash,
            models::PaymentMethod::Card => PaymentMethodDto::Card,
        }
    }
}

impl From<PaymentMethodDto> for models::PaymentMethod {
    fn from(value: PaymentMethodDto) -> Self {
        match value {
            PaymentMethodDto::Cash => models::PaymentMethod::Cash,
            PaymentMethodDto::Card => models::PaymentMethod::Card,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SaleItemDto {
    pub id: u64,
    pub product_id: u64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl From<&models::SaleItem> for SaleItemDto {
    fn from(value: &models::SaleItem) -> Self {
        Self {
            id: value.id,
            product_id: value.product_id,
            product_name: value.product_name.to_owned(),
            quantity: value.quantity,
            unit_price: value.unit_price,
            total_price: value.total_price(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SaleDto {
    pub id: u64,
    pub user_id: u64,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethodDto,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItemDto>,
}

impl From<&models::Sale> for SaleDto {
    fn from(value: &models::Sale) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            total_amount: value.total_amount,
            payment_method: (&value.payment_method).into(),
            created_at: value.created_at,
            items: value.items.iter().map(|i| i.into()).collect(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct PaginationDto {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn list_sales(
    mut state: RequestState,
    Query(page): Query<PaginationDto>,
) -> ServiceResult<Json<Vec<SaleDto>>> {
    state.session_require_permission(Permission::SalesView)?;

    let limit = page.limit.unwrap_or(DEFAULT_SALES_LIMIT).max(0);
    let offset = page.offset.unwrap_or(0).max(0);

    let sales = state.db.get_sales(limit, offset).await?;
    Ok(Json(sales.iter().map(|s| s.into()).collect()))
}

fn list_sales_docs(op: TransformOperation) -> TransformOperation {
    op.description("List sales, newest first. Items are not included.")
        .tag("sales")
        .response::<200, Json<Vec<SaleDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_view"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DateRangeDto {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRangeDto {
    pub fn validate(&self) -> ServiceResult<()> {
        if self.start > self.end {
            return Err(ServiceError::BadRequest(
                "Start date is after end date".to_owned(),
            ));
        }
        Ok(())
    }
}

async fn list_sales_by_date_range(
    mut state: RequestState,
    Query(range): Query<DateRangeDto>,
) -> ServiceResult<Json<Vec<SaleDto>>> {
    state.session_require_permission(Permission::SalesView)?;
    range.validate()?;

    let sales = state
        .db
        .get_sales_by_date_range(range.start, range.end)
        .await?;
    Ok(Json(sales.iter().map(|s| s.into()).collect()))
}

fn list_sales_by_date_range_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the sales of the given days (inclusive), newest first.")
        .tag("sales")
        .response::<200, Json<Vec<SaleDto>>>()
        .response_with::<400, (), _>(|res| res.description("Invalid date range!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_view"])
}

async fn get_sale(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<Json<SaleDto>> {
    state.session_require_permission(Permission::SalesView)?;

    let sale = state.db.get_sale_by_id(id).await?;

    if let Some(sale) = sale {
        return Ok(Json(SaleDto::from(&sale)));
    }

    Err(ServiceError::NotFound)
}

fn get_sale_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a sale with all its items.")
        .tag("sales")
        .response::<200, Json<SaleDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested sale does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_view"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateSaleItemDto {
    pub product_id: u64,
    pub quantity: i32,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateSaleDto {
    pub payment_method: PaymentMethodDto,
    pub items: Vec<CreateSaleItemDto>,
}

async fn create_sale(
    mut state: RequestState,
    form: Json<CreateSaleDto>,
) -> ServiceResult<Json<SaleDto>> {
    let session = state.session_require_permission(Permission::SalesCreate)?;

    let form = form.0;
    let mut draft = models::SaleDraft::default();

    for item in form.items {
        let product = state.db.get_product_by_id(item.product_id).await?;
        let Some(product) = product else {
            return Err(ServiceError::BadRequest(format!(
                "Product {} does not exist",
                item.product_id
            )));
        };
        draft.add_product(&product, item.quantity)?;
    }

    let sale = state
        .db
        .create_sale(session.user.id, form.payment_method.into(), &draft)
        .await?;
    Ok(Json(SaleDto::from(&sale)))
}

fn create_sale_docs(op: TransformOperation) -> TransformOperation {
    op.description("Record a sale. Unit prices are taken from the current product prices and the sold quantities are removed from stock.")
        .tag("sales")
        .response::<200, Json<SaleDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("No items, unknown products or not enough stock!")
        })
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_create"])
}

async fn delete_sale(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<()> {
    state.session_require_permission(Permission::UserManage)?;

    state.db.delete_sale(id).await?;
    info!("Deleted sale ID {}", id);
    Ok(())
}

fn delete_sale_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a sale and its items. The stock is not restored.")
        .tag("sales")
        .response::<200, ()>()
        .response_with::<404, (), _>(|res| res.description("The requested sale does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["user_manage"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_validation() {
        let range = DateRangeDto {
            start: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert!(range.validate().is_err());

        let range = DateRangeDto {
            start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert!(range.validate().is_ok());
    }

    #[test]
    fn test_create_sale_dto() {
        let form: CreateSaleDto = serde_json::from_str(
            r#"{"payment_method": "card", "items": [{"product_id": 3, "quantity": 2}]}"#,
        )
        .unwrap();
        assert_eq!(form.payment_method, PaymentMethodDto::Card);
        assert_eq!(form.items[0].product_id, 3);

        assert!(serde_json::from_str::<CreateSaleDto>(
            r#"{"payment_method": "cheque", "items": []}"#
        )
        .is_err());
    }
}
