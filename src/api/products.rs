use aide::axum::routing::{get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::{Path, Query};
use axum::Json;
use chrono::{DateTime, Utc};
use log::info;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::env;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, Permission};
use crate::request_state::RequestState;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/product/:id",
            get_with(get_product, get_product_docs)
                .put_with(update_product, update_product_docs)
                .delete_with(delete_product, delete_product_docs),
        )
        .api_route(
            "/product/:id/stock",
            post_with(adjust_stock, adjust_stock_docs),
        )
        .api_route(
            "/product/barcode/:barcode",
            get_with(get_product_by_barcode, get_product_by_barcode_docs),
        )
        .api_route(
            "/products/search",
            get_with(search_products, search_products_docs),
        )
        .api_route(
            "/products/low-stock",
            get_with(list_low_stock_products, list_low_stock_products_docs),
        )
        .api_route(
            "/products",
            get_with(list_products, list_products_docs)
                .post_with(create_product, create_product_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ProductDto {
    pub id: u64,
    pub barcode: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&models::Product> for ProductDto {
    fn from(value: &models::Product) -> Self {
        Self {
            id: value.id,
            barcode: value.barcode.to_owned(),
            name: value.name.to_owned(),
            price: value.price,
            quantity: value.quantity,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveProductDto {
    pub barcode: Option<String>,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: i32,
}

impl SaveProductDto {
    /// Check the product data and apply it to `product`.
    fn apply(self, product: &mut models::Product) -> ServiceResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest(
                "Product name must not be empty".to_owned(),
            ));
        }
        if self.price < Decimal::ZERO {
            return Err(ServiceError::BadRequest(
                "Product price must not be negative".to_owned(),
            ));
        }
        if self.quantity < 0 {
            return Err(ServiceError::BadRequest(
                "Product quantity must not be negative".to_owned(),
            ));
        }

        product.barcode = self
            .barcode
            .map(|b| b.trim().to_owned())
            .filter(|b| !b.is_empty());
        product.name = name.to_owned();
        product.price = self.price.round_dp(2);
        product.quantity = self.quantity;
        Ok(())
    }
}

async fn list_products(mut state: RequestState) -> ServiceResult<Json<Vec<ProductDto>>> {
    state.session_require_permission(Permission::InventoryView)?;

    let products = state.db.get_all_products().await?;
    Ok(Json(products.iter().map(|p| p.into()).collect()))
}

fn list_products_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all products ordered by name.")
        .tag("products")
        .response::<200, Json<Vec<ProductDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_view"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SearchDto {
    pub query: String,
}

async fn search_products(
    mut state: RequestState,
    Query(search): Query<SearchDto>,
) -> ServiceResult<Json<Vec<ProductDto>>> {
    state.session_require_permission(Permission::InventoryView)?;

    let products = state.db.search_products(search.query.trim()).await?;
    Ok(Json(products.iter().map(|p| p.into()).collect()))
}

fn search_products_docs(op: TransformOperation) -> TransformOperation {
    op.description("Search products by name or barcode.")
        .tag("products")
        .response::<200, Json<Vec<ProductDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_view"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct LowStockDto {
    pub threshold: Option<i32>,
}

async fn list_low_stock_products(
    mut state: RequestState,
    Query(filter): Query<LowStockDto>,
) -> ServiceResult<Json<Vec<ProductDto>>> {
    state.session_require_permission(Permission::InventoryView)?;

    let threshold = filter.threshold.unwrap_or(*env::LOW_STOCK_THRESHOLD);
    let products = state.db.get_low_stock_products(threshold).await?;
    Ok(Json(products.iter().map(|p| p.into()).collect()))
}

fn list_low_stock_products_docs(op: TransformOperation) -> TransformOperation {
    op.description("List products with a quantity at or below the threshold.")
        .tag("products")
        .response::<200, Json<Vec<ProductDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_view"])
}

async fn get_product(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<ProductDto>> {
    state.session_require_permission(Permission::InventoryView)?;

    let product = state.db.get_product_by_id(id).await?;

    if let Some(product) = product {
        return Ok(Json(ProductDto::from(&product)));
    }

    Err(ServiceError::NotFound)
}

fn get_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a product by id.")
        .tag("products")
        .response::<200, Json<ProductDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested product does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_view"])
}

async fn get_product_by_barcode(
    mut state: RequestState,
    Path(barcode): Path<String>,
) -> ServiceResult<Json<ProductDto>> {
    state.session_require_permission(Permission::InventoryView)?;

    let product = state.db.get_product_by_barcode(&barcode).await?;

    if let Some(product) = product {
        return Ok(Json(ProductDto::from(&product)));
    }

    Err(ServiceError::NotFound)
}

fn get_product_by_barcode_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a product by its barcode.")
        .tag("products")
        .response::<200, Json<ProductDto>>()
        .response_with::<404, (), _>(|res| res.description("No product has this barcode!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_view"])
}

async fn create_product(
    mut state: RequestState,
    form: Json<SaveProductDto>,
) -> ServiceResult<Json<ProductDto>> {
    state.session_require_permission(Permission::InventoryEdit)?;

    let mut product = models::Product {
        id: 0,
        barcode: None,
        name: String::new(),
        price: Decimal::ZERO,
        quantity: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    form.0.apply(&mut product)?;

    let product = state.db.store_product(product).await?;
    info!("Created product {} with ID {}", product.name, product.id);
    Ok(Json(ProductDto::from(&product)))
}

fn create_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new product.")
        .tag("products")
        .response::<200, Json<ProductDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid product data!"))
        .response_with::<409, (), _>(|res| res.description("The barcode is already in use!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_edit"])
}

async fn update_product(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: Json<SaveProductDto>,
) -> ServiceResult<Json<ProductDto>> {
    state.session_require_permission(Permission::InventoryEdit)?;

    let product = state.db.get_product_by_id(id).await?;

    if let Some(mut product) = product {
        form.0.apply(&mut product)?;

        let product = state.db.store_product(product).await?;
        info!("Updated product ID {}", product.id);
        return Ok(Json(ProductDto::from(&product)));
    }

    Err(ServiceError::NotFound)
}

fn update_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update a product.")
        .tag("products")
        .response::<200, Json<ProductDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid product data!"))
        .response_with::<404, (), _>(|res| res.description("The requested product does not exist!"))
        .response_with::<409, (), _>(|res| res.description("The barcode is already in use!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_edit"])
}

async fn delete_product(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<()> {
    state.session_require_permission(Permission::InventoryEdit)?;

    state.db.delete_product(id).await?;
    info!("Deleted product ID {}", id);
    Ok(())
}

fn delete_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a product. Products that were sold cannot be deleted.")
        .tag("products")
        .response::<200, ()>()
        .response_with::<404, (), _>(|res| res.description("The requested product does not exist!"))
        .response_with::<409, (), _>(|res| res.description("The product is part of recorded sales!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_edit"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct AdjustStockDto {
    /// Positive values add stock, negative values remove it.
    pub delta: i32,
}

async fn adjust_stock(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: Json<AdjustStockDto>,
) -> ServiceResult<Json<ProductDto>> {
    state.session_require_permission(Permission::InventoryEdit)?;

    let product = state.db.adjust_product_quantity(id, form.delta).await?;
    info!("Updated product ID {} quantity by {}", id, form.delta);
    Ok(Json(ProductDto::from(&product)))
}

fn adjust_stock_docs(op: TransformOperation) -> TransformOperation {
    op.description("Change the stock of a product by a relative amount.")
        .tag("products")
        .response::<200, Json<ProductDto>>()
        .response_with::<400, (), _>(|res| res.description("The stock would become negative!"))
        .response_with::<404, (), _>(|res| res.description("The requested product does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["inventory_edit"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn empty_product() -> models::Product {
        models::Product {
            id: 1,
            barcode: Some("old".to_owned()),
            name: "Old".to_owned(),
            price: dec!(1.00),
            quantity: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn form(name: &str, price: Decimal, quantity: i32, barcode: Option<&str>) -> SaveProductDto {
        SaveProductDto {
            barcode: barcode.map(|b| b.to_owned()),
            name: name.to_owned(),
            price,
            quantity,
        }
    }

    #[test]
    fn test_apply_valid_form() {
        let mut product = empty_product();
        form(" Club Mate ", dec!(1.499), 12, Some(" 4029764001807 "))
            .apply(&mut product)
            .unwrap();

        assert_eq!(product.name, "Club Mate");
        assert_eq!(product.price, dec!(1.50));
        assert_eq!(product.quantity, 12);
        assert_eq!(product.barcode.as_deref(), Some("4029764001807"));
    }

    #[test]
    fn test_apply_empty_barcode_is_none() {
        let mut product = empty_product();
        form("Mate", dec!(1.00), 0, Some("  ")).apply(&mut product).unwrap();
        assert_eq!(product.barcode, None);
    }

    #[test]
    fn test_apply_rejects_invalid_data() {
        let mut product = empty_product();
        let before = product.clone();

        assert!(form(" ", dec!(1.00), 0, None).apply(&mut product).is_err());
        assert!(form("Mate", dec!(-0.01), 0, None).apply(&mut product).is_err());
        assert!(form("Mate", dec!(1.00), -1, None).apply(&mut product).is_err());
        assert_eq!(product, before);
    }

    #[test]
    fn test_quantity_defaults_to_zero() {
        let form: SaveProductDto =
            serde_json::from_str(r#"{"name": "Mate", "price": "1.20", "barcode": null}"#).unwrap();
        assert_eq!(form.quantity, 0);
        assert_eq!(form.price, dec!(1.20));
    }
}
