use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{ServiceError, ServiceResult};
use crate::models::Product;

use super::DatabaseConnection;

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ProductRow {
    id: i64,
    barcode: Option<String>,
    name: String,
    price: Decimal,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id as u64,
            barcode: row.barcode,
            name: row.name,
            price: row.price,
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) const SELECT_PRODUCT: &str =
    "SELECT id, barcode, name, price, quantity, created_at, updated_at FROM products";

impl DatabaseConnection {
    pub async fn get_all_products(&mut self) -> ServiceResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} ORDER BY name, id"))
            .fetch_all(&mut *self.connection)
            .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn get_product_by_id(&mut self, id: u64) -> ServiceResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE id = $1"))
            .bind(id as i64)
            .fetch_optional(&mut *self.connection)
            .await?;

        Ok(row.map(Product::from))
    }

    pub async fn get_product_by_barcode(&mut self, barcode: &str) -> ServiceResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE barcode = $1"))
            .bind(barcode)
            .fetch_optional(&mut *self.connection)
            .await?;

        Ok(row.map(Product::from))
    }

    /// Case insensitive substring search on name and barcode.
    pub async fn search_products(&mut self, query: &str) -> ServiceResult<Vec<Product>> {
        let pattern = format!("%{}%", escape_like(query));

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE name ILIKE $1 OR barcode ILIKE $1 ORDER BY name, id"
        ))
        .bind(pattern)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn get_low_stock_products(&mut self, threshold: i32) -> ServiceResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE quantity <= $1 ORDER BY quantity, name"
        ))
        .bind(threshold)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Insert the product if its id is `0`, update it otherwise.
    pub async fn store_product(&mut self, product: Product) -> ServiceResult<Product> {
        let row = if product.id == 0 {
            sqlx::query_as::<_, ProductRow>(
                r#"
                INSERT INTO products (barcode, name, price, quantity)
                VALUES ($1, $2, $3, $4)
                RETURNING id, barcode, name, price, quantity, created_at, updated_at
                "#,
            )
            .bind(&product.barcode)
            .bind(&product.name)
            .bind(product.price)
            .bind(product.quantity)
            .fetch_one(&mut *self.connection)
            .await?
        } else {
            sqlx::query_as::<_, ProductRow>(
                r#"
                UPDATE products SET barcode = $2, name = $3, price = $4, quantity = $5
                WHERE id = $1
                RETURNING id, barcode, name, price, quantity, created_at, updated_at
                "#,
            )
            .bind(product.id as i64)
            .bind(&product.barcode)
            .bind(&product.name)
            .bind(product.price)
            .bind(product.quantity)
            .fetch_optional(&mut *self.connection)
            .await?
            .ok_or(ServiceError::NotFound)?
        };

        Ok(row.into())
    }

    /// Add `delta` to the stock of a product. The stock never drops below zero.
    pub async fn adjust_product_quantity(&mut self, id: u64, delta: i32) -> ServiceResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products SET quantity = quantity + $2
            WHERE id = $1 AND quantity + $2 >= 0
            RETURNING id, barcode, name, price, quantity, created_at, updated_at
            "#,
        )
        .bind(id as i64)
        .bind(delta)
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.get_product_by_id(id).await? {
                Some(product) => Err(ServiceError::BadRequest(format!(
                    "Not enough stock for product {}",
                    product.name
                ))),
                None => Err(ServiceError::NotFound),
            },
        }
    }

    /// Fails with `Conflict` while sale items reference the product.
    pub async fn delete_product(&mut self, id: u64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id as i64)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("cola"), "cola");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
