use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rust_decimal::Decimal;
use sqlx::Connection;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{PaymentMethod, Sale, SaleDraft, SaleItem};

use super::DatabaseConnection;

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    user_id: i64,
    total_amount: Decimal,
    payment_method: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = ServiceError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        Ok(Sale {
            id: row.id as u64,
            user_id: row.user_id as u64,
            total_amount: row.total_amount,
            payment_method: row.payment_method.parse()?,
            created_at: row.created_at,
            items: Vec::new(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: i64,
    sale_id: i64,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            id: row.id as u64,
            sale_id: row.sale_id as u64,
            product_id: row.product_id as u64,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: i64,
    name: String,
    quantity: i32,
}

const SELECT_SALE: &str = "SELECT id, user_id, total_amount, payment_method, created_at FROM sales";

pub const DEFAULT_SALES_LIMIT: i64 = 100;

impl DatabaseConnection {
    /// Record a sale with all its items and take the sold quantities from stock.
    ///
    /// Runs in a single transaction. The product rows are locked before their stock is checked,
    /// so concurrent sales of the same product are serialized.
    pub async fn create_sale(
        &mut self,
        user_id: u64,
        payment_method: PaymentMethod,
        draft: &SaleDraft,
    ) -> ServiceResult<Sale> {
        if draft.is_empty() {
            return Err(ServiceError::BadRequest(
                "Cannot create sale without items".to_owned(),
            ));
        }

        let mut requested = BTreeMap::<u64, i32>::new();
        for item in draft.items.iter() {
            if item.quantity <= 0 {
                return Err(ServiceError::BadRequest(format!(
                    "Invalid quantity {} for product {}",
                    item.quantity, item.product_id
                )));
            }
            *requested.entry(item.product_id).or_default() += item.quantity;
        }

        let mut tx = self.connection.begin().await?;

        // ascending id order, see BTreeMap
        let ids: Vec<i64> = requested.keys().map(|id| *id as i64).collect();
        let stock = sqlx::query_as::<_, StockRow>(
            "SELECT id, name, quantity FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        for (product_id, quantity) in requested.iter() {
            let Some(product) = stock.iter().find(|p| p.id as u64 == *product_id) else {
                return Err(ServiceError::BadRequest(format!(
                    "Product {product_id} does not exist"
                )));
            };
            if product.quantity < *quantity {
                return Err(ServiceError::BadRequest(format!(
                    "Not enough stock for product {}",
                    product.name
                )));
            }
        }

        let total_amount = draft.total();

        let sale_row = sqlx::query_as::<_, SaleRow>(
            r#"
            INSERT INTO sales (user_id, total_amount, payment_method)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, total_amount, payment_method, created_at
            "#,
        )
        .bind(user_id as i64)
        .bind(total_amount)
        .bind(payment_method.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let mut sale = Sale::try_from(sale_row)?;

        for item in draft.items.iter() {
            let item_id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO sale_items (sale_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(sale.id as i64)
            .bind(item.product_id as i64)
            .bind(item.quantity)
            .bind(item.unit_price)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("UPDATE products SET quantity = quantity - $2 WHERE id = $1")
                .bind(item.product_id as i64)
                .bind(item.quantity)
                .execute(&mut *tx)
                .await?;

            sale.items.push(SaleItem {
                id: item_id as u64,
                sale_id: sale.id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        tx.commit().await?;

        info!(
            "Created sale {} with {} items, total {}",
            sale.id,
            sale.items.len(),
            sale.total_amount
        );
        Ok(sale)
    }

    pub async fn get_sale_by_id(&mut self, id: u64) -> ServiceResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!("{SELECT_SALE} WHERE id = $1"))
            .bind(id as i64)
            .fetch_optional(&mut *self.connection)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut sale = Sale::try_from(row)?;

        let items = sqlx::query_as::<_, SaleItemRow>(
            r#"
            SELECT si.id, si.sale_id, si.product_id, p.name AS product_name, si.quantity, si.unit_price
            FROM sale_items si
            JOIN products p ON si.product_id = p.id
            WHERE si.sale_id = $1
            ORDER BY si.id
            "#,
        )
        .bind(id as i64)
        .fetch_all(&mut *self.connection)
        .await?;

        sale.items = items.into_iter().map(SaleItem::from).collect();
        Ok(Some(sale))
    }

    /// Sale headers, newest first. Items are not loaded.
    pub async fn get_sales(&mut self, limit: i64, offset: i64) -> ServiceResult<Vec<Sale>> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "{SELECT_SALE} ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter().map(Sale::try_from).collect()
    }

    /// Sale headers of the calendar days `start..=end`, newest first.
    pub async fn get_sales_by_date_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<Vec<Sale>> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "{SELECT_SALE} \
             WHERE created_at >= $1::date AND created_at < $2::date + 1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter().map(Sale::try_from).collect()
    }

    /// Delete a sale together with its items. Stock is not restored.
    pub async fn delete_sale(&mut self, id: u64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(id as i64)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }
}
