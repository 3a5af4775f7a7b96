use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::ServiceResult;
use crate::models::{DailySales, PaymentMethodSummary, SalesSummary, TopProduct};

use super::DatabaseConnection;

const TOP_PRODUCTS_LIMIT: i64 = 5;

#[derive(Debug, sqlx::FromRow)]
struct TotalsRow {
    total_sales: i64,
    total_revenue: Decimal,
    average_sale: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentMethodRow {
    payment_method: String,
    count: i64,
    total: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct TopProductRow {
    id: i64,
    name: String,
    total_quantity: i64,
    total_revenue: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct DailySalesRow {
    sale_date: NaiveDate,
    sale_count: i64,
    total_amount: Decimal,
}

impl DatabaseConnection {
    /// Aggregate the sales of the calendar days `start..=end`.
    pub async fn get_sales_summary(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<SalesSummary> {
        let totals = sqlx::query_as::<_, TotalsRow>(
            r#"
            SELECT
                COUNT(*) AS total_sales,
                COALESCE(SUM(total_amount), 0) AS total_revenue,
                COALESCE(ROUND(AVG(total_amount), 2), 0) AS average_sale
            FROM sales
            WHERE created_at >= $1::date AND created_at < $2::date + 1
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&mut *self.connection)
        .await?;

        let payment_methods = sqlx::query_as::<_, PaymentMethodRow>(
            r#"
            SELECT payment_method, COUNT(*) AS count, SUM(total_amount) AS total
            FROM sales
            WHERE created_at >= $1::date AND created_at < $2::date + 1
            GROUP BY payment_method
            ORDER BY payment_method
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.connection)
        .await?
        .into_iter()
        .map(|row| -> ServiceResult<PaymentMethodSummary> {
            Ok(PaymentMethodSummary {
                payment_method: row.payment_method.parse()?,
                count: row.count,
                total: row.total,
            })
        })
        .collect::<ServiceResult<Vec<_>>>()?;

        let top_products = sqlx::query_as::<_, TopProductRow>(
            r#"
            SELECT
                p.id,
                p.name,
                SUM(si.quantity) AS total_quantity,
                SUM(si.quantity * si.unit_price) AS total_revenue
            FROM sale_items si
            JOIN products p ON si.product_id = p.id
            JOIN sales s ON si.sale_id = s.id
            WHERE s.created_at >= $1::date AND s.created_at < $2::date + 1
            GROUP BY p.id, p.name
            ORDER BY total_revenue DESC, p.id
            LIMIT $3
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(TOP_PRODUCTS_LIMIT)
        .fetch_all(&mut *self.connection)
        .await?
        .into_iter()
        .map(|row| TopProduct {
            product_id: row.id as u64,
            name: row.name,
            total_quantity: row.total_quantity,
            total_revenue: row.total_revenue,
        })
        .collect();

        Ok(SalesSummary {
            start,
            end,
            total_sales: totals.total_sales,
            total_revenue: totals.total_revenue,
            average_sale: totals.average_sale,
            payment_methods,
            top_products,
        })
    }

    /// Number and total of sales per calendar day, oldest first. Days without sales are omitted.
    pub async fn get_daily_sales(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<Vec<DailySales>> {
        let rows = sqlx::query_as::<_, DailySalesRow>(
            r#"
            SELECT
                created_at::date AS sale_date,
                COUNT(*) AS sale_count,
                SUM(total_amount) AS total_amount
            FROM sales
            WHERE created_at >= $1::date AND created_at < $2::date + 1
            GROUP BY created_at::date
            ORDER BY sale_date
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DailySales {
                date: row.sale_date,
                count: row.sale_count,
                total: row.total_amount,
            })
            .collect())
    }
}
