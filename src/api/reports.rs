use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Query;
use axum::Json;
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, Permission};
use crate::request_state::RequestState;

use super::sales::{DateRangeDto, PaymentMethodDto};

const DEFAULT_SUMMARY_DAYS: i64 = 30;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/reports/summary",
            get_with(get_sales_summary, get_sales_summary_docs),
        )
        .api_route(
            "/reports/daily",
            get_with(get_daily_sales, get_daily_sales_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PaymentMethodSummaryDto {
    pub payment_method: PaymentMethodDto,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TopProductDto {
    pub product_id: u64,
    pub name: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SalesSummaryDto {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_sales: i64,
    pub total_revenue: Decimal,
    pub average_sale: Decimal,
    pub payment_methods: Vec<PaymentMethodSummaryDto>,
    pub top_products: Vec<TopProductDto>,
}

impl From<&models::SalesSummary> for SalesSummaryDto {
    fn from(value: &models::SalesSummary) -> Self {
        Self {
            start: value.start,
            end: value.end,
            total_sales: value.total_sales,
            total_revenue: value.total_revenue,
            average_sale: value.average_sale,
            payment_methods: value
                .payment_methods
                .iter()
                .map(|p| PaymentMethodSummaryDto {
                    payment_method: (&p.payment_method).into(),
                    count: p.count,
                    total: p.total,
                })
                .collect(),
            top_products: value
                .top_products
                .iter()
                .map(|p| TopProductDto {
                    product_id: p.product_id,
                    name: p.name.to_owned(),
                    total_quantity: p.total_quantity,
                    total_revenue: p.total_revenue,
                })
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SummaryQueryDto {
    /// Number of days up to today. Ignored if `start` and `end` are given.
    pub days: Option<i64>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl SummaryQueryDto {
    fn range(&self, today: NaiveDate) -> ServiceResult<(NaiveDate, NaiveDate)> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            let range = DateRangeDto { start, end };
            range.validate()?;
            return Ok((range.start, range.end));
        }

        let days = self.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
        let start = u64::try_from(days)
            .ok()
            .and_then(|days| today.checked_sub_days(Days::new(days)))
            .ok_or_else(|| ServiceError::BadRequest(format!("Invalid number of days {days}")))?;
        Ok((start, today))
    }
}

async fn get_sales_summary(
    mut state: RequestState,
    Query(query): Query<SummaryQueryDto>,
) -> ServiceResult<Json<SalesSummaryDto>> {
    state.session_require_permission(Permission::SalesView)?;

    let (start, end) = query.range(Utc::now().date_naive())?;
    let summary = state.db.get_sales_summary(start, end).await?;
    Ok(Json(SalesSummaryDto::from(&summary)))
}

fn get_sales_summary_docs(op: TransformOperation) -> TransformOperation {
    op.description("Sales count, revenue, payment methods and top products of a period.")
        .tag("reports")
        .response::<200, Json<SalesSummaryDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid period!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_view"])
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DailySalesDto {
    pub date: NaiveDate,
    pub count: i64,
    pub total: Decimal,
}

async fn get_daily_sales(
    mut state: RequestState,
    Query(range): Query<DateRangeDto>,
) -> ServiceResult<Json<Vec<DailySalesDto>>> {
    state.session_require_permission(Permission::SalesView)?;
    range.validate()?;

    let days = state.db.get_daily_sales(range.start, range.end).await?;
    Ok(Json(
        days.iter()
            .map(|d| DailySalesDto {
                date: d.date,
                count: d.count,
                total: d.total,
            })
            .collect(),
    ))
}

fn get_daily_sales_docs(op: TransformOperation) -> TransformOperation {
    op.description("Number and total of sales per day.")
        .tag("reports")
        .response::<200, Json<Vec<DailySalesDto>>>()
        .response_with::<400, (), _>(|res| res.description("Invalid date range!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["sales_view"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_summary_range_defaults_to_30_days() {
        let query = SummaryQueryDto {
            days: None,
            start: None,
            end: None,
        };
        assert_eq!(
            query.range(date(2024, 3, 31)),
            Ok((date(2024, 3, 1), date(2024, 3, 31)))
        );
    }

    #[test]
    fn test_summary_range_prefers_explicit_dates() {
        let query = SummaryQueryDto {
            days: Some(7),
            start: Some(date(2024, 1, 1)),
            end: Some(date(2024, 1, 31)),
        };
        assert_eq!(
            query.range(date(2024, 3, 31)),
            Ok((date(2024, 1, 1), date(2024, 1, 31)))
        );
    }

    #[test]
    fn test_summary_range_rejects_invalid_input() {
        let query = SummaryQueryDto {
            days: Some(-1),
            start: None,
            end: None,
        };
        assert!(query.range(date(2024, 3, 31)).is_err());

        let query = SummaryQueryDto {
            days: Some(100_000_000),
            start: None,
            end: None,
        };
        assert!(matches!(
            query.range(date(2024, 3, 31)),
            Err(ServiceError::BadRequest(_))
        ));

        let query = SummaryQueryDto {
            days: Some(i64::MAX),
            start: None,
            end: None,
        };
        assert!(query.range(date(2024, 3, 31)).is_err());

        let query = SummaryQueryDto {
            days: None,
            start: Some(date(2024, 2, 1)),
            end: Some(date(2024, 1, 1)),
        };
        assert!(query.range(date(2024, 3, 31)).is_err());
    }
}
