use std::fmt::Debug;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Role {
    Admin,
    Manager,
    Cashier,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Permission {
    SalesView,
    SalesCreate,
    InventoryView,
    InventoryEdit,
    UserManage,
}

const CASHIER_PERMISSIONS: &[Permission] = &[
    Permission::SalesView,
    Permission::SalesCreate,
    Permission::InventoryView,
];

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::SalesView,
    Permission::SalesCreate,
    Permission::InventoryView,
    Permission::InventoryEdit,
];

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::SalesView,
    Permission::SalesCreate,
    Permission::InventoryView,
    Permission::InventoryEdit,
    Permission::UserManage,
];

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Manager => MANAGER_PERMISSIONS,
            Role::Cashier => CASHIER_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Value stored in the `users.role` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
        }
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "cashier" => Ok(Role::Cashier),
            _ => Err(ServiceError::InternalServerError(format!(
                "Unknown role '{s}'"
            ))),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    /// Value stored in the `sales.payment_method` column
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            _ => Err(ServiceError::InternalServerError(format!(
                "Unknown payment method '{s}'"
            ))),
        }
    }
}

#[derive(PartialEq, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Product {
    pub id: u64,
    pub barcode: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SaleItem {
    pub id: u64,
    pub sale_id: u64,
    pub product_id: u64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl SaleItem {
    pub fn total_price(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Sale {
    pub id: u64,
    pub user_id: u64,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SaleDraftItem {
    pub product_id: u64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl SaleDraftItem {
    pub fn total_price(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A sale that has not been recorded yet.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct SaleDraft {
    pub items: Vec<SaleDraftItem>,
}

impl SaleDraft {
    /// Add `quantity` units of `product`, merging with an existing line for the same product.
    ///
    /// The unit price is taken from the product at the time it is first added.
    pub fn add_product(&mut self, product: &Product, quantity: i32) -> ServiceResult<()> {
        if quantity <= 0 {
            return Err(ServiceError::BadRequest(
                "Quantity must be positive".to_owned(),
            ));
        }

        let existing = self
            .items
            .iter()
            .position(|item| item.product_id == product.id);
        let in_draft = existing.map(|i| self.items[i].quantity).unwrap_or(0);

        let total = in_draft
            .checked_add(quantity)
            .ok_or_else(|| ServiceError::BadRequest("Quantity is too large".to_owned()))?;
        if total > product.quantity {
            return Err(ServiceError::BadRequest(format!(
                "Not enough stock for product {}",
                product.name
            )));
        }

        match existing {
            Some(i) => self.items[i].quantity = total,
            None => self.items.push(SaleDraftItem {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                unit_price: product.price,
            }),
        }

        Ok(())
    }

    /// Remove a product from the draft.
    ///
    /// Without a quantity, or with one that covers the whole line, the line is dropped.
    /// Returns `false` if the product is not part of the draft.
    pub fn remove_product(
        &mut self,
        product_id: u64,
        quantity: Option<i32>,
    ) -> ServiceResult<bool> {
        if matches!(quantity, Some(q) if q <= 0) {
            return Err(ServiceError::BadRequest(
                "Quantity must be positive".to_owned(),
            ));
        }

        let Some(i) = self
            .items
            .iter()
            .position(|item| item.product_id == product_id)
        else {
            return Ok(false);
        };

        match quantity {
            Some(quantity) if quantity < self.items[i].quantity => {
                self.items[i].quantity -= quantity;
            }
            _ => {
                self.items.remove(i);
            }
        }

        Ok(true)
    }

    /// Append the lines of `other`, adding up quantities of products present in both.
    ///
    /// Stock is not checked here, recording the sale checks it again.
    pub fn merge(&mut self, other: SaleDraft) {
        for item in other.items {
            match self
                .items
                .iter_mut()
                .find(|i| i.product_id == item.product_id)
            {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity)
                }
                None => self.items.push(item),
            }
        }
    }

    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.total_price())
            .sum::<Decimal>()
            .round_dp(2)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
    pub valid_until: DateTime<Utc>,
    pub draft: SaleDraft,
}

impl Session {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.user.role.has_permission(permission)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct PaymentMethodSummary {
    pub payment_method: PaymentMethod,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TopProduct {
    pub product_id: u64,
    pub name: String,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SalesSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_sales: i64,
    pub total_revenue: Decimal,
    pub average_sale: Decimal,
    pub payment_methods: Vec<PaymentMethodSummary>,
    pub top_products: Vec<TopProduct>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DailySales {
    pub date: NaiveDate,
    pub count: i64,
    pub total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(id: u64, name: &str, price: Decimal, quantity: i32) -> Product {
        Product {
            id,
            barcode: None,
            name: name.to_owned(),
            price,
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Cashier.has_permission(Permission::SalesCreate));
        assert!(Role::Cashier.has_permission(Permission::InventoryView));
        assert!(!Role::Cashier.has_permission(Permission::InventoryEdit));
        assert!(!Role::Cashier.has_permission(Permission::UserManage));

        assert!(Role::Manager.has_permission(Permission::InventoryEdit));
        assert!(!Role::Manager.has_permission(Permission::UserManage));

        for permission in MANAGER_PERMISSIONS {
            assert!(Role::Admin.has_permission(*permission));
        }
        assert!(Role::Admin.has_permission(Permission::UserManage));
    }

    #[test]
    fn test_role_column_values() {
        for role in [Role::Admin, Role::Manager, Role::Cashier] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("root".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_payment_method_column_values() {
        assert_eq!("cash".parse::<PaymentMethod>(), Ok(PaymentMethod::Cash));
        assert_eq!("card".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_draft_merges_lines() {
        let coffee = product(1, "Coffee", dec!(1.50), 10);
        let mut draft = SaleDraft::default();

        draft.add_product(&coffee, 2).unwrap();
        draft.add_product(&coffee, 3).unwrap();

        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].quantity, 5);
        assert_eq!(draft.total(), dec!(7.50));
    }

    #[test]
    fn test_draft_respects_stock() {
        let mate = product(2, "Mate", dec!(2.00), 3);
        let mut draft = SaleDraft::default();

        draft.add_product(&mate, 2).unwrap();
        assert!(matches!(
            draft.add_product(&mate, 2),
            Err(ServiceError::BadRequest(_))
        ));
        assert_eq!(draft.items[0].quantity, 2);

        assert!(matches!(
            draft.add_product(&mate, 0),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn test_draft_captures_price_on_first_add() {
        let mut cookie = product(3, "Cookie", dec!(0.80), 10);
        let mut draft = SaleDraft::default();

        draft.add_product(&cookie, 1).unwrap();
        cookie.price = dec!(1.00);
        draft.add_product(&cookie, 1).unwrap();

        assert_eq!(draft.items[0].unit_price, dec!(0.80));
        assert_eq!(draft.total(), dec!(1.60));
    }

    #[test]
    fn test_draft_remove() {
        let coffee = product(1, "Coffee", dec!(1.50), 10);
        let mate = product(2, "Mate", dec!(2.00), 10);
        let mut draft = SaleDraft::default();
        draft.add_product(&coffee, 4).unwrap();
        draft.add_product(&mate, 1).unwrap();

        assert_eq!(draft.remove_product(1, Some(1)), Ok(true));
        assert_eq!(draft.items[0].quantity, 3);

        assert_eq!(draft.remove_product(1, Some(3)), Ok(true));
        assert_eq!(draft.items.len(), 1);

        assert_eq!(draft.remove_product(1, None), Ok(false));
        assert_eq!(draft.remove_product(2, None), Ok(true));
        assert!(draft.is_empty());
        assert_eq!(draft.total(), Decimal::ZERO);
    }

    #[test]
    fn test_draft_remove_rejects_non_positive_quantity() {
        let mate = product(2, "Mate", dec!(2.00), 5);
        let mut draft = SaleDraft::default();
        draft.add_product(&mate, 2).unwrap();

        for quantity in [0, -100, i32::MIN] {
            assert!(matches!(
                draft.remove_product(2, Some(quantity)),
                Err(ServiceError::BadRequest(_))
            ));
        }
        assert_eq!(draft.items[0].quantity, 2);
    }

    #[test]
    fn test_draft_add_overflowing_quantity() {
        let mate = product(2, "Mate", dec!(2.00), 5);
        let mut draft = SaleDraft::default();
        draft.add_product(&mate, 1).unwrap();

        assert!(matches!(
            draft.add_product(&mate, i32::MAX),
            Err(ServiceError::BadRequest(_))
        ));
        assert_eq!(draft.items[0].quantity, 1);
    }

    #[test]
    fn test_draft_merge() {
        let coffee = product(1, "Coffee", dec!(1.50), 10);
        let mate = product(2, "Mate", dec!(2.00), 10);

        let mut draft = SaleDraft::default();
        draft.add_product(&coffee, 2).unwrap();
        let mut other = SaleDraft::default();
        other.add_product(&mate, 1).unwrap();
        other.add_product(&coffee, 3).unwrap();

        draft.merge(other);
        assert_eq!(draft.items.len(), 2);
        assert_eq!(draft.items[0].quantity, 5);
        assert_eq!(draft.items[1].product_id, 2);
        assert_eq!(draft.items[1].quantity, 1);
    }

    #[test]
    fn test_sale_item_total() {
        let item = SaleItem {
            id: 1,
            sale_id: 1,
            product_id: 1,
            product_name: "Coffee".to_owned(),
            quantity: 3,
            unit_price: dec!(1.25),
        };
        assert_eq!(item.total_price(), dec!(3.75));
    }

    #[test]
    fn test_user_debug_hides_hash() {
        let user = User {
            id: 1,
            username: "alice".to_owned(),
            password_hash: "$argon2i$secret".to_owned(),
            role: Role::Cashier,
            active: true,
            created_at: Utc::now(),
        };
        assert!(!format!("{user:?}").contains("secret"));
    }
}
