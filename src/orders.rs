//! Read-only access to order reference data.
//!
//! Orders belong to the order service. The inbox only needs two things from
//! them: proof that an order exists for a vendor, and the shipping contact
//! used to seed a freshly created order-bound thread.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::inbox::InboxError;

/// The slice of an order the inbox cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Order id.
    pub id: String,
    /// Vendor that fulfils the order.
    pub vendor_id: String,
    /// Registered buyer, absent for guest checkouts.
    pub buyer_user_id: Option<String>,
    /// Shipping recipient name.
    pub shipping_name: Option<String>,
    /// Shipping contact email.
    pub shipping_email: Option<String>,
    /// Shipping contact phone.
    pub shipping_phone: Option<String>,
    /// Human-facing order reference (e.g. `#1042`).
    pub reference: Option<String>,
}

/// Lookup of orders scoped to a vendor.
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    /// Find `order_id` among the orders of `vendor_id`.
    ///
    /// An order that exists but belongs to another vendor is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`InboxError::Database`] if the lookup itself fails.
    async fn find_for_vendor(
        &self,
        vendor_id: &str,
        order_id: &str,
    ) -> Result<Option<OrderRecord>, InboxError>;
}

/// Row type returned by SQLite queries for orders.
type OrderRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// [`OrderDirectory`] reading the shared `orders` table.
#[derive(Debug, Clone)]
pub struct SqliteOrderDirectory {
    db: SqlitePool,
}

impl SqliteOrderDirectory {
    /// Wrap a pool whose database carries the `orders` table.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderDirectory for SqliteOrderDirectory {
    async fn find_for_vendor(
        &self,
        vendor_id: &str,
        order_id: &str,
    ) -> Result<Option<OrderRecord>, InboxError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, vendor_id, buyer_user_id, shipping_name, shipping_email, \
             shipping_phone, reference \
             FROM orders WHERE id = ?1 AND vendor_id = ?2",
        )
        .bind(order_id)
        .bind(vendor_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(
            |(id, vendor_id, buyer_user_id, name, email, phone, reference)| OrderRecord {
                id,
                vendor_id,
                buyer_user_id,
                shipping_name: name,
                shipping_email: email,
                shipping_phone: phone,
                reference,
            },
        ))
    }
}
