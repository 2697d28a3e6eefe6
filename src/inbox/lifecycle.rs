//! Idempotent find-or-create of threads.
//!
//! Concurrency is settled by the `threads_triple` unique index: every caller
//! attempts `INSERT .. ON CONFLICT DO NOTHING` and then reads back whichever
//! row won. No process-local lock is involved, so racing service instances
//! converge on the same thread id.
//!
//! Anonymous contacts are keyed on their first identifier (email, then
//! phone, then name) but matched on any of them: a visitor who wrote with a
//! phone number and later adds an email lands in the existing thread, which
//! picks up the new email for later lookups.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::model::{ContactInfo, Counterpart, Lead, Thread};
use super::threads::{
    absorb_contact, find_by_contact, find_by_triple, insert_if_absent, load_thread, NewThread,
};
use super::InboxError;
use crate::orders::{OrderDirectory, OrderRecord};

/// Shipping contact of an order as a [`ContactInfo`].
fn shipping_contact(order: &OrderRecord) -> ContactInfo {
    ContactInfo {
        name: order.shipping_name.clone(),
        email: order.shipping_email.clone(),
        phone: order.shipping_phone.clone(),
    }
    .normalized()
}

/// Fill blank counterpart fields from order data. The counterpart key is
/// computed before seeding, so seeding never changes thread identity.
fn seed_from_order(counterpart: &Counterpart, order: Option<&OrderRecord>) -> Counterpart {
    let Some(order) = order else {
        return counterpart.clone();
    };
    match counterpart {
        Counterpart::Buyer { user_id, name } => Counterpart::Buyer {
            user_id: user_id.clone(),
            name: name.clone().or_else(|| order.shipping_name.clone()),
        },
        Counterpart::Contact(info) => Counterpart::Contact(info.clone().or(&shipping_contact(order))),
    }
}

/// Find or create the thread for `(vendor_id, counterpart, order_id)`.
///
/// A newly created thread starts with `seed` as its lead metadata (status,
/// tags and event fields); an existing thread keeps its metadata. The buyer
/// id and contact fields are trimmed before anything is looked up or stored.
///
/// # Errors
///
/// Returns [`InboxError::MissingContact`] if the counterpart carries no
/// identifier, [`InboxError::OrderNotFoundForVendor`] if `order_id` is not an
/// order of the vendor, [`InboxError::Conflict`] if the winning row of a race
/// cannot be read back, or [`InboxError::Database`] on SQLite failure.
pub async fn ensure_thread(
    db: &SqlitePool,
    orders: &dyn OrderDirectory,
    vendor_id: &str,
    counterpart: &Counterpart,
    order_id: Option<&str>,
    seed: Lead,
    now: DateTime<Utc>,
) -> Result<Thread, InboxError> {
    let counterpart = &counterpart.normalized();
    let key = counterpart.key()?;
    let order_id = order_id.map(str::trim).filter(|s| !s.is_empty());

    let order = match order_id {
        Some(order_id) => Some(
            orders
                .find_for_vendor(vendor_id, order_id)
                .await?
                .ok_or_else(|| InboxError::OrderNotFoundForVendor {
                    vendor_id: vendor_id.to_owned(),
                    order_id: order_id.to_owned(),
                })?,
        ),
        None => None,
    };

    if let Some(existing) = find_by_triple(db, vendor_id, &key, order_id).await? {
        debug!(thread_id = %existing.id, "thread already exists");
        return Ok(existing);
    }

    let email_key = counterpart.email_key();
    let phone_key = counterpart.phone_key();
    if let Some(existing) = find_by_contact(
        db,
        vendor_id,
        email_key.as_deref(),
        phone_key.as_deref(),
        order_id,
    )
    .await?
    {
        absorb_contact(db, &existing.id, counterpart).await?;
        debug!(thread_id = %existing.id, counterpart = %key, "matched thread by contact alias");
        return load_thread(db, &existing.id).await;
    }

    let candidate = NewThread {
        id: uuid::Uuid::new_v4().to_string(),
        vendor_id: vendor_id.to_owned(),
        counterpart: seed_from_order(counterpart, order.as_ref()),
        counterpart_key: key.clone(),
        order_id: order_id.map(str::to_owned),
        lead: seed,
        created_at: now,
    };

    let created = insert_if_absent(db, &candidate).await?;
    let thread = find_by_triple(db, vendor_id, &key, order_id)
        .await?
        .ok_or_else(|| InboxError::Conflict(key.clone()))?;

    if created {
        info!(
            thread_id = %thread.id,
            vendor_id,
            counterpart = %key,
            order_id = ?order_id,
            "thread created"
        );
    } else {
        debug!(thread_id = %thread.id, "thread creation lost race; using existing");
    }
    Ok(thread)
}

/// Find or create the thread about `order_id`, deriving the counterpart from
/// the order: its registered buyer if any, otherwise its shipping contact.
///
/// # Errors
///
/// Returns [`InboxError::OrderNotFoundForVendor`] if the vendor has no such
/// order, [`InboxError::MissingContact`] if a guest order has no usable
/// contact, or any error of [`ensure_thread`].
pub async fn ensure_thread_for_order(
    db: &SqlitePool,
    orders: &dyn OrderDirectory,
    vendor_id: &str,
    order_id: &str,
    now: DateTime<Utc>,
) -> Result<Thread, InboxError> {
    let order = orders
        .find_for_vendor(vendor_id, order_id)
        .await?
        .ok_or_else(|| InboxError::OrderNotFoundForVendor {
            vendor_id: vendor_id.to_owned(),
            order_id: order_id.to_owned(),
        })?;

    let counterpart = match &order.buyer_user_id {
        Some(user_id) => Counterpart::Buyer {
            user_id: user_id.clone(),
            name: order.shipping_name.clone(),
        },
        None => Counterpart::Contact(shipping_contact(&order)),
    };

    ensure_thread(
        db,
        orders,
        vendor_id,
        &counterpart,
        Some(order_id),
        Lead::default(),
        now,
    )
    .await
}
