//! leadbox: vendor↔buyer messaging and lead tracking for a marketplace.
//!
//! Threaded conversations between a vendor and a buyer or anonymous contact,
//! optionally bound to an order; per-side read markers and unread counts;
//! funnel metadata on each conversation; and inbox views grouped per order or
//! per counterpart.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod orders;

pub mod inbox;
