//! Cartwheel Core - Shared domain types.
//!
//! This crate provides the types shared by every Cartwheel component:
//! - `storefront` - Cart reconciliation and order service
//! - `cli` - Migrations and development tooling
//!
//! # Architecture
//!
//! The core crate contains only types, validation, and pure cart arithmetic -
//! no I/O, no database access, no HTTP clients. Storage and transport live in
//! the storefront crate.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, money, carts, orders, statuses, sequence numbers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
