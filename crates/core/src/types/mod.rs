//! Core types for Cartwheel.
//!
//! This module provides type-safe wrappers for the storefront's domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod principal;
pub mod sequence;
pub mod status;
pub mod validation;

pub use cart::{Cart, CartAction, CartActionRequest, CartItem, CartItemDraft, normalize_items};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{
    Customer, CustomerDraft, MAX_NOTES_LENGTH, NewOrder, Order, OrderCreated, OrderItem,
    OrderItemDraft, OrderRequest, OrderTotals,
};
pub use price::{MAX_AMOUNT, Price};
pub use principal::{Principal, Role};
pub use sequence::{MAX_SEQUENCE, SequencePurpose, format_sequence_number, parse_sequence_number};
pub use status::*;
pub use validation::{MAX_QUANTITY, ValidationError, validate_quantity};
