//! # sync-types
//!
//! Shared types for the actionsync action log.
//!
//! This crate provides the foundational types used across all actionsync
//! crates:
//! - [`ActionId`] - Totally ordered, globally unique action identity
//! - [`Action`] - Opaque application-defined state change
//! - [`Meta`] - Ordering and retention metadata attached to every action
//!
//! These types carry no I/O and no async machinery; they exist so that the
//! server core and embedding applications agree on identity, ordering and
//! garbage-collection semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod action;
mod ids;
mod meta;

pub use action::Action;
pub use ids::{ActionId, ParseIdError};
pub use meta::Meta;
