//! Core types and trait definitions for the Cohort data-capture engine.
//!
//! Form definitions ("schemas") are versioned metadata; captured answers are
//! stored entity-attribute-value style against one schema version. This crate
//! is deliberately free of database dependencies: backends implement
//! [`store::DataStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod constraint;
pub mod context;
pub mod entity;
pub mod error;
pub mod naming;
pub mod schema;
pub mod store;
pub mod traverse;
pub mod value;

pub use error::{ConstraintError, Error, Result};
