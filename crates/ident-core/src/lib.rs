//! Core types, store traits and the identity-resolution algorithm.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::ContactStore`]; the HTTP layer drives
//! a [`resolver::Resolver`] built on top of one.

pub mod contact;
pub mod error;
pub mod memory;
pub mod resolve;
pub mod resolver;
pub mod store;
pub mod view;

pub use error::{Error, ResolveError, Result};
