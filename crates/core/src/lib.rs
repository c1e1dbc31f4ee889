//! Cartwheel Core - Shared types library.
//!
//! This crate provides the types shared by every Cartwheel component:
//! - `storefront` - Server-rendered cart flyout and product listing
//! - `integration-tests` - Router-level tests against a commerce fake
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O and no
//! HTTP clients. It can be used anywhere, including inside templates.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for entity IDs and money, plus currency formatting

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
