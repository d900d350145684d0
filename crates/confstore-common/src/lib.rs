//! Common types for confstore
//!
//! This crate provides the value types shared by every confstore crate:
//! hierarchical keys and patterns, the structured error model and paging.

pub mod app_errors;
pub mod error;
pub mod key;
pub mod paging;

pub use app_errors::{AppErrors, ErrorMessage};
pub use error::{Result, StoreError};
pub use key::{Key, Pattern, PatternSegment, SEPARATOR, WILDCARD};
pub use paging::PagingResult;
