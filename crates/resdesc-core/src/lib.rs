//! # resdesc-core
//!
//! Core types, validation, and traits for research descriptions.
//!
//! This crate has no I/O. It defines the `research_description` record,
//! the error taxonomy, the validation layer, and the repository trait that
//! storage backends implement.

pub mod error;
pub mod geometry;
pub mod logging;
pub mod models;
pub mod traits;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use geometry::GeometryError;
pub use models::*;
pub use traits::*;
pub use validation::{
    parse_structured, validate, validate_batch, validate_kind, TypeVocabulary, ValidationPolicy,
    ValidationReport, Violation,
};
