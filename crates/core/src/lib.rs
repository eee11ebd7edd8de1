//! `siteops-core`: shared identifiers and validation errors.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ModelId, RuleId, SubjectId};
