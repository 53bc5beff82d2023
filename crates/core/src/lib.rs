//! `salonstock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy shared by every layer, and the aggregate /
//! entity traits.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ResourceKind};
pub use id::{AuditEntryId, CategoryId, LocationId, ProductId, ProductTypeId, TransferId};
