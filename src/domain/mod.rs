//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts of the gateway:
//! - Outcomes settled with an admission-control policy
//! - Fixed-window permit accounting
//! - Rate limiter configuration
//!
//! All types in this layer are pure and easily testable.

pub mod config;
pub mod outcome;
pub mod permits;
