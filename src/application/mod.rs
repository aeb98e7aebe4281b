//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Subscription lifecycle (protocol enforcement, cancellation, demand)
//! - Rate-limited gateway (settle, then forward)
//! - Rate limiter (permit accounting behind the admission policy)
//! - Limiter registry and the publisher operator
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod gateway;
pub mod lifecycle;
pub mod limiter;
pub mod metrics;
pub mod operator;
pub mod ports;
pub mod registry;
