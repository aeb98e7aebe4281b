//! # stream-throttle
//!
//! Rate-limited gateway for backpressured push streams.
//!
//! This crate inserts an admission-control policy between an upstream source and a
//! downstream subscriber. Every element is **settled** with the policy as a success
//! before it is forwarded, and every upstream failure is settled as a failure before it
//! is forwarded. Completion passes through untouched. The streaming contract is kept
//! intact: demand flows upstream, cancellation is idempotent, and downstream sees at
//! most one terminal signal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stream_throttle::{
//!     Publisher, RateLimitPublisherExt, RateLimiter, RateLimiterConfig, RequestNotPermitted,
//!     Subscriber, Subscription,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[derive(Debug)]
//! # enum AppError { Throttled(RequestNotPermitted) }
//! # impl From<RequestNotPermitted> for AppError {
//! #     fn from(e: RequestNotPermitted) -> Self { AppError::Throttled(e) }
//! # }
//! # struct Orders;
//! # impl Publisher<u64, AppError> for Orders {
//! #     fn subscribe<S: Subscriber<u64, AppError> + Send + 'static>(&self, _s: S) {}
//! # }
//! # struct Printer;
//! # impl Subscriber<u64, AppError> for Printer {
//! #     fn on_subscribe(&mut self, s: Arc<dyn Subscription>) { s.request(u64::MAX) }
//! #     fn on_next(&mut self, id: u64) { println!("order {id}") }
//! #     fn on_error(&mut self, e: AppError) { eprintln!("{e:?}") }
//! #     fn on_complete(&mut self) {}
//! # }
//! // 10 subscriptions per second, waiting at most 100ms for a permit
//! let config = RateLimiterConfig::builder()
//!     .limit_for_period(10)
//!     .limit_refresh_period(Duration::from_secs(1))
//!     .timeout_duration(Duration::from_millis(100))
//!     .build()
//!     .unwrap();
//! let limiter = Arc::new(RateLimiter::new("orders", config).unwrap());
//!
//! let orders = Orders.rate_limited(limiter);
//! orders.subscribe(Printer);
//! ```
//!
//! ## Settlement Order
//!
//! Settlement happens before forwarding. A downstream subscriber that inspects the
//! policy from inside `on_next` already sees the capacity left after its own element:
//!
//! ```text
//! upstream ──on_next(x)──▶ BaseSubscriber ──▶ RateLimitedSubscriber
//!                                                 │ 1. settle Success(&x)
//!                                                 │ 2. downstream.on_next(x)
//!                                                 ▼
//!                                             downstream
//! ```
//!
//! An element that reaches the gateway after cancellation is dropped without
//! settlement. A terminal signal arriving after cancellation is dropped as well.
//!
//! ## Draining on Outcomes
//!
//! A [`RateLimiter`] can give up the rest of its current cycle when it settles a
//! particular outcome, for example to back off as soon as the upstream reports a failure:
//!
//! ```rust
//! use stream_throttle::{AdmissionPolicy, DrainPolicy, Outcome, RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! let config = RateLimiterConfig::builder()
//!     .limit_for_period(5)
//!     .limit_refresh_period(Duration::from_secs(60))
//!     .drain_on(DrainPolicy::OnFailure)
//!     .build()
//!     .unwrap();
//! let limiter = RateLimiter::new("backend", config).unwrap();
//!
//! AdmissionPolicy::<u32, &str>::settle_outcome(&limiter, Outcome::Success(&1));
//! assert_eq!(limiter.available_permissions(), 5);
//!
//! AdmissionPolicy::<u32, &str>::settle_outcome(&limiter, Outcome::Failure(&"timeout"));
//! assert_eq!(limiter.available_permissions(), 0);
//! ```
//!
//! ## Named Limiters
//!
//! [`RateLimiterRegistry`] hands out one shared limiter per name, creating it from a
//! default configuration on first use:
//!
//! ```rust
//! use stream_throttle::{RateLimiterConfig, RateLimiterRegistry, ShardedStorage, SystemClock};
//! use std::sync::Arc;
//!
//! let registry = RateLimiterRegistry::new(
//!     Arc::new(ShardedStorage::new()),
//!     Arc::new(SystemClock::new()),
//!     RateLimiterConfig::default(),
//! )
//! .unwrap();
//!
//! let a = registry.rate_limiter("payments");
//! let b = registry.rate_limiter("payments");
//! assert!(Arc::ptr_eq(&a, &b));
//! ```
//!
//! ## Observability
//!
//! All diagnostics go through `tracing`; the library never installs a subscriber.
//! Counters are available through [`Metrics`]:
//!
//! ```rust,no_run
//! # use stream_throttle::Metrics;
//! # let metrics = Metrics::new();
//! let snapshot = metrics.snapshot();
//! println!("settled: {}", snapshot.elements_settled);
//! println!("dropped after cancel: {:.2}%", snapshot.drop_rate() * 100.0);
//! println!("rejected subscriptions: {}", snapshot.subscriptions_rejected);
//! ```
//!
//! ## Features
//!
//! - `async`: `RateLimitedStream`, the same gateway for `futures::Stream`s of
//!   `Result<T, E>`, plus async permit acquisition and
//!   `RateLimitedPublisher::subscribe_async`
//! - `test-helpers`: exports `infrastructure::mocks` (manual publisher, recording
//!   subscriber, recording policy, signal log, mock clock, log capture)
//!
//! The integration tests under `tests/` are built on those mocks and declare
//! `test-helpers` (and `async` for the stream tests) as required features, so a
//! plain `cargo test` runs only the unit and doc tests. Run the whole suite with:
//!
//! ```text
//! cargo test --all-features
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    config::{ConfigError, DrainPolicy, RateLimiterConfig, RateLimiterConfigBuilder},
    outcome::{Outcome, OutcomeKind},
    permits::{PermitWindow, Reservation},
};

pub use application::{
    gateway::RateLimitedSubscriber,
    lifecycle::{BaseSubscriber, Lifecycle, LifecycleState, SubscriberHooks},
    limiter::RateLimiter,
    metrics::{Metrics, MetricsSnapshot},
    operator::{RateLimitPublisherExt, RateLimitedPublisher, RequestNotPermitted},
    ports::{AdmissionPolicy, Clock, PermitSource, Publisher, Storage, Subscriber, Subscription},
    registry::RateLimiterRegistry,
};

pub use infrastructure::{clock::SystemClock, storage::ShardedStorage};

#[cfg(feature = "async")]
pub use infrastructure::stream::{CancelHandle, RateLimitExt, RateLimitedStream};
