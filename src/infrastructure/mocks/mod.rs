//! Mock implementations for testing.
//!
//! This module provides test doubles for both ends of a subscription and for
//! infrastructure adapters, enabling controlled testing of the gateway.

pub mod clock;
pub mod layer;
pub mod policy;
pub mod publisher;
pub mod signal;
pub mod subscriber;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use policy::RecordingPolicy;
pub use publisher::{TestPublisher, TestSubscription};
pub use signal::Signal;
pub use subscriber::RecordingSubscriber;
