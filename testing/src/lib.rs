//! # CRM Projections Testing
//!
//! In-memory doubles for every port of the projection pipeline.
//!
//! This crate provides:
//! - [`InMemoryGraphRepository`]: MERGE-semantics graph in a `HashMap`
//! - [`ScriptedBroker`]: persistent subscription group fed by the test
//! - [`RecordingCommandClient`], [`RecordingNotifier`], [`InMemorySyncRunStore`]
//! - [`FixedClock`] and event builders
//!
//! ## Example
//!
//! ```ignore
//! use crm_projections_testing::{builders, InMemoryGraphRepository, ScriptedBroker};
//!
//! #[tokio::test]
//! async fn user_is_projected() {
//!     let graph = InMemoryGraphRepository::new();
//!     let broker = ScriptedBroker::new("events");
//!     broker.publish(builders::event(EventKind::UserCreate, "acme", "u1", json!({"name": "Ada"})));
//!     // run the subscriber against `broker`, then inspect `graph`
//! }
//! ```

use chrono::{DateTime, Utc};
use crm_projections_core::environment::Clock;

pub mod builders;
pub mod graph;
pub mod recording;
pub mod subscription;

/// Mock implementations of injected dependencies.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use crm_projections_testing::mocks::FixedClock;
    /// use crm_projections_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use graph::InMemoryGraphRepository;
pub use mocks::{FixedClock, test_clock};
pub use recording::{InMemorySyncRunStore, RecordingCommandClient, RecordingNotifier};
pub use subscription::{ScriptedBroker, ScriptedSubscription};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
