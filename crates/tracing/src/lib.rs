//! Tracing subscriber used by the txq test suites.
//!
//! The library crates only emit events through [`tracing`] macros; installing a subscriber is up
//! to whoever hosts them. Tests call [`init_test_tracing`] to get the events printed next to the
//! failing test, filtered by `RUST_LOG`:
//!
//! ```
//! txq_tracing::init_test_tracing();
//! tracing::debug!(target: "sync::filter", "visible with RUST_LOG=sync::filter=debug");
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub use tracing;
pub use tracing_subscriber;

pub use test_tracer::TestTracer;

mod test_tracer;

/// Installs a global subscriber.
pub trait Tracer {
    /// Installs the subscriber. A subscriber that is already installed is left in place.
    fn init(self) -> eyre::Result<()>;
}

/// Initializes a tracing subscriber for tests.
///
/// The subscriber will silently fail if it could not be installed.
pub fn init_test_tracing() {
    let _ = TestTracer::default().init();
}
