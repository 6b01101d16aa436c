pub mod credentials;
pub mod fetchers;
pub mod filter;
pub mod listener;
pub mod persist;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
#[cfg(feature = "test-utils")]
pub mod testutil;
pub mod watermark;

pub use listener::{Listener, PlatformPhase, PlatformReport, RunSummary};
