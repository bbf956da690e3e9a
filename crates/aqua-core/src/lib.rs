//! # aqua-core
//!
//! Shared building blocks for the aqua console crates:
//!
//! - [`backoff`]: reconnect delay policy (exponential, capped)
//! - [`logging`]: `tracing` subscriber bootstrap and test log capture

#![deny(unsafe_code)]

pub mod backoff;
pub mod logging;

pub use backoff::{BackoffPolicy, reconnect_delay};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delay_for(1),
            reconnect_delay(1, policy.base_delay_ms, policy.max_delay_ms)
        );
    }
}
