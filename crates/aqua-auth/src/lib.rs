//! # aqua-auth
//!
//! Credential handling for the aqua console.
//!
//! - [`store`]: persisted, obfuscated access/renewal credential pair with
//!   cross-process change notification
//! - [`renewal`]: exchanges the renewal credential for a fresh pair
//! - [`interceptor`]: authenticated REST calls with one renew-and-retry
//!
//! All three share one [`CredentialStore`] handle. The store is the only
//! state mutated by more than one component, and every renewal replaces the
//! whole pair at once.

#![deny(unsafe_code)]

pub mod errors;
pub mod interceptor;
pub mod renewal;
pub mod store;
pub mod types;

pub use errors::{ApiError, AuthError, RenewalError};
pub use interceptor::{ApiCall, AuthenticatedClient};
pub use renewal::{Renewer, SessionRenewal};
pub use store::CredentialStore;
pub use types::{CredentialChange, CredentialKind, CredentialPair, SessionSignal};
