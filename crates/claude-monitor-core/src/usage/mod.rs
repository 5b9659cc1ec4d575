//! Usage monitoring — fetch claude.ai usage and serve it through a single-flight cache.
//!
//! The upstream is reached through [`UsageSource`]; [`FetchCoordinator`] keeps
//! a short-lived cache in front of it and ensures at most one fetch runs at a
//! time.

pub mod coordinator;
pub mod error;
pub mod normalizer;
pub mod reset;
pub mod source;
pub mod types;

pub use coordinator::{fetch_once, CoordinatorConfig, FetchCoordinator};
pub use error::FetchError;
pub use normalizer::{normalize, select_organization};
pub use reset::format_resets_in;
pub use source::{ClaudeWebClient, ClientConfig, UsageSource};
pub use types::{Organization, RawUsage, RawWindow, UsageSnapshot, UsageWindow};
