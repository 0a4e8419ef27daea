//! netstate - Declarative Network State Library
//!
//! Async library for declarative IPv4 interface configuration driven
//! through NetworkManager:
//! - Desired-state documents (interfaces, IPv4 settings)
//! - Snapshot reads of applied and saved configuration
//! - Asynchronous change submission via nmcli
//! - Convergence verification by bounded polling with subset matching
//! - Link stability watching during changes
//!
//! The daemon owns the configuration model; this crate reconciles against
//! it and verifies the outcome.

pub mod error;
pub mod validation;
pub mod config;
pub mod state;
pub mod schema;
pub mod retry;
pub mod backend;
pub mod verify;
pub mod apply;
pub mod monitor;

// Re-export commonly used types
pub use error::{NetstateError, NetstateResult};
pub use config::NetstateConfig;
pub use state::{is_subset, StateMap, StateValue};
pub use schema::{Ipv4Address, Ipv4State, InterfaceState, NetworkState};
pub use retry::{retry_until_true_or_timeout, RetryBudget};
pub use backend::{Ipv4Backend, NmcliBackend};
pub use verify::ConvergenceVerifier;
pub use apply::{ApplyOptions, ApplyReport, InterfaceOutcome, NetstateManager};
pub use monitor::{LinkReport, LinkWatch};
