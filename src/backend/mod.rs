//! Configuration snapshot and change-apply backends
//!
//! The daemon owns the configuration; this crate only reads snapshots of
//! it and submits change requests. [`Ipv4Backend`] is the seam between the
//! reconciliation logic and whatever actually talks to the system — the
//! production implementation drives `nmcli` and `ip`, tests substitute
//! scripted states.

use crate::error::NetstateResult;
use crate::schema::Ipv4State;
use async_trait::async_trait;

mod iproute;
mod nmcli;

pub use iproute::list_interfaces;
pub use nmcli::NmcliBackend;

/// Reads IPv4 configuration snapshots and submits changes for one
/// interface at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ipv4Backend: Send + Sync {
    /// Reads the configuration currently in effect at runtime.
    ///
    /// Produces a fresh snapshot on every call; the returned value is
    /// never cached by the caller across polls.
    async fn applied_ipv4(&self, interface: &str) -> NetstateResult<Ipv4State>;

    /// Reads the configuration persisted in the daemon profile on disk.
    ///
    /// This can diverge from [`Ipv4Backend::applied_ipv4`] after a profile
    /// edit that has not been reapplied to the device.
    async fn saved_ipv4(&self, interface: &str) -> NetstateResult<Ipv4State>;

    /// Submits an asynchronous IPv4 reconfiguration.
    ///
    /// Returns once the change request has been accepted by the daemon,
    /// not necessarily once it has taken effect.
    async fn apply_ipv4(&self, interface: &str, desired: &Ipv4State) -> NetstateResult<()>;
}
