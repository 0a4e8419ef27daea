//! Scenario driver - applies desired state and verifies convergence
//!
//! Orchestrates one reconciliation run: validate the desired document,
//! optionally watch link stability, submit each interface change through
//! the backend, then poll the applied configuration until it contains the
//! desired state.

use crate::backend::{self, Ipv4Backend, NmcliBackend};
use crate::config::NetstateConfig;
use crate::error::{NetstateError, NetstateResult};
use crate::monitor::LinkWatch;
use crate::retry::RetryBudget;
use crate::schema::{InterfaceState, Ipv4State, NetworkState};
use crate::validation;
use crate::verify::ConvergenceVerifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Options for one apply run.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Verify convergence after submitting each change
    pub verify: bool,
    /// Retry budget for verification
    pub budget: RetryBudget,
    /// Fail if a watched link goes down while the change is applied
    pub watch_link: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            verify: true,
            budget: NetstateConfig::default().retry_budget(),
            watch_link: true,
        }
    }
}

/// Outcome of one interface within an apply run.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceOutcome {
    pub interface: String,
    pub converged: bool,
    pub link_down_transitions: u32,
}

/// Result of a whole apply run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub interfaces: Vec<InterfaceOutcome>,
}

/// Declarative state manager over an IPv4 backend.
pub struct NetstateManager<B: Ipv4Backend> {
    backend: B,
}

impl NetstateManager<NmcliBackend> {
    /// Manager driving the host's NetworkManager through nmcli.
    pub fn with_system_backend(config: &NetstateConfig) -> Self {
        Self::new(NmcliBackend::from_config(config))
    }
}

impl<B: Ipv4Backend> NetstateManager<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// List all network interfaces known to the kernel
    pub async fn list(&self) -> NetstateResult<Vec<String>> {
        backend::list_interfaces().await
    }

    /// Reads the state of one interface (applied or saved view).
    pub async fn show(&self, interface: &str, saved: bool) -> NetstateResult<InterfaceState> {
        validation::validate_interface_name(interface)?;

        let ipv4 = if saved {
            self.backend.saved_ipv4(interface).await?
        } else {
            self.backend.applied_ipv4(interface).await?
        };

        Ok(InterfaceState {
            name: interface.to_string(),
            ipv4: Some(ipv4),
        })
    }

    /// Applies a desired state document.
    ///
    /// Interfaces are processed sequentially. With verification enabled a
    /// non-converging interface aborts the run with
    /// [`NetstateError::VerificationFailed`]; with link watching enabled
    /// any down transition during the change does the same.
    pub async fn apply(
        &self,
        desired: &NetworkState,
        options: &ApplyOptions,
    ) -> NetstateResult<ApplyReport> {
        // Validate everything before touching the first interface
        for iface in &desired.interfaces {
            validation::validate_interface_name(&iface.name)?;
            if let Some(ipv4) = &iface.ipv4 {
                validation::validate_ipv4_state(ipv4)?;
            }
        }

        let started_at = Utc::now();
        let mut outcomes = Vec::new();

        for iface in &desired.interfaces {
            let ipv4 = match &iface.ipv4 {
                Some(ipv4) => ipv4,
                None => {
                    info!("No IPv4 state given for {}, skipping", iface.name);
                    continue;
                }
            };

            let watch = if options.watch_link {
                match LinkWatch::start(&iface.name).await {
                    Ok(watch) => Some(watch),
                    Err(e) => {
                        warn!("Link watch unavailable for {}: {}", iface.name, e);
                        None
                    }
                }
            } else {
                None
            };

            // Stop the watch on every path before surfacing any error
            let result = self.submit_and_verify(&iface.name, ipv4, options).await;
            let link_down_transitions = match watch {
                Some(watch) => watch.stop().await.down_transitions,
                None => 0,
            };
            let converged = result?;

            if link_down_transitions > 0 {
                return Err(NetstateError::InvalidState(format!(
                    "Link on {} went down {} time(s) during apply",
                    iface.name, link_down_transitions
                )));
            }

            outcomes.push(InterfaceOutcome {
                interface: iface.name.clone(),
                converged,
                link_down_transitions,
            });
        }

        Ok(ApplyReport {
            started_at,
            finished_at: Utc::now(),
            interfaces: outcomes,
        })
    }

    async fn submit_and_verify(
        &self,
        interface: &str,
        ipv4: &Ipv4State,
        options: &ApplyOptions,
    ) -> NetstateResult<bool> {
        info!("Submitting IPv4 change for {}", interface);
        self.backend.apply_ipv4(interface, ipv4).await?;

        if options.verify {
            let verifier = ConvergenceVerifier::new(&self.backend, options.budget);
            verifier.wait_ipv4_state(interface, ipv4).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Checks convergence of a desired state document without modifying
    /// anything.
    pub async fn verify(&self, desired: &NetworkState, budget: RetryBudget) -> NetstateResult<()> {
        let verifier = ConvergenceVerifier::new(&self.backend, budget);
        for iface in &desired.interfaces {
            validation::validate_interface_name(&iface.name)?;
            if let Some(ipv4) = &iface.ipv4 {
                verifier.wait_ipv4_state(&iface.name, ipv4).await?;
            }
        }
        Ok(())
    }
}
