//! Convergence verification against applied configuration
//!
//! Binds a backend snapshot refresh and the subset matcher to a fixed
//! expected state, then polls until the applied configuration contains
//! the expectation or the retry budget runs out.

use crate::backend::Ipv4Backend;
use crate::error::{NetstateError, NetstateResult};
use crate::retry::{retry_until_true_or_timeout, RetryBudget};
use crate::schema::Ipv4State;
use crate::state::{self, StateMap};
use tracing::{debug, trace};

/// Polls applied-configuration snapshots until they contain an expected
/// partial state.
pub struct ConvergenceVerifier<'a, B: Ipv4Backend> {
    backend: &'a B,
    budget: RetryBudget,
}

impl<'a, B: Ipv4Backend> ConvergenceVerifier<'a, B> {
    pub fn new(backend: &'a B, budget: RetryBudget) -> Self {
        Self { backend, budget }
    }

    /// Waits until the applied IPv4 state of `interface` contains
    /// `expected`.
    ///
    /// Each poll reads a fresh snapshot; the verification polls the
    /// applied view only, since the saved profile changes synchronously
    /// with a modify and would report convergence before the daemon
    /// applied anything. Snapshot errors abort the wait immediately.
    pub async fn wait_ipv4(&self, interface: &str, expected: &StateMap) -> NetstateResult<()> {
        debug!(
            "Waiting up to {:.1}s for {} to reach {}",
            self.budget.timeout().as_secs_f64(),
            interface,
            serde_json::to_string(expected).unwrap_or_default()
        );

        let backend = self.backend;
        let converged = retry_until_true_or_timeout(self.budget, move || async move {
            let snapshot = backend.applied_ipv4(interface).await?;
            let observed = snapshot.to_state_map();
            let matched = state::is_subset(&observed, expected);
            if !matched {
                trace!(
                    "Not converged yet on {}: {}",
                    interface,
                    serde_json::to_string(&observed).unwrap_or_default()
                );
            }
            Ok(matched)
        })
        .await?;

        if converged {
            Ok(())
        } else {
            Err(NetstateError::VerificationFailed {
                interface: interface.to_string(),
                waited: self.budget.timeout(),
            })
        }
    }

    /// Typed convenience over [`ConvergenceVerifier::wait_ipv4`]: only the
    /// fields present in `expected` are asserted.
    pub async fn wait_ipv4_state(
        &self,
        interface: &str,
        expected: &Ipv4State,
    ) -> NetstateResult<()> {
        self.wait_ipv4(interface, &expected.to_state_map()).await
    }
}
