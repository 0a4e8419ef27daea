//! State convergence integration tests
//!
//! Drives the manager end-to-end against an in-memory backend that
//! emulates the daemon's asynchronous behavior: a submitted change only
//! becomes visible in the applied snapshot after a configurable number of
//! polls, and the saved profile can drift from the applied state the way
//! it does after a profile edit without a reapply.

use async_trait::async_trait;
use libnetstate::{
    ApplyOptions, InterfaceState, Ipv4Address, Ipv4Backend, Ipv4State, NetstateError,
    NetstateManager, NetstateResult, NetworkState, RetryBudget,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// State shared between a test and its backend.
#[derive(Clone)]
struct DaemonState {
    applied: Arc<Mutex<Ipv4State>>,
    saved: Arc<Mutex<Ipv4State>>,
    /// Submitted change plus the number of polls before it lands
    pending: Arc<Mutex<Option<(Ipv4State, u32)>>>,
    apply_calls: Arc<AtomicU32>,
}

impl DaemonState {
    fn new(initial: Ipv4State) -> Self {
        Self {
            applied: Arc::new(Mutex::new(initial.clone())),
            saved: Arc::new(Mutex::new(initial)),
            pending: Arc::new(Mutex::new(None)),
            apply_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Edits the saved profile without touching the applied state, like a
    /// profile modify without a device reapply.
    fn drift_saved(&self, state: Ipv4State) {
        *self.saved.lock().unwrap() = state;
    }
}

/// Backend emulating a daemon that settles changes asynchronously.
struct ScriptedBackend {
    daemon: DaemonState,
    /// How many applied-state polls a change stays invisible for
    settle_after: u32,
}

/// What the daemon would actually put in effect for a desired state:
/// DHCP brings the auto-* flags and the main route table with it.
fn settled_state(desired: &Ipv4State) -> Ipv4State {
    let mut state = desired.clone();
    if state.dhcp == Some(true) {
        state.auto_dns.get_or_insert(true);
        state.auto_gateway.get_or_insert(true);
        state.auto_routes.get_or_insert(true);
        state.auto_route_table_id.get_or_insert(0);
    }
    state
}

#[async_trait]
impl Ipv4Backend for ScriptedBackend {
    async fn applied_ipv4(&self, interface: &str) -> NetstateResult<Ipv4State> {
        if interface == "missing0" {
            return Err(NetstateError::InterfaceNotFound(interface.to_string()));
        }

        let mut pending = self.daemon.pending.lock().unwrap();
        if let Some((state, remaining)) = pending.take() {
            if remaining == 0 {
                *self.daemon.applied.lock().unwrap() = state;
            } else {
                *pending = Some((state, remaining - 1));
            }
        }
        drop(pending);

        Ok(self.daemon.applied.lock().unwrap().clone())
    }

    async fn saved_ipv4(&self, _interface: &str) -> NetstateResult<Ipv4State> {
        Ok(self.daemon.saved.lock().unwrap().clone())
    }

    async fn apply_ipv4(&self, _interface: &str, desired: &Ipv4State) -> NetstateResult<()> {
        self.daemon.apply_calls.fetch_add(1, Ordering::SeqCst);
        let settled = settled_state(desired);
        *self.daemon.saved.lock().unwrap() = settled.clone();
        *self.daemon.pending.lock().unwrap() = Some((settled, self.settle_after));
        Ok(())
    }
}

// Roomy budget so converging scenarios never hit it on a slow runner
fn quick_options() -> ApplyOptions {
    ApplyOptions {
        verify: true,
        budget: RetryBudget::from_secs(10).with_interval(Duration::from_millis(10)),
        watch_link: false,
    }
}

fn static_ipv4() -> Ipv4State {
    Ipv4State::static_addresses(vec![Ipv4Address::new("192.0.2.251", 24)])
}

fn desired_doc(ipv4: Ipv4State) -> NetworkState {
    NetworkState {
        interfaces: vec![InterfaceState {
            name: "eth1".to_string(),
            ipv4: Some(ipv4),
        }],
    }
}

#[tokio::test]
async fn test_static_address_change_converges() {
    let daemon = DaemonState::new(Ipv4State::dhcp());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon: daemon.clone(),
        settle_after: 2,
    });

    let report = manager
        .apply(&desired_doc(static_ipv4()), &quick_options())
        .await
        .unwrap();

    assert_eq!(report.interfaces.len(), 1);
    assert_eq!(report.interfaces[0].interface, "eth1");
    assert!(report.interfaces[0].converged);
    assert_eq!(daemon.apply_calls.load(Ordering::SeqCst), 1);
    assert!(report.finished_at >= report.started_at);

    let shown = manager.show("eth1", false).await.unwrap();
    assert_eq!(shown.ipv4.unwrap(), static_ipv4());
}

#[tokio::test]
async fn test_dhcp_enable_converges_with_auto_defaults() {
    let daemon = DaemonState::new(static_ipv4());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon,
        settle_after: 1,
    });

    // The desired document does not mention the auto-* flags; the settled
    // snapshot carries them and must still contain the desired subset.
    manager
        .apply(&desired_doc(Ipv4State::dhcp()), &quick_options())
        .await
        .unwrap();

    let shown = manager.show("eth1", false).await.unwrap().ipv4.unwrap();
    assert_eq!(shown.dhcp, Some(true));
    assert_eq!(shown.auto_dns, Some(true));
    assert_eq!(shown.auto_gateway, Some(true));
    assert_eq!(shown.auto_routes, Some(true));
    assert_eq!(shown.auto_route_table_id, Some(0));

    // A stricter expectation including the defaults also verifies
    let expected = Ipv4State {
        enabled: Some(true),
        dhcp: Some(true),
        addresses: Some(Vec::new()),
        auto_dns: Some(true),
        auto_gateway: Some(true),
        auto_routes: Some(true),
        auto_route_table_id: Some(0),
    };
    manager
        .verify(
            &desired_doc(expected),
            RetryBudget::new(Duration::from_millis(200)).with_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_never_settling_change_times_out() {
    let daemon = DaemonState::new(Ipv4State::dhcp());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon: daemon.clone(),
        settle_after: u32::MAX,
    });

    let mut options = quick_options();
    options.budget =
        RetryBudget::new(Duration::from_millis(500)).with_interval(Duration::from_millis(10));

    let err = manager
        .apply(&desired_doc(static_ipv4()), &options)
        .await
        .unwrap_err();

    match err {
        NetstateError::VerificationFailed { interface, waited } => {
            assert_eq!(interface, "eth1");
            assert_eq!(waited, Duration::from_millis(500));
        }
        other => panic!("Unexpected error: {}", other),
    }
    // The change was submitted exactly once; only the polls repeated
    assert_eq!(daemon.apply_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_verify_skips_polling() {
    let daemon = DaemonState::new(Ipv4State::dhcp());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon: daemon.clone(),
        settle_after: u32::MAX,
    });

    let mut options = quick_options();
    options.verify = false;

    let report = manager
        .apply(&desired_doc(static_ipv4()), &options)
        .await
        .unwrap();

    assert!(!report.interfaces[0].converged);
    assert_eq!(daemon.apply_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_saved_drift_does_not_affect_applied_view() {
    let daemon = DaemonState::new(static_ipv4());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon: daemon.clone(),
        settle_after: 0,
    });

    // Saved profile flips to DHCP on disk, nothing reapplied
    daemon.drift_saved(Ipv4State::dhcp());

    let applied = manager.show("eth1", false).await.unwrap().ipv4.unwrap();
    let saved = manager.show("eth1", true).await.unwrap().ipv4.unwrap();
    assert_eq!(applied, static_ipv4());
    assert_eq!(saved, Ipv4State::dhcp());

    // The previously applied state still verifies against the applied view
    manager
        .verify(
            &desired_doc(static_ipv4()),
            RetryBudget::new(Duration::from_millis(200)).with_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_snapshot_error_surfaces_as_refresh_failure() {
    let daemon = DaemonState::new(static_ipv4());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon,
        settle_after: 0,
    });

    let desired = NetworkState {
        interfaces: vec![InterfaceState {
            name: "missing0".to_string(),
            ipv4: Some(static_ipv4()),
        }],
    };

    let err = manager.apply(&desired, &quick_options()).await.unwrap_err();
    assert!(matches!(err, NetstateError::InterfaceNotFound(_)));
}

#[tokio::test]
async fn test_invalid_desired_state_rejected_before_any_change() {
    let daemon = DaemonState::new(static_ipv4());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon: daemon.clone(),
        settle_after: 0,
    });

    let desired = desired_doc(Ipv4State::static_addresses(vec![Ipv4Address::new(
        "192.0.2.999",
        24,
    )]));

    let err = manager.apply(&desired, &quick_options()).await.unwrap_err();
    assert!(matches!(err, NetstateError::InvalidParameter(_)));
    assert_eq!(daemon.apply_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_interface_without_ipv4_is_skipped() {
    let daemon = DaemonState::new(static_ipv4());
    let manager = NetstateManager::new(ScriptedBackend {
        daemon: daemon.clone(),
        settle_after: 0,
    });

    let desired = NetworkState {
        interfaces: vec![InterfaceState {
            name: "eth1".to_string(),
            ipv4: None,
        }],
    };

    let report = manager.apply(&desired, &quick_options()).await.unwrap();
    assert!(report.interfaces.is_empty());
    assert_eq!(daemon.apply_calls.load(Ordering::SeqCst), 0);
}
