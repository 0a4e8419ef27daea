//! Link stability watching during configuration changes
//!
//! An IPv4 reconfiguration must not bounce the link. [`LinkWatch`] listens
//! to rtnetlink link events for one interface over the window of an apply
//! and counts transitions to down; the scenario driver fails the run if
//! any occurred.

use crate::error::{NetstateError, NetstateResult};
use crate::validation;
use futures::stream::TryStreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a watch observed between start and stop.
#[derive(Debug, Clone)]
pub struct LinkReport {
    /// Interface name
    pub interface: String,
    /// Up-to-down transitions observed during the watch window
    pub down_transitions: u32,
}

/// Watches one interface's link state over a bounded window.
pub struct LinkWatch {
    interface: String,
    running: Arc<RwLock<bool>>,
    down_transitions: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl LinkWatch {
    /// Starts watching an interface.
    ///
    /// The interface must exist and its initial oper-state is captured
    /// before any event is processed, so a flap between start and the
    /// first event is still seen as a transition.
    pub async fn start(interface: &str) -> NetstateResult<Self> {
        validation::validate_interface_name(interface)?;

        let initially_up = query_initial_state(interface).await?;
        debug!(
            "Link watch on {} starting ({})",
            interface,
            if initially_up { "up" } else { "down" }
        );

        let socket = open_link_event_socket()?;
        let async_fd = tokio::io::unix::AsyncFd::new(socket)
            .map_err(|e| NetstateError::NotSupported(format!("Failed to create async fd: {}", e)))?;

        let running = Arc::new(RwLock::new(true));
        let down_transitions = Arc::new(AtomicU32::new(0));

        let task = tokio::spawn(watch_loop(
            async_fd,
            interface.to_string(),
            initially_up,
            running.clone(),
            down_transitions.clone(),
        ));

        Ok(Self {
            interface: interface.to_string(),
            running,
            down_transitions,
            task,
        })
    }

    /// Stops the watch and reports what it saw.
    pub async fn stop(self) -> LinkReport {
        *self.running.write().await = false;
        let _ = self.task.await;

        let down_transitions = self.down_transitions.load(Ordering::SeqCst);
        if down_transitions > 0 {
            warn!(
                "Link on {} went down {} time(s) while watched",
                self.interface, down_transitions
            );
        }
        LinkReport {
            interface: self.interface,
            down_transitions,
        }
    }
}

/// Queries the current oper-state of an interface via rtnetlink.
async fn query_initial_state(interface: &str) -> NetstateResult<bool> {
    let (connection, handle, _) = rtnetlink::new_connection().map_err(|e| {
        NetstateError::NotSupported(format!("Failed to create rtnetlink connection: {}", e))
    })?;
    tokio::spawn(connection);

    let mut links = handle
        .link()
        .get()
        .match_name(interface.to_string())
        .execute();
    match links.try_next().await {
        Ok(Some(link)) => Ok(extract_operstate(&link)),
        _ => Err(NetstateError::InterfaceNotFound(interface.to_string())),
    }
}

/// Opens a non-blocking netlink socket subscribed to link events.
fn open_link_event_socket() -> NetstateResult<netlink_sys::Socket> {
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

    let mut socket = Socket::new(NETLINK_ROUTE)
        .map_err(|e| NetstateError::NotSupported(format!("Failed to create netlink socket: {}", e)))?;

    let kernel_addr = SocketAddr::new(0, 0);
    socket
        .bind(&kernel_addr)
        .map_err(|e| NetstateError::NotSupported(format!("Failed to bind netlink socket: {}", e)))?;

    // RTNLGRP_LINK multicast group
    const RTNLGRP_LINK: u32 = 1;
    socket
        .add_membership(RTNLGRP_LINK)
        .map_err(|e| NetstateError::NotSupported(format!("Failed to join RTNLGRP_LINK: {}", e)))?;

    socket
        .set_non_blocking(true)
        .map_err(|e| NetstateError::NotSupported(format!("Failed to set non-blocking: {}", e)))?;

    Ok(socket)
}

async fn watch_loop(
    async_fd: tokio::io::unix::AsyncFd<netlink_sys::Socket>,
    interface: String,
    mut link_up: bool,
    running: Arc<RwLock<bool>>,
    down_transitions: Arc<AtomicU32>,
) {
    let mut buf = vec![0u8; 16384];

    while *running.read().await {
        // Wake at least once a second to check the running flag
        let mut guard = match tokio::time::timeout(
            tokio::time::Duration::from_secs(1),
            async_fd.readable(),
        )
        .await
        {
            Ok(Ok(guard)) => guard,
            Ok(Err(e)) => {
                warn!("Link watch fd error on {}: {}", interface, e);
                continue;
            }
            Err(_) => {
                continue;
            }
        };

        match guard.get_inner().recv(&mut buf, 0) {
            Ok(len) if len > 0 => {
                for is_up in link_events_for(&buf[..len], &interface) {
                    if link_up && !is_up {
                        info!("Link on {} went down", interface);
                        down_transitions.fetch_add(1, Ordering::SeqCst);
                    }
                    link_up = is_up;
                }
            }
            Ok(_) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("Error receiving netlink message: {}", e);
            }
        }

        guard.clear_ready();
    }
}

/// Extracts the oper-states announced for one interface from a batch of
/// raw netlink messages.
fn link_events_for(data: &[u8], interface: &str) -> Vec<bool> {
    use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
    use netlink_packet_route::RouteNetlinkMessage;

    let mut states = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let msg: NetlinkMessage<RouteNetlinkMessage> =
            match NetlinkMessage::deserialize(&data[offset..]) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("Failed to parse netlink message: {}", e);
                    break;
                }
            };

        let msg_len = msg.header.length as usize;
        if msg_len == 0 {
            break;
        }

        if let NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(link)) = msg.payload {
            if extract_interface_name(&link).as_deref() == Some(interface) {
                states.push(extract_operstate(&link));
            }
        }

        offset += msg_len;
    }

    states
}

/// Extract interface name from a LinkMessage
fn extract_interface_name(link: &netlink_packet_route::link::LinkMessage) -> Option<String> {
    use netlink_packet_route::link::LinkAttribute;
    link.attributes.iter().find_map(|attr| {
        if let LinkAttribute::IfName(name) = attr {
            Some(name.clone())
        } else {
            None
        }
    })
}

/// Extract operstate from a LinkMessage - returns true if up
fn extract_operstate(link: &netlink_packet_route::link::LinkMessage) -> bool {
    use netlink_packet_route::link::{LinkAttribute, LinkFlags, State};

    // First check operstate attribute
    for attr in &link.attributes {
        if let LinkAttribute::OperState(state) = attr {
            return *state == State::Up;
        }
    }

    // Fallback: check IFF_UP and IFF_RUNNING flags
    let flags = link.header.flags;
    flags.contains(LinkFlags::Up) && flags.contains(LinkFlags::Running)
}
