//! NetworkManager backend driven through nmcli
//!
//! Profile edits and device reapplies go through `nmcli`; the runtime
//! address view comes from the kernel via `ip -json`. NetworkManager only
//! exposes the true applied-connection object over its bus API, so the
//! applied snapshot assembled here is built from runtime observables: the
//! kernel addresses, the presence of a DHCP lease on the device, and the
//! active profile's auto-* settings.

use super::{iproute, Ipv4Backend};
use crate::config::NetstateConfig;
use crate::error::{NetstateError, NetstateResult};
use crate::schema::{Ipv4Address, Ipv4State};
use crate::validation;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

const PROFILE_IPV4_FIELDS: &str = "ipv4.method,ipv4.addresses,ipv4.ignore-auto-dns,ipv4.ignore-auto-routes,ipv4.never-default,ipv4.route-table";

/// Backend driving NetworkManager through its CLI surface.
pub struct NmcliBackend {
    nmcli_bin: PathBuf,
    ip_bin: PathBuf,
}

/// IPv4 section of a connection profile as nmcli reports it.
#[derive(Debug, Clone, PartialEq)]
struct ProfileIpv4 {
    method: String,
    addresses: Vec<Ipv4Address>,
    ignore_auto_dns: bool,
    ignore_auto_routes: bool,
    never_default: bool,
    route_table: u32,
}

impl ProfileIpv4 {
    /// The on-disk view: enabled/dhcp derived from the method, auto-*
    /// flags reported only when DHCP is configured.
    fn to_saved_state(&self) -> Ipv4State {
        let (enabled, dhcp) = match self.method.as_str() {
            "disabled" => (false, false),
            "auto" => (true, true),
            _ => (true, false),
        };

        let mut state = Ipv4State {
            enabled: Some(enabled),
            dhcp: Some(dhcp),
            addresses: Some(self.addresses.clone()),
            ..Default::default()
        };
        if dhcp {
            self.fill_auto_flags(&mut state);
        }
        state
    }

    fn fill_auto_flags(&self, state: &mut Ipv4State) {
        state.auto_dns = Some(!self.ignore_auto_dns);
        state.auto_routes = Some(!self.ignore_auto_routes);
        state.auto_gateway = Some(!self.never_default);
        state.auto_route_table_id = Some(self.route_table);
    }
}

impl NmcliBackend {
    pub fn new() -> Self {
        Self {
            nmcli_bin: PathBuf::from("nmcli"),
            ip_bin: PathBuf::from("ip"),
        }
    }

    pub fn with_paths(nmcli_bin: PathBuf, ip_bin: PathBuf) -> Self {
        Self { nmcli_bin, ip_bin }
    }

    pub fn from_config(config: &NetstateConfig) -> Self {
        Self::with_paths(config.tools.nmcli_bin.clone(), config.tools.ip_bin.clone())
    }

    /// Runs nmcli and captures stdout
    async fn run_nmcli<S: AsRef<str>>(&self, args: &[S]) -> NetstateResult<String> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        let cmd_str = format!("{} {}", self.nmcli_bin.display(), args.join(" "));
        debug!("Running: {}", cmd_str);

        let output = Command::new(&self.nmcli_bin)
            .args(&args)
            .output()
            .await
            .map_err(|e| NetstateError::CommandFailed {
                cmd: cmd_str.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8(output.stderr)
                .unwrap_or_else(|e| String::from_utf8_lossy(&e.into_bytes()).to_string());
            return Err(NetstateError::CommandFailed {
                cmd: cmd_str,
                code: output.status.code(),
                stderr,
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|e| NetstateError::ParseError(format!("Invalid UTF-8 in nmcli output: {}", e)))
    }

    /// Name of the connection profile active on an interface
    async fn active_profile(&self, interface: &str) -> NetstateResult<String> {
        let output = self
            .run_nmcli(&["-t", "-f", "GENERAL.CONNECTION", "device", "show", interface])
            .await
            .map_err(|_| NetstateError::InterfaceNotFound(interface.to_string()))?;

        match parse_terse_field(&output, "GENERAL.CONNECTION") {
            Some(profile) if !profile.is_empty() => Ok(profile),
            _ => Err(NetstateError::ProfileNotFound(interface.to_string())),
        }
    }

    async fn profile_ipv4(&self, profile: &str) -> NetstateResult<ProfileIpv4> {
        let output = self
            .run_nmcli(&["-t", "-f", PROFILE_IPV4_FIELDS, "connection", "show", profile])
            .await?;
        parse_profile_ipv4(&output)
    }

    /// Whether the device currently holds a DHCPv4 lease
    async fn dhcp_lease_present(&self, interface: &str) -> NetstateResult<bool> {
        let output = self
            .run_nmcli(&["-t", "-f", "DHCP4.OPTION", "device", "show", interface])
            .await?;
        Ok(output.lines().any(|line| !line.trim().is_empty()))
    }
}

impl Default for NmcliBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ipv4Backend for NmcliBackend {
    async fn applied_ipv4(&self, interface: &str) -> NetstateResult<Ipv4State> {
        validation::validate_interface_name(interface)?;

        let addresses = iproute::query_ipv4_addresses(&self.ip_bin, interface).await?;
        let dhcp = self.dhcp_lease_present(interface).await?;

        // A saved-only edit must not leak into this snapshot; the profile
        // is consulted only for fields with no runtime observable.
        let profile = match self.active_profile(interface).await {
            Ok(name) => Some(self.profile_ipv4(&name).await?),
            Err(NetstateError::ProfileNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let enabled = !addresses.is_empty()
            || dhcp
            || profile
                .as_ref()
                .map(|p| p.method != "disabled")
                .unwrap_or(false);

        let mut state = Ipv4State {
            enabled: Some(enabled),
            dhcp: Some(dhcp),
            addresses: Some(addresses),
            ..Default::default()
        };

        if dhcp {
            match &profile {
                Some(profile) => profile.fill_auto_flags(&mut state),
                None => {
                    state.auto_dns = Some(true);
                    state.auto_gateway = Some(true);
                    state.auto_routes = Some(true);
                    state.auto_route_table_id = Some(0);
                }
            }
        }

        Ok(state)
    }

    async fn saved_ipv4(&self, interface: &str) -> NetstateResult<Ipv4State> {
        validation::validate_interface_name(interface)?;

        let profile = self.active_profile(interface).await?;
        Ok(self.profile_ipv4(&profile).await?.to_saved_state())
    }

    async fn apply_ipv4(&self, interface: &str, desired: &Ipv4State) -> NetstateResult<()> {
        validation::validate_interface_name(interface)?;
        validation::validate_ipv4_state(desired)?;

        let profile = self.active_profile(interface).await?;

        let mut args: Vec<String> = vec![
            "connection".to_string(),
            "modify".to_string(),
            profile.clone(),
        ];
        args.extend(profile_modify_args(desired));
        self.run_nmcli(&args).await?;

        info!("Reapplying profile '{}' on {}", profile, interface);
        self.run_nmcli(&["device", "reapply", interface]).await?;

        Ok(())
    }
}

/// Extracts one field value from `nmcli -t` output
fn parse_terse_field(output: &str, field: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key == field).then(|| value.trim().to_string())
    })
}

fn parse_terse_bool(value: &str) -> NetstateResult<bool> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(NetstateError::ParseError(format!(
            "Expected yes/no, got '{}'",
            other
        ))),
    }
}

/// Parses the ipv4.* section of `nmcli -t connection show` output
fn parse_profile_ipv4(output: &str) -> NetstateResult<ProfileIpv4> {
    let method = parse_terse_field(output, "ipv4.method")
        .ok_or_else(|| NetstateError::ParseError("ipv4.method missing from profile".to_string()))?;

    let addresses = match parse_terse_field(output, "ipv4.addresses") {
        Some(value) if !value.is_empty() => value
            .split(',')
            .map(|cidr| Ipv4Address::from_cidr(cidr.trim()))
            .collect::<NetstateResult<Vec<_>>>()?,
        _ => Vec::new(),
    };

    let flag = |field: &str| -> NetstateResult<bool> {
        match parse_terse_field(output, field) {
            Some(value) => parse_terse_bool(&value),
            None => Ok(false),
        }
    };

    let route_table = match parse_terse_field(output, "ipv4.route-table") {
        Some(value) if !value.is_empty() => value.parse().map_err(|_| {
            NetstateError::ParseError(format!("Invalid ipv4.route-table: {}", value))
        })?,
        _ => 0,
    };

    Ok(ProfileIpv4 {
        method,
        addresses,
        ignore_auto_dns: flag("ipv4.ignore-auto-dns")?,
        ignore_auto_routes: flag("ipv4.ignore-auto-routes")?,
        never_default: flag("ipv4.never-default")?,
        route_table,
    })
}

/// Renders a desired IPv4 state into `nmcli connection modify` arguments
fn profile_modify_args(desired: &Ipv4State) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut push = |key: &str, value: &str| {
        args.push(key.to_string());
        args.push(value.to_string());
    };

    let addresses = desired.addresses.as_deref().unwrap_or(&[]);
    let address_list = addresses
        .iter()
        .map(Ipv4Address::to_cidr)
        .collect::<Vec<_>>()
        .join(",");

    let enabled = desired.enabled.unwrap_or(true);
    let dhcp = desired.dhcp.unwrap_or(false);

    if !enabled {
        push("ipv4.method", "disabled");
        push("ipv4.addresses", "");
    } else if dhcp {
        push("ipv4.method", "auto");
        push("ipv4.addresses", &address_list);
    } else if !addresses.is_empty() {
        push("ipv4.method", "manual");
        push("ipv4.addresses", &address_list);
    } else {
        // No DHCP and nothing static to assign
        push("ipv4.method", "disabled");
        push("ipv4.addresses", "");
    }

    if let Some(auto_dns) = desired.auto_dns {
        push("ipv4.ignore-auto-dns", if auto_dns { "no" } else { "yes" });
    }
    if let Some(auto_routes) = desired.auto_routes {
        push("ipv4.ignore-auto-routes", if auto_routes { "no" } else { "yes" });
    }
    if let Some(auto_gateway) = desired.auto_gateway {
        push("ipv4.never-default", if auto_gateway { "no" } else { "yes" });
    }
    if let Some(table_id) = desired.auto_route_table_id {
        push("ipv4.route-table", &table_id.to_string());
    }

    args
}
