//! Typed desired/observed network state
//!
//! The document schema accepted by `netstatectl apply` and produced by
//! snapshot reads. Every IPv4 field is optional so the same type serves
//! both as a full snapshot and as a partial expected state: only the
//! fields a caller sets are serialized, rendered into a [`StateMap`], and
//! therefore asserted during verification.

use crate::error::{NetstateError, NetstateResult};
use crate::state::{StateMap, StateValue};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level desired state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub interfaces: Vec<InterfaceState>,
}

/// State of a single interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceState {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4State>,
}

/// IPv4 configuration of one interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ipv4State {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
    #[serde(rename = "address", skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Ipv4Address>>,
    #[serde(rename = "auto-dns", skip_serializing_if = "Option::is_none")]
    pub auto_dns: Option<bool>,
    #[serde(rename = "auto-gateway", skip_serializing_if = "Option::is_none")]
    pub auto_gateway: Option<bool>,
    #[serde(rename = "auto-routes", skip_serializing_if = "Option::is_none")]
    pub auto_routes: Option<bool>,
    #[serde(rename = "auto-route-table-id", skip_serializing_if = "Option::is_none")]
    pub auto_route_table_id: Option<u32>,
}

/// A static IPv4 address with prefix length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ipv4Address {
    pub ip: String,
    #[serde(rename = "prefix-length")]
    pub prefix_length: u8,
}

impl Ipv4Address {
    pub fn new(ip: impl Into<String>, prefix_length: u8) -> Self {
        Self {
            ip: ip.into(),
            prefix_length,
        }
    }

    /// Formats as CIDR notation (e.g., "192.0.2.251/24")
    pub fn to_cidr(&self) -> String {
        format!("{}/{}", self.ip, self.prefix_length)
    }

    /// Parses CIDR notation ("192.0.2.251/24")
    pub fn from_cidr(s: &str) -> NetstateResult<Self> {
        let (ip, prefix) = s
            .split_once('/')
            .ok_or_else(|| NetstateError::ParseError(format!("Not CIDR notation: {}", s)))?;
        let prefix_length: u8 = prefix
            .parse()
            .map_err(|_| NetstateError::ParseError(format!("Invalid prefix length: {}", prefix)))?;
        Ok(Self::new(ip.trim(), prefix_length))
    }

    fn to_state_value(&self) -> StateValue {
        let mut map = StateMap::new();
        map.insert("ip".to_string(), self.ip.as_str().into());
        map.insert(
            "prefix-length".to_string(),
            StateValue::Int(i64::from(self.prefix_length)),
        );
        StateValue::Map(map)
    }
}

impl Ipv4State {
    /// Renders the present fields into a dynamic state map.
    ///
    /// Unset fields produce no key, so the result of a partial state is a
    /// partial map suitable as an expected state for subset matching.
    pub fn to_state_map(&self) -> StateMap {
        let mut map = StateMap::new();
        if let Some(enabled) = self.enabled {
            map.insert("enabled".to_string(), enabled.into());
        }
        if let Some(dhcp) = self.dhcp {
            map.insert("dhcp".to_string(), dhcp.into());
        }
        if let Some(addresses) = &self.addresses {
            map.insert(
                "address".to_string(),
                StateValue::List(addresses.iter().map(Ipv4Address::to_state_value).collect()),
            );
        }
        if let Some(auto_dns) = self.auto_dns {
            map.insert("auto-dns".to_string(), auto_dns.into());
        }
        if let Some(auto_gateway) = self.auto_gateway {
            map.insert("auto-gateway".to_string(), auto_gateway.into());
        }
        if let Some(auto_routes) = self.auto_routes {
            map.insert("auto-routes".to_string(), auto_routes.into());
        }
        if let Some(table_id) = self.auto_route_table_id {
            map.insert("auto-route-table-id".to_string(), table_id.into());
        }
        map
    }

    /// A fully disabled IPv4 configuration.
    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            dhcp: Some(false),
            addresses: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Static configuration with the given addresses.
    pub fn static_addresses(addresses: Vec<Ipv4Address>) -> Self {
        Self {
            enabled: Some(true),
            dhcp: Some(false),
            addresses: Some(addresses),
            ..Default::default()
        }
    }

    /// DHCP configuration with no static addresses.
    pub fn dhcp() -> Self {
        Self {
            enabled: Some(true),
            dhcp: Some(true),
            addresses: Some(Vec::new()),
            ..Default::default()
        }
    }
}

impl NetworkState {
    /// Parses a desired state document from JSON text.
    pub fn from_json(json: &str) -> NetstateResult<Self> {
        serde_json::from_str(json).map_err(NetstateError::from)
    }

    /// Loads a desired state document from a JSON file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> NetstateResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            NetstateError::ConfigError(format!(
                "Failed to read state file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Finds the entry for an interface, if present.
    pub fn interface(&self, name: &str) -> Option<&InterfaceState> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }
}
