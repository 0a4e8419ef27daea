//! Kernel-side IPv4 view using the ip command and sysfs

use crate::error::{NetstateError, NetstateResult};
use crate::schema::Ipv4Address;
use crate::validation;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

/// List all network interfaces
pub async fn list_interfaces() -> NetstateResult<Vec<String>> {
    let net_path = Path::new("/sys/class/net");

    if !net_path.exists() {
        return Err(NetstateError::NotSupported(
            "/sys/class/net not available".to_string(),
        ));
    }

    let mut entries = fs::read_dir(net_path).await?;
    let mut interfaces = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            interfaces.push(name.to_string());
        }
    }

    interfaces.sort();
    Ok(interfaces)
}

/// Reads the runtime IPv4 addresses of an interface from the kernel.
pub(crate) async fn query_ipv4_addresses(
    ip_bin: &Path,
    interface: &str,
) -> NetstateResult<Vec<Ipv4Address>> {
    validation::validate_interface_name(interface)?;

    let cmd_str = format!("{} -json addr show dev {}", ip_bin.display(), interface);
    let output = Command::new(ip_bin)
        .args(["-json", "addr", "show", "dev", interface])
        .output()
        .await
        .map_err(|e| NetstateError::CommandFailed {
            cmd: cmd_str.clone(),
            code: None,
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(NetstateError::InterfaceNotFound(interface.to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| NetstateError::ParseError(format!("Invalid UTF-8 in JSON output: {}", e)))?;
    parse_addr_json(&json_str)
}

/// Extracts global-scope inet addresses from `ip -json addr show` output.
///
/// Link- and host-scope addresses are skipped so that an interface still
/// waiting for a DHCP lease does not look configured.
fn parse_addr_json(json_str: &str) -> NetstateResult<Vec<Ipv4Address>> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| NetstateError::ParseError(e.to_string()))?;

    let mut addresses = Vec::new();

    if let Some(arr) = json.as_array() {
        if let Some(iface) = arr.first() {
            if let Some(addr_info) = iface.get("addr_info").and_then(|v| v.as_array()) {
                for addr in addr_info {
                    if let (Some(local), Some(family), Some(prefixlen)) = (
                        addr.get("local").and_then(|v| v.as_str()),
                        addr.get("family").and_then(|v| v.as_str()),
                        addr.get("prefixlen").and_then(|v| v.as_u64()),
                    ) {
                        let scope = addr.get("scope").and_then(|v| v.as_str()).unwrap_or("global");
                        if family == "inet" && scope == "global" {
                            addresses.push(Ipv4Address::new(local, prefixlen as u8));
                        }
                    }
                }
            }
        }
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_SHOW_JSON: &str = r#"[
        {
            "ifindex": 3,
            "ifname": "eth1",
            "flags": ["BROADCAST", "MULTICAST", "UP", "LOWER_UP"],
            "operstate": "UP",
            "addr_info": [
                {
                    "family": "inet",
                    "local": "192.0.2.251",
                    "prefixlen": 24,
                    "scope": "global",
                    "label": "eth1"
                },
                {
                    "family": "inet",
                    "local": "169.254.12.7",
                    "prefixlen": 16,
                    "scope": "link",
                    "label": "eth1"
                },
                {
                    "family": "inet6",
                    "local": "fe80::5054:ff:fe6b:1",
                    "prefixlen": 64,
                    "scope": "link"
                }
            ]
        }
    ]"#;

    #[test]
    fn test_parse_addr_json_filters_to_global_inet() {
        let addresses = parse_addr_json(ADDR_SHOW_JSON).unwrap();
        assert_eq!(addresses, vec![Ipv4Address::new("192.0.2.251", 24)]);
    }

    #[test]
    fn test_parse_addr_json_empty_addr_info() {
        let addresses = parse_addr_json(r#"[{"ifindex": 3, "ifname": "eth1", "addr_info": []}]"#)
            .unwrap();
        assert!(addresses.is_empty());

        let addresses = parse_addr_json("[]").unwrap();
        assert!(addresses.is_empty());
    }

    #[test]
    fn test_parse_addr_json_rejects_garbage() {
        assert!(parse_addr_json("not json").is_err());
    }
}
