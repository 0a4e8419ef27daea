//! Input validation and sanitization
//!
//! Interface names and addresses end up as arguments to external tools,
//! so everything caller-supplied is checked before a command is built.

use crate::error::{NetstateError, NetstateResult};
use crate::schema::Ipv4State;
use std::net::Ipv4Addr;

/// Maximum length for interface names (Linux kernel limit is 15)
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Validate interface name to prevent command injection
///
/// Interface names must be alphanumeric with optional dashes, underscores
/// and dots, and no longer than 15 characters (Linux kernel limit)
pub fn validate_interface_name(name: &str) -> NetstateResult<()> {
    if name.is_empty() {
        return Err(NetstateError::InvalidParameter(
            "Interface name cannot be empty".to_string()
        ));
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(NetstateError::InvalidParameter(
            format!("Interface name too long (max {} characters)", MAX_INTERFACE_NAME_LEN)
        ));
    }

    // Only allow alphanumeric, dash, underscore, dot (vlan subinterfaces)
    // This prevents shell metacharacters and command injection
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(NetstateError::InvalidParameter(
                format!("Invalid interface name '{}': contains invalid character '{}'", name, c)
            ));
        }
    }

    // Don't allow names starting with dash (could be interpreted as option)
    if name.starts_with('-') {
        return Err(NetstateError::InvalidParameter(
            "Interface name cannot start with dash".to_string()
        ));
    }

    Ok(())
}

/// Validate IPv4 address
///
/// Uses Rust's built-in address parser to ensure valid format
pub fn validate_ipv4_address(addr: &str) -> NetstateResult<Ipv4Addr> {
    addr.parse::<Ipv4Addr>()
        .map_err(|_| NetstateError::InvalidParameter(
            format!("Invalid IPv4 address: {}", addr)
        ))
}

/// Validate IPv4 prefix length
pub fn validate_prefix_len(prefix: u8) -> NetstateResult<()> {
    if prefix > 32 {
        return Err(NetstateError::InvalidParameter(
            format!("Prefix length {} exceeds maximum 32", prefix)
        ));
    }
    Ok(())
}

/// Validate a desired IPv4 state before it is turned into commands
pub fn validate_ipv4_state(state: &Ipv4State) -> NetstateResult<()> {
    if let Some(addresses) = &state.addresses {
        for addr in addresses {
            validate_ipv4_address(&addr.ip)?;
            validate_prefix_len(addr.prefix_length)?;
        }

        if state.enabled == Some(false) && !addresses.is_empty() {
            return Err(NetstateError::InvalidParameter(
                "Static addresses given for a disabled IPv4 configuration".to_string()
            ));
        }
    }

    Ok(())
}
