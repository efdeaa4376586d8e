// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device address parsing and shell quoting.

use std::fmt;

use crate::error::{Result, SshError};

/// A concrete `host[:port]` address as returned by the reachability resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
	pub host: String,
	pub port: Option<u16>,
}

impl fmt::Display for DeviceAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let host = if self.host.contains(':') {
			format!("[{}]", self.host)
		} else {
			self.host.clone()
		};
		match self.port {
			Some(port) => write!(f, "{host}:{port}"),
			None => write!(f, "{host}"),
		}
	}
}

/// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
pub fn parse_address(addr: &str) -> Result<DeviceAddress> {
	let addr = addr.trim();
	if addr.is_empty() {
		return Err(SshError::InvalidAddress("empty address".to_string()));
	}

	if let Some(rest) = addr.strip_prefix('[') {
		let (host, tail) = rest
			.split_once(']')
			.ok_or_else(|| SshError::InvalidAddress(addr.to_string()))?;
		let port = match tail.strip_prefix(':') {
			Some(p) => Some(parse_port(addr, p)?),
			None if tail.is_empty() => None,
			None => return Err(SshError::InvalidAddress(addr.to_string())),
		};
		return Ok(DeviceAddress {
			host: host.to_string(),
			port,
		});
	}

	match addr.matches(':').count() {
		0 => Ok(DeviceAddress {
			host: addr.to_string(),
			port: None,
		}),
		1 => {
			let (host, port) = addr
				.split_once(':')
				.ok_or_else(|| SshError::InvalidAddress(addr.to_string()))?;
			if host.is_empty() {
				return Err(SshError::InvalidAddress(addr.to_string()));
			}
			Ok(DeviceAddress {
				host: host.to_string(),
				port: Some(parse_port(addr, port)?),
			})
		}
		// Bare IPv6 literal without brackets.
		_ => Ok(DeviceAddress {
			host: addr.to_string(),
			port: None,
		}),
	}
}

fn parse_port(addr: &str, port: &str) -> Result<u16> {
	port
		.parse()
		.map_err(|_| SshError::InvalidAddress(format!("{addr}: invalid port '{port}'")))
}

/// Quote a single argument for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
	if !arg.is_empty()
		&& arg
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
	{
		return arg.to_string();
	}
	format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_parse_host_only() {
		let addr = parse_address("chromeos1-row1-host1").unwrap();
		assert_eq!(addr.host, "chromeos1-row1-host1");
		assert_eq!(addr.port, None);
	}

	#[test]
	fn test_parse_host_and_port() {
		let addr = parse_address("10.0.0.5:2222").unwrap();
		assert_eq!(addr.host, "10.0.0.5");
		assert_eq!(addr.port, Some(2222));
		assert_eq!(addr.to_string(), "10.0.0.5:2222");
	}

	#[test]
	fn test_parse_bracketed_ipv6() {
		let addr = parse_address("[fd00::1]:22").unwrap();
		assert_eq!(addr.host, "fd00::1");
		assert_eq!(addr.port, Some(22));
		assert_eq!(addr.to_string(), "[fd00::1]:22");
	}

	#[test]
	fn test_parse_rejects_empty_and_bad_port() {
		assert!(parse_address("").is_err());
		assert!(parse_address("host:notaport").is_err());
		assert!(parse_address(":22").is_err());
	}

	#[test]
	fn test_shell_quote() {
		assert_eq!(shell_quote("plain"), "plain");
		assert_eq!(shell_quote("/var/tmp/x"), "/var/tmp/x");
		assert_eq!(shell_quote("a b"), "'a b'");
		assert_eq!(shell_quote("it's"), r"'it'\''s'");
		assert_eq!(shell_quote(""), "''");
	}

	proptest! {
		#[test]
		fn prop_host_port_roundtrip(host in "[a-z][a-z0-9-]{0,20}", port in 1u16..) {
			let addr = parse_address(&format!("{host}:{port}")).unwrap();
			prop_assert_eq!(addr.host, host);
			prop_assert_eq!(addr.port, Some(port));
		}
	}
}
