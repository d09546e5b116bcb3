use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Network endpoint encoded on the wire as a single `"ip:port"` string.
///
/// The port is split off at the last colon, so bare IPv6 literals
/// (`"fe80::1:443"`) survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    pub ip: String,
    pub port: u16,
}

impl Address {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Node identifier shown in the topology: the ip with dots replaced.
    pub fn node_id(&self) -> String {
        ip_node_id(&self.ip)
    }
}

/// `10.1.1.5` → `10_1_1_5`. Viewers use node ids as DOM-safe keys.
pub fn ip_node_id(ip: &str) -> String {
    ip.replace('.', "_")
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingColon(s.to_string()))?;
        if ip.is_empty() {
            return Err(AddressError::EmptyIp(s.to_string()));
        }
        let port = port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
            input: s.to_string(),
            port: port.to_string(),
        })?;
        Ok(Address::new(ip, port))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4() {
        let addr: Address = "10.1.1.5:8080".parse().unwrap();
        assert_eq!(addr.ip, "10.1.1.5");
        assert_eq!(addr.port, 8080);
    }

    #[test]
    fn round_trips_through_display() {
        for addr in [
            Address::new("10.1.1.5", 8080),
            Address::new("0.0.0.0", 0),
            Address::new("fe80::1", 443),
            Address::new("db-1.internal", u16::MAX),
        ] {
            let parsed: Address = addr.to_string().parse().unwrap();
            assert_eq!(parsed, addr);
        }
    }

    #[test]
    fn missing_colon_is_descriptive() {
        let err = "10.1.1.5".parse::<Address>().unwrap_err();
        assert_eq!(err, AddressError::MissingColon("10.1.1.5".to_string()));
        assert!(err.to_string().contains("colon not found"));
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(matches!(
            "10.1.1.5:http".parse::<Address>(),
            Err(AddressError::InvalidPort { .. })
        ));
        assert!(matches!(
            "10.1.1.5:70000".parse::<Address>(),
            Err(AddressError::InvalidPort { .. })
        ));
    }

    #[test]
    fn empty_ip_is_rejected() {
        assert!(matches!(":80".parse::<Address>(), Err(AddressError::EmptyIp(_))));
    }

    #[test]
    fn node_id_replaces_dots() {
        assert_eq!(Address::new("10.1.1.5", 80).node_id(), "10_1_1_5");
    }
}
