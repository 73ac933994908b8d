//! Owned SNMP values decoded from agent responses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::snmp::Oid;

/// A variable binding value detached from the response buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Unsigned32(u32),
    Timeticks(u32),
    Counter64(u64),
    Boolean(bool),
    Null,
    /// Any other ASN.1 type the poller never interprets.
    Other,
}

impl SnmpValue {
    /// Convert a wire value.
    ///
    /// Exception values (endOfMibView, noSuchObject) never get here: the wire
    /// library ends the varbind list at them.
    pub fn from_wire(value: &snmp::Value<'_>) -> Self {
        use snmp::Value;

        match value {
            Value::Integer(v) => Self::Integer(*v),
            Value::OctetString(bytes) => Self::OctetString(bytes.to_vec()),
            Value::IpAddress(octets) => Self::IpAddress(*octets),
            Value::Counter32(v) => Self::Counter32(*v),
            Value::Unsigned32(v) => Self::Unsigned32(*v),
            Value::Timeticks(v) => Self::Timeticks(*v),
            Value::Counter64(v) => Self::Counter64(*v),
            Value::Boolean(v) => Self::Boolean(*v),
            Value::Null => Self::Null,
            Value::ObjectIdentifier(oid) => {
                let mut buf = [0u32; 128];
                match oid.read_name(&mut buf) {
                    Ok(arcs) => Self::ObjectIdentifier(Oid::from_arcs(arcs.to_vec())),
                    Err(_) => Self::Other,
                }
            }
            _ => Self::Other,
        }
    }

    /// Numeric view of integer-like values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Counter32(v) | Self::Unsigned32(v) | Self::Timeticks(v) => Some(i64::from(*v)),
            Self::Counter64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Counter view; negative integers are rejected.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(v) => u64::try_from(*v).ok(),
            Self::Counter32(v) | Self::Unsigned32(v) | Self::Timeticks(v) => Some(u64::from(*v)),
            Self::Counter64(v) => Some(*v),
            _ => None,
        }
    }

    /// Display text with NUL bytes stripped and surrounding whitespace trimmed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::OctetString(bytes) => {
                let text = String::from_utf8_lossy(bytes).replace('\0', "");
                Some(text.trim().to_string())
            }
            _ => None,
        }
    }

    /// Hardware address rendered as colon-separated hex. Empty strings yield `None`.
    pub fn as_mac(&self) -> Option<String> {
        let Self::OctetString(bytes) = self else {
            return None;
        };
        if bytes.is_empty() {
            return None;
        }
        if bytes.len() == 6 {
            let parts: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
            return Some(parts.join(":"));
        }
        // Some agents report the address as printable text already.
        self.as_text().filter(|s| !s.is_empty())
    }

    /// Management address view: raw IPv4/IPv6 octets or printable text.
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Self::IpAddress(octets) => Some(IpAddr::V4(Ipv4Addr::from(*octets))),
            Self::OctetString(bytes) if bytes.len() == 4 => {
                let octets: [u8; 4] = bytes.as_slice().try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            Self::OctetString(bytes) if bytes.len() == 16 => {
                let octets: [u8; 16] = bytes.as_slice().try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            Self::OctetString(_) => self.as_text()?.parse().ok(),
            _ => None,
        }
    }
}
