//! Object identifiers, table suffixes and typed table indices.

use std::borrow::Cow;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Interface name column (ifDescr).
pub static IF_DESCR: Oid = Oid::from_static(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 2]);
/// Interface operational status column (ifOperStatus).
pub static IF_OPER_STATUS: Oid = Oid::from_static(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 8]);
/// Inbound octet counter column (ifInOctets).
pub static IF_IN_OCTETS: Oid = Oid::from_static(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 10]);
/// Outbound octet counter column (ifOutOctets).
pub static IF_OUT_OCTETS: Oid = Oid::from_static(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 16]);
/// Hardware address column (ifPhysAddress).
pub static IF_PHYS_ADDRESS: Oid = Oid::from_static(&[1, 3, 6, 1, 2, 1, 2, 2, 1, 6]);

/// LLDP remote system name column (lldpRemSysName).
pub static LLDP_REM_SYS_NAME: Oid = Oid::from_static(&[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 9]);
/// LLDP remote port description column (lldpRemPortDesc).
pub static LLDP_REM_PORT_DESC: Oid = Oid::from_static(&[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 8]);
/// LLDP remote management address column.
pub static LLDP_REM_MAN_ADDR: Oid = Oid::from_static(&[1, 0, 8802, 1, 1, 2, 1, 4, 2, 1, 4]);

/// IANA address family number for IPv4, as used in LLDP address subtypes.
const ADDRESS_FAMILY_IPV4: u32 = 1;

/// Error returned when a dotted OID string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OidParseError {
    #[error("empty object identifier")]
    Empty,

    #[error("invalid arc '{0}' in object identifier")]
    InvalidArc(String),
}

/// A numeric object identifier such as `1.3.6.1.2.1.2.2.1.2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Cow<'static, [u32]>);

impl Oid {
    /// Build an OID from a static arc list (usable in `const` items).
    pub const fn from_static(arcs: &'static [u32]) -> Self {
        Self(Cow::Borrowed(arcs))
    }

    /// Build an OID from owned arcs.
    pub fn from_arcs(arcs: Vec<u32>) -> Self {
        Self(Cow::Owned(arcs))
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Return the part of `full` below this OID, if `full` lies strictly inside it.
    pub fn suffix_of(&self, full: &[u32]) -> Option<OidSuffix> {
        let prefix = self.arcs();
        if full.len() > prefix.len() && full.starts_with(prefix) {
            Some(OidSuffix(full[prefix.len()..].to_vec()))
        } else {
            None
        }
    }

    /// Append a suffix, producing the full instance OID.
    pub fn join(&self, suffix: &OidSuffix) -> Oid {
        let mut arcs = self.arcs().to_vec();
        arcs.extend_from_slice(suffix.arcs());
        Oid::from_arcs(arcs)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dotted(f, self.arcs())
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(OidParseError::Empty);
        }
        let arcs = trimmed
            .split('.')
            .map(|arc| {
                arc.parse::<u32>()
                    .map_err(|_| OidParseError::InvalidArc(arc.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_arcs(arcs))
    }
}

/// Instance suffix of a table row, relative to the column OID that was walked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OidSuffix(Vec<u32>);

impl OidSuffix {
    pub fn new(arcs: Vec<u32>) -> Self {
        Self(arcs)
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Row index of a single-index table (ifTable and friends): the last arc.
    pub fn table_index(&self) -> Option<TableIndex> {
        self.0.last().copied().map(TableIndex)
    }

    /// Neighbor index of an LLDP remote table row.
    ///
    /// Remote rows are indexed by `timeMark.localPortNum.remIndex[...]`; the
    /// management address table appends `subtype.address` after `remIndex`.
    /// Short suffixes fall back to the last arc.
    pub fn neighbor_index(&self) -> Option<TableIndex> {
        if self.0.len() >= 3 {
            Some(TableIndex(self.0[2]))
        } else {
            self.table_index()
        }
    }

    /// Decode an IPv4 management address encoded in an LLDP address row index.
    pub fn lldp_ipv4_address(&self) -> Option<Ipv4Addr> {
        if self.0.len() < 8 || self.0[3] != ADDRESS_FAMILY_IPV4 {
            return None;
        }
        let octets = &self.0[self.0.len() - 4..];
        let mut bytes = [0u8; 4];
        for (slot, arc) in bytes.iter_mut().zip(octets) {
            *slot = u8::try_from(*arc).ok()?;
        }
        Some(Ipv4Addr::from(bytes))
    }
}

impl fmt::Display for OidSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dotted(f, &self.0)
    }
}

/// Numeric row key shared by the interface and neighbor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableIndex(pub u32);

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TableIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

fn write_dotted(f: &mut fmt::Formatter<'_>, arcs: &[u32]) -> fmt::Result {
    for (i, arc) in arcs.iter().enumerate() {
        if i > 0 {
            f.write_str(".")?;
        }
        write!(f, "{arc}")?;
    }
    Ok(())
}
