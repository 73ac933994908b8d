//! Protocol Client
//!
//! Read-only access to device management agents: single scalar reads and
//! ordered table scans, with the OID constants the poller relies on.

mod client;
mod oid;
mod value;

pub use client::{
    DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_TIMEOUT, MAX_WALK_ROWS, ProtocolClient, SnmpClient,
    SnmpClientConfig, SnmpError, Target, WalkRows,
};
pub use oid::{
    IF_DESCR, IF_IN_OCTETS, IF_OPER_STATUS, IF_OUT_OCTETS, IF_PHYS_ADDRESS, LLDP_REM_MAN_ADDR,
    LLDP_REM_PORT_DESC, LLDP_REM_SYS_NAME, Oid, OidParseError, OidSuffix, TableIndex,
};
pub use value::SnmpValue;
