//! SNMPv2c client with bounded timeout and retry.
//!
//! The wire library is blocking, so every request runs on the blocking thread
//! pool. A request that gets no answer is retried up to the configured count
//! and then reported as [`SnmpError::Unreachable`]. A reply carrying the id of
//! an earlier attempt is retried on a fresh socket.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use snmp::SyncSession;
use thiserror::Error;

use crate::snmp::{Oid, OidSuffix, SnmpValue};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default retry count (one retry after the first attempt).
pub const DEFAULT_RETRIES: u8 = 1;

/// Standard SNMP agent port.
pub const DEFAULT_PORT: u16 = 161;

/// Upper bound on rows accepted from a single table scan.
pub const MAX_WALK_ROWS: usize = 10_000;

/// v2c error-status value agents may return instead of endOfMibView.
const ERROR_STATUS_NO_SUCH_NAME: u32 = 2;

/// Rows of a table scan, keyed by their suffix below the scanned column.
pub type WalkRows = BTreeMap<OidSuffix, SnmpValue>;

/// Protocol client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnmpError {
    /// No usable response within timeout and retries.
    #[error("agent {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    /// The reply belonged to an earlier, timed-out attempt.
    #[error("stale response from {target}")]
    StaleResponse { target: String },

    /// The agent answered with something the client cannot use.
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// The blocking request task was cancelled or panicked.
    #[error("request task failed: {0}")]
    Task(String),
}

impl SnmpError {
    fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::StaleResponse { .. })
    }
}

/// Agent address and read credential for one device.
#[derive(Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub community: String,
}

impl Target {
    pub fn new(host: impl Into<String>, community: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            community: community.into(),
        }
    }
}

// Keep the community string out of logs.
impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Read-only management protocol operations used by the poller.
#[async_trait::async_trait]
pub trait ProtocolClient: Send + Sync + 'static {
    /// Fetch a single scalar. `Ok(None)` when the agent has no such object.
    async fn get(&self, target: &Target, oid: &Oid) -> Result<Option<SnmpValue>, SnmpError>;

    /// Scan every row below `prefix`.
    async fn walk(&self, target: &Target, prefix: &Oid) -> Result<WalkRows, SnmpError>;
}

/// Client transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnmpClientConfig {
    pub port: u16,
    pub timeout: Duration,
    pub retries: u8,
}

impl Default for SnmpClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// [`ProtocolClient`] speaking SNMPv2c over UDP.
#[derive(Debug, Clone, Default)]
pub struct SnmpClient {
    config: SnmpClientConfig,
}

impl SnmpClient {
    pub fn new(config: SnmpClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnmpClientConfig {
        &self.config
    }

    /// `host:port`, bracketing bare IPv6 literals.
    fn agent_address(&self, host: &str) -> String {
        match host.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.config.port).to_string(),
            Err(_) => format!("{host}:{}", self.config.port),
        }
    }

    fn request(&self, target: &Target) -> Request {
        Request {
            address: self.agent_address(&target.host),
            community: target.community.clone().into_bytes(),
            timeout: self.config.timeout,
            retries: self.config.retries,
        }
    }
}

#[async_trait::async_trait]
impl ProtocolClient for SnmpClient {
    async fn get(&self, target: &Target, oid: &Oid) -> Result<Option<SnmpValue>, SnmpError> {
        let request = self.request(target);
        let oid = oid.clone();
        tokio::task::spawn_blocking(move || request.get(&oid))
            .await
            .map_err(|e| SnmpError::Task(e.to_string()))?
    }

    async fn walk(&self, target: &Target, prefix: &Oid) -> Result<WalkRows, SnmpError> {
        let request = self.request(target);
        let prefix = prefix.clone();
        tokio::task::spawn_blocking(move || request.walk(&prefix))
            .await
            .map_err(|e| SnmpError::Task(e.to_string()))?
    }
}

// ============================================================================
// Blocking request execution
// ============================================================================

struct Request {
    address: String,
    community: Vec<u8>,
    timeout: Duration,
    retries: u8,
}

impl Request {
    fn open(&self) -> Result<SyncSession, SnmpError> {
        SyncSession::new(self.address.as_str(), &self.community, Some(self.timeout), 0).map_err(
            |e| SnmpError::Unreachable {
                target: self.address.clone(),
                reason: e.to_string(),
            },
        )
    }

    /// Run `op` with retries. A stale reply means late answers are queued on
    /// the socket, so the session is reopened before the next attempt.
    fn exchange<T>(
        &self,
        session: &mut SyncSession,
        mut op: impl FnMut(&mut SyncSession) -> Result<T, SnmpError>,
    ) -> Result<T, SnmpError> {
        with_retry(&self.address, self.retries, || {
            let result = op(session);
            if let Err(SnmpError::StaleResponse { .. }) = &result {
                *session = self.open()?;
            }
            result
        })
    }

    fn get(&self, oid: &Oid) -> Result<Option<SnmpValue>, SnmpError> {
        let mut session = self.open()?;
        self.exchange(&mut session, |session| {
            let pdu = session
                .get(oid.arcs())
                .map_err(|e| map_wire_error(&self.address, e))?;
            if pdu.error_status != 0 {
                return Err(SnmpError::protocol(format!(
                    "error status {} at index {}",
                    pdu.error_status, pdu.error_index
                )));
            }
            let mut varbinds = pdu.varbinds;
            Ok(varbinds
                .next()
                .map(|(_, value)| SnmpValue::from_wire(&value)))
        })
    }

    fn walk(&self, prefix: &Oid) -> Result<WalkRows, SnmpError> {
        let mut session = self.open()?;
        let mut rows = WalkRows::new();
        let mut cursor: Vec<u32> = prefix.arcs().to_vec();

        loop {
            if rows.len() >= MAX_WALK_ROWS {
                tracing::warn!(
                    target = %self.address,
                    oid = %prefix,
                    rows = rows.len(),
                    "Table scan hit row limit; truncating"
                );
                break;
            }

            let step = self.exchange(&mut session, |session| {
                let pdu = session
                    .getnext(&cursor)
                    .map_err(|e| map_wire_error(&self.address, e))?;
                if pdu.error_status == ERROR_STATUS_NO_SUCH_NAME {
                    return Ok(None);
                }
                if pdu.error_status != 0 {
                    return Err(SnmpError::protocol(format!(
                        "error status {} at index {}",
                        pdu.error_status, pdu.error_index
                    )));
                }
                let mut varbinds = pdu.varbinds;
                let Some((name, value)) = varbinds.next() else {
                    return Ok(None);
                };
                let mut buf = [0u32; 128];
                let arcs = name
                    .read_name(&mut buf)
                    .map_err(|e| SnmpError::protocol(format!("malformed OID in response: {e:?}")))?
                    .to_vec();
                Ok(Some((arcs, SnmpValue::from_wire(&value))))
            })?;

            let Some((arcs, value)) = step else {
                break;
            };
            let Some(suffix) = prefix.suffix_of(&arcs) else {
                break;
            };
            if arcs <= cursor {
                return Err(SnmpError::protocol(format!(
                    "agent returned non-increasing OID {}",
                    Oid::from_arcs(arcs)
                )));
            }
            rows.insert(suffix, value);
            cursor = arcs;
        }

        Ok(rows)
    }
}

fn map_wire_error(address: &str, error: snmp::SnmpError) -> SnmpError {
    match error {
        snmp::SnmpError::SendError | snmp::SnmpError::ReceiveError => SnmpError::Unreachable {
            target: address.to_string(),
            reason: format!("{error:?}"),
        },
        snmp::SnmpError::RequestIdMismatch => SnmpError::StaleResponse {
            target: address.to_string(),
        },
        other => SnmpError::protocol(format!("{other:?}")),
    }
}

/// Run `op` once plus up to `retries` more times while it fails retryably.
fn with_retry<T>(
    address: &str,
    retries: u8,
    mut op: impl FnMut() -> Result<T, SnmpError>,
) -> Result<T, SnmpError> {
    let mut attempt: u8 = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                tracing::debug!(target = address, attempt, error = %e, "Retrying SNMP request");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    fn unreachable() -> SnmpError {
        SnmpError::Unreachable {
            target: "10.0.0.1:161".to_string(),
            reason: "ReceiveError".to_string(),
        }
    }

    #[test]
    fn test_retry_stops_after_configured_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("10.0.0.1:161", 1, || {
            calls += 1;
            Err(unreachable())
        });
        assert!(matches!(result, Err(SnmpError::Unreachable { .. })));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_recovers_on_second_attempt() {
        let mut calls = 0;
        let result = with_retry("10.0.0.1:161", 1, || {
            calls += 1;
            if calls == 1 { Err(unreachable()) } else { Ok(42) }
        });
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_protocol_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("10.0.0.1:161", 3, || {
            calls += 1;
            Err(SnmpError::protocol("bad value"))
        });
        assert!(matches!(result, Err(SnmpError::Protocol { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_stale_response_is_retried() {
        let stale = map_wire_error("10.0.0.1:161", snmp::SnmpError::RequestIdMismatch);
        assert!(matches!(stale, SnmpError::StaleResponse { .. }));
        assert!(stale.is_retryable());

        let mut calls = 0;
        let result = with_retry("10.0.0.1:161", 1, || {
            calls += 1;
            if calls == 1 { Err(stale.clone()) } else { Ok("fresh") }
        });
        assert_eq!(result, Ok("fresh"));
        assert_eq!(calls, 2);

        let decode = map_wire_error("10.0.0.1:161", snmp::SnmpError::AsnParseError);
        assert!(!decode.is_retryable());
    }

    #[test]
    fn test_agent_address_formatting() {
        let client = SnmpClient::new(SnmpClientConfig {
            port: 1161,
            ..Default::default()
        });
        assert_eq!(client.agent_address("10.0.0.1"), "10.0.0.1:1161");
        assert_eq!(client.agent_address("::1"), "[::1]:1161");
        assert_eq!(client.agent_address("switch-a"), "switch-a:1161");
    }

    #[test]
    fn test_target_debug_hides_community() {
        let target = Target::new("10.0.0.1", "s3cret");
        let rendered = format!("{target:?}");
        assert!(rendered.contains("10.0.0.1"));
        assert!(!rendered.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_silent_agent_is_unreachable() {
        // Bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();

        let client = SnmpClient::new(SnmpClientConfig {
            port,
            timeout: Duration::from_millis(200),
            retries: 1,
        });
        let target = Target::new("127.0.0.1", "public");

        let walk = client.walk(&target, &crate::snmp::IF_DESCR).await;
        assert!(matches!(walk, Err(SnmpError::Unreachable { .. })), "{walk:?}");

        let get = client.get(&target, &crate::snmp::IF_DESCR).await;
        assert!(matches!(get, Err(SnmpError::Unreachable { .. })), "{get:?}");
    }
}
