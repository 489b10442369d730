//! UDP broadcast probe/response discovery.
//!
//! A single `DISCOVER` datagram is broadcast on every scan; receivers answer
//! with `TV_RESPONSE` and the sender address of that answer is the device.
//! The discovery port is bound exclusively: with a shared port the kernel
//! spreads unicast answers across sockets, so a second scan on the same
//! port fails with a bind error instead.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::ScanSession;
use crate::config::BroadcastConfig;
use crate::error::DiscoveryError;
use crate::types::{DeviceObservation, DiscoverySource};

/// Pause after a failed receive, doubled per consecutive failure.
const RECV_BACKOFF_BASE: Duration = Duration::from_millis(50);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Consecutive receive failures after which the scan gives up.
const MAX_RECV_FAILURES: u32 = 10;

/// Create a broadcast-capable UDP socket bound exclusively to `port`.
pub fn create_broadcast_socket(
    bind_ip: IpAddr,
    port: u16,
) -> Result<std::net::UdpSocket, std::io::Error> {
    let addr = SocketAddr::new(bind_ip, port);
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_broadcast(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Match a datagram against the acknowledgement token.
///
/// Trailing CR/LF/NUL are tolerated since simple receivers often append them.
pub fn parse_response(data: &[u8], sender: SocketAddr, ack: &str) -> Option<DeviceObservation> {
    let text = std::str::from_utf8(data).ok()?;
    let text = text.trim_end_matches(['\r', '\n', '\0']);

    if text != ack {
        return None;
    }

    Some(DeviceObservation::new(
        sender.ip().to_string(),
        DiscoverySource::Broadcast,
    ))
}

#[derive(Debug, Clone)]
pub struct BroadcastTransport {
    config: BroadcastConfig,
}

impl BroadcastTransport {
    pub fn new(config: BroadcastConfig) -> Self {
        Self { config }
    }

    /// Bind, send the probe, then listen for answers until stopped.
    pub async fn scan(&self) -> Result<ScanSession, DiscoveryError> {
        let port = self.config.port;
        let bind_ip = self
            .config
            .bind_address
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let std_socket = create_broadcast_socket(bind_ip, port)
            .map_err(|source| DiscoveryError::Bind { port, source })?;
        let socket = UdpSocket::from_std(std_socket)?;

        let target = self.config.target();
        socket
            .send_to(self.config.probe.as_bytes(), target)
            .await
            .map_err(|source| DiscoveryError::Send { target, source })?;
        debug!(%target, probe = %self.config.probe, "discovery probe sent");

        let ack = self.config.ack.clone();
        Ok(ScanSession::spawn(DiscoverySource::Broadcast, move |tx| {
            receive_responses(socket, ack, tx)
        }))
    }
}

/// Tracks consecutive receive failures.
#[derive(Debug, Default)]
struct RecvBackoff {
    failures: u32,
}

impl RecvBackoff {
    /// Delay before the next receive, or `None` once the socket looks dead.
    fn on_error(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= MAX_RECV_FAILURES {
            return None;
        }
        let delay = RECV_BACKOFF_BASE * 2u32.saturating_pow(self.failures - 1);
        Some(delay.min(RECV_BACKOFF_MAX))
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

async fn receive_responses(socket: UdpSocket, ack: String, tx: mpsc::Sender<DeviceObservation>) {
    let mut buf = vec![0u8; 2048];
    let mut backoff = RecvBackoff::default();

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => {
                backoff.reset();
                match parse_response(&buf[..len], addr, &ack) {
                    Some(observation) => {
                        debug!(address = %observation.address, "receiver answered probe");
                        if tx.send(observation).await.is_err() {
                            break;
                        }
                    }
                    None => trace!(%addr, len, "ignoring datagram"),
                }
            }
            Err(e) => {
                if tx.is_closed() {
                    break;
                }
                match backoff.on_error() {
                    Some(delay) => {
                        warn!("UDP receive error: {}", e);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!("UDP receive keeps failing, ending scan: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    /// A port that was free a moment ago.
    fn free_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn loopback_config(port: u16, probe_target: SocketAddr) -> BroadcastConfig {
        BroadcastConfig {
            port,
            probe_target: Some(probe_target),
            bind_address: Some("127.0.0.1".parse().unwrap()),
            ..Default::default()
        }
    }

    fn sender(ip: &str) -> SocketAddr {
        SocketAddr::new(ip.parse().unwrap(), 12345)
    }

    #[test]
    fn test_parse_response_ack() {
        let obs = parse_response(b"TV_RESPONSE", sender("192.168.1.2"), "TV_RESPONSE").unwrap();
        assert_eq!(obs.address, "192.168.1.2");
        assert_eq!(obs.source, DiscoverySource::Broadcast);
    }

    #[test]
    fn test_parse_response_tolerates_line_ending() {
        assert!(parse_response(b"TV_RESPONSE\r\n", sender("10.0.0.1"), "TV_RESPONSE").is_some());
    }

    #[test]
    fn test_parse_response_rejects_other_payloads() {
        let from = sender("10.0.0.1");
        assert!(parse_response(b"DISCOVER", from, "TV_RESPONSE").is_none());
        assert!(parse_response(b"tv_response", from, "TV_RESPONSE").is_none());
        assert!(parse_response(b"TV_RESPONSE extra", from, "TV_RESPONSE").is_none());
        assert!(parse_response(&[0xff, 0xfe], from, "TV_RESPONSE").is_none());
    }

    #[tokio::test]
    async fn test_scan_against_loopback_receiver() {
        let tv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tv_addr = tv.local_addr().unwrap();

        let transport = BroadcastTransport::new(BroadcastConfig {
            port: 0,
            probe_target: Some(tv_addr),
            bind_address: Some("127.0.0.1".parse().unwrap()),
            ..Default::default()
        });

        let mut session = transport.scan().await.unwrap();

        let mut buf = [0u8; 64];
        let (len, phone) = timeout(Duration::from_secs(2), tv.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"DISCOVER");

        tv.send_to(b"NOISE", phone).await.unwrap();
        tv.send_to(b"TV_RESPONSE", phone).await.unwrap();

        let obs = timeout(Duration::from_secs(2), session.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(obs.address, "127.0.0.1");
        assert_eq!(obs.source, DiscoverySource::Broadcast);

        session.stop();
    }

    #[tokio::test]
    async fn test_scan_bind_failure_is_discovery_error() {
        let transport = BroadcastTransport::new(BroadcastConfig {
            port: 0,
            // Not a local interface address.
            bind_address: Some("203.0.113.7".parse().unwrap()),
            ..Default::default()
        });

        match transport.scan().await {
            Err(DiscoveryError::Bind { .. }) => {}
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_second_scan_on_same_port_is_refused() {
        let tv = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = free_port();
        let transport = BroadcastTransport::new(loopback_config(port, tv.local_addr().unwrap()));

        let mut first = transport.scan().await.unwrap();
        match transport.scan().await {
            Err(DiscoveryError::Bind { port: p, .. }) => assert_eq!(p, port),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }

        // Every answer reaches the one session holding the port.
        let scanner: SocketAddr = ([127, 0, 0, 1], port).into();
        let mut responders = Vec::new();
        for _ in 0..8 {
            let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            responder.send_to(b"TV_RESPONSE", scanner).await.unwrap();
            responders.push(responder);
        }
        for _ in 0..8 {
            let obs = timeout(Duration::from_secs(2), first.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(obs.address, "127.0.0.1");
        }

        // Once closed, the port can be scanned again.
        first.close().await;
        transport.scan().await.unwrap().close().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_two_receivers_listed_most_recent_first() {
        use crate::discovery::{DiscoveryService, DiscoveryTransport};

        // Linux routes all of 127.0.0.0/8 to loopback, so each receiver
        // gets its own address.
        let first_tv = UdpSocket::bind("127.0.0.2:0").await.unwrap();
        let second_tv = UdpSocket::bind("127.0.0.3:0").await.unwrap();
        let port = free_port();
        let transport = DiscoveryTransport::Broadcast(BroadcastTransport::new(loopback_config(
            port,
            first_tv.local_addr().unwrap(),
        )));

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, phone) = first_tv.recv_from(&mut buf).await.unwrap();
            first_tv.send_to(b"TV_RESPONSE", phone).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            second_tv.send_to(b"TV_RESPONSE\n", phone).await.unwrap();
            first_tv.send_to(b"NOISE", phone).await.unwrap();
        });

        let devices = DiscoveryService::discover_once(&transport, Duration::from_millis(500))
            .await
            .unwrap();

        let addresses: Vec<_> = devices.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(addresses, vec!["127.0.0.3", "127.0.0.2"]);
        assert!(devices
            .iter()
            .all(|d| d.discovered_via == DiscoverySource::Broadcast));
    }

    #[test]
    fn test_recv_backoff_grows_then_gives_up() {
        let mut backoff = RecvBackoff::default();

        assert_eq!(backoff.on_error(), Some(Duration::from_millis(50)));
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(200)));

        backoff.reset();
        assert_eq!(backoff.on_error(), Some(Duration::from_millis(50)));

        let mut delays = vec![];
        while let Some(delay) = backoff.on_error() {
            assert!(delay <= RECV_BACKOFF_MAX);
            delays.push(delay);
        }
        assert_eq!(delays.len() as u32 + 1, MAX_RECV_FAILURES - 1);
    }
}
