//! Probes for targets whose payload is not read: UDP multicast, RTMP and RTSP.
//!
//! Speed is inferred from how long it takes to resolve and open the socket,
//! using the configured latency table. A small control message is written to
//! check the socket is usable; if that fails the estimate is halved.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;

use super::error_chain;
use super::result::{Measurement, ProbeResult};
use super::target::Target;
use crate::config::SocketConfig;
use crate::error::ProbeError;

const UDP_PING: &[u8] = b"PING";
const RTMP_HANDSHAKE_LEN: usize = 1 + 1536;
const SAMPLE_BYTES: u64 = 1024;

pub async fn resolve(address: &str, limit: Duration) -> Result<SocketAddr, ProbeError> {
    let mut addrs = timeout(limit, lookup_host(address))
        .await
        .map_err(|_| ProbeError::Timeout(limit))??;
    addrs
        .next()
        .ok_or_else(|| ProbeError::InvalidUrl(format!("{address}: no addresses")))
}

/// Bind a local socket of the right family and connect it to `addr`.
/// UDP is connectionless, success only means the socket could be set up.
pub async fn open_udp(addr: SocketAddr, limit: Duration) -> Result<UdpSocket, ProbeError> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let open = async {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        Ok::<_, std::io::Error>(socket)
    };
    Ok(timeout(limit, open).await.map_err(|_| ProbeError::Timeout(limit))??)
}

pub async fn connect_tcp(addr: SocketAddr, limit: Duration) -> Result<TcpStream, ProbeError> {
    Ok(timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| ProbeError::Timeout(limit))??)
}

/// Look up the assumed speed (KB/s) and its label for a connect latency.
pub fn estimate_from_latency(latency: Duration, config: &SocketConfig) -> (f64, &str) {
    let millis = latency.as_millis();
    config
        .latency_table
        .iter()
        .find(|bucket| millis < u128::from(bucket.below_ms))
        .map(|bucket| (bucket.speed, bucket.label.as_str()))
        .unwrap_or((config.slowest_speed, config.slowest_label.as_str()))
}

enum Connection {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl Connection {
    async fn open(target: &Target, addr: SocketAddr, limit: Duration) -> Result<Self, ProbeError> {
        if target.is_udp() {
            Ok(Connection::Udp(open_udp(addr, limit).await?))
        } else {
            Ok(Connection::Tcp(connect_tcp(addr, limit).await?))
        }
    }

    /// Write the protocol's smallest meaningful message.
    async fn send_control(&mut self, target: &Target, raw_url: &str) -> std::io::Result<()> {
        match self {
            Connection::Udp(socket) => socket.send(UDP_PING).await.map(|_| ()),
            Connection::Tcp(stream) => {
                let payload = control_payload(target, raw_url);
                stream.write_all(&payload).await?;
                stream.flush().await
            }
        }
    }
}

fn control_payload(target: &Target, raw_url: &str) -> Vec<u8> {
    match target {
        Target::Rtsp { .. } => format!("OPTIONS {raw_url} RTSP/1.0\r\nCSeq: 1\r\n\r\n").into_bytes(),
        // C0 (version 3) followed by a zeroed C1
        Target::Rtmp { .. } => {
            let mut handshake = vec![0u8; RTMP_HANDSHAKE_LEN];
            handshake[0] = 3;
            handshake
        }
        _ => UDP_PING.to_vec(),
    }
}

/// Resolve and open the target's socket. Returns the socket and the time it took.
async fn dial(
    target: &Target,
    raw_url: &str,
    limit: Duration,
) -> Result<(Connection, Duration), ProbeResult> {
    let start = Instant::now();
    let protocol = target.protocol();
    let address = target.socket_address().ok_or_else(|| {
        ProbeResult::rejected(raw_url, start.elapsed(), format!("Invalid {protocol} URL format"))
    })?;

    let addr = resolve(&address, limit).await.map_err(|e| {
        ProbeResult::rejected(
            raw_url,
            start.elapsed(),
            format!("Failed to resolve {protocol} address: {}", error_chain(&e)),
        )
    })?;

    let connection = Connection::open(target, addr, limit).await.map_err(|e| {
        ProbeResult::rejected(
            raw_url,
            start.elapsed(),
            format!("Failed to connect to {protocol}: {}", error_chain(&e)),
        )
    })?;

    Ok((connection, start.elapsed()))
}

/// Connectivity check for socket targets: the socket can be opened in time.
pub async fn check_reachable(target: &Target, raw_url: &str, limit: Duration) -> ProbeResult {
    match dial(target, raw_url, limit).await {
        Ok((_, latency)) => ProbeResult::reachable(raw_url, latency, "OK"),
        Err(rejected) => rejected,
    }
}

/// Full probe for socket targets, estimating speed from connect latency.
pub async fn probe_socket(
    target: &Target,
    raw_url: &str,
    limit: Duration,
    config: &SocketConfig,
) -> ProbeResult {
    let (mut connection, connect_time) = match dial(target, raw_url, limit).await {
        Ok(dialed) => dialed,
        Err(rejected) => return rejected,
    };

    let (mut speed, label) = estimate_from_latency(connect_time, config);
    let mut detail = format!("{} ({label})", target.protocol());

    let deadline = Duration::from_millis(config.write_deadline_ms);
    let written = timeout(deadline, connection.send_control(target, raw_url)).await;
    if !matches!(written, Ok(Ok(()))) {
        speed *= 0.5;
        detail.push_str(" - Write failed");
    }
    log::debug!("{raw_url}: connected in {connect_time:?}, {detail}");

    let download_time = if speed > 0.0 {
        Duration::from_secs_f64(SAMPLE_BYTES as f64 / 1024.0 / speed)
    } else {
        Duration::ZERO
    };

    ProbeResult::measured(
        raw_url,
        connect_time,
        Measurement {
            speed,
            data_size: SAMPLE_BYTES,
            download_time,
            detail,
        },
    )
}
