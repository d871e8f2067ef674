//! ICMP echo prober with a `ping` command fallback.
//!
//! Native echo runs on a blocking thread via `spawn_blocking`; hosts where
//! ICMP sockets are not permitted fall back to the system `ping` binary.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::{ConnectivityProber, ProbeError};
use crate::logging::Logger;

static ECHO_SEQUENCE: AtomicU16 = AtomicU16::new(0);
static NATIVE_ICMP: OnceLock<bool> = OnceLock::new();

/// Probes hosts with a single echo request.
#[derive(Debug, Clone)]
pub struct PingProber {
    timeout: Duration,
    logger: Logger,
}

impl PingProber {
    pub fn new(timeout: Duration, logger: Logger) -> Self {
        Self { timeout, logger }
    }
}

#[async_trait]
impl ConnectivityProber for PingProber {
    async fn probe(&self, host: &str) -> bool {
        match ping(host, self.timeout).await {
            Ok(rtt) => {
                self.logger.verbose(&format!("{} answered in {:?}", host, rtt));
                true
            }
            Err(e) => {
                self.logger.warning(&format!("{} is not reachable: {}", host, e));
                false
            }
        }
    }
}

fn native_icmp_available() -> bool {
    *NATIVE_ICMP.get_or_init(|| {
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok()
            || Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok()
    })
}

/// Send one echo request and return the round-trip time.
pub async fn ping(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    if !native_icmp_available() {
        return ping_command(host, timeout).await;
    }

    let ip = resolve(host).await?;
    let result = tokio::task::spawn_blocking(move || echo(ip, timeout))
        .await
        .map_err(|e| ProbeError::Network(format!("echo task failed: {}", e)))?;

    match result {
        Err(ProbeError::Network(msg))
            if msg.contains("denied") || msg.contains("not permitted") =>
        {
            ping_command(host, timeout).await
        }
        other => other,
    }
}

async fn resolve(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host(format!("{}:0", host))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("no addresses found for {}", host)))
}

fn echo(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let (domain, protocol, request_type, reply_type) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4, 8u8, 0u8),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6, 128u8, 129u8),
    };
    let net_err = |what: &str, e: std::io::Error| ProbeError::Network(format!("{}: {}", what, e));

    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::RAW, Some(protocol)))
        .map_err(|e| net_err("cannot open ICMP socket", e))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| net_err("connect", e))?;

    let identifier: u16 = rand::random();
    let sequence = ECHO_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let packet = echo_request(request_type, identifier, sequence, ip.is_ipv4());

    let start = Instant::now();
    socket.send(&packet).map_err(|e| net_err("send", e))?;

    let mut buf = [0u8; 1500];
    loop {
        let remaining = timeout
            .checked_sub(start.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or(ProbeError::Timeout(timeout))?;
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| net_err("set timeout", e))?;

        let len = (&socket).read(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                ProbeError::Timeout(timeout)
            }
            _ => net_err("receive", e),
        })?;
        let elapsed = start.elapsed();

        // RAW v4 sockets deliver the IP header too
        let offset = if ip.is_ipv4() && len > 0 && buf[0] >> 4 == 4 { 20 } else { 0 };
        if is_reply(&buf[..len], offset, reply_type, identifier, sequence) {
            return Ok(elapsed);
        }
    }
}

fn is_reply(buf: &[u8], offset: usize, reply_type: u8, identifier: u16, sequence: u16) -> bool {
    if buf.len() < offset + 8 {
        return false;
    }
    let icmp = &buf[offset..];
    // DGRAM sockets rewrite the identifier, so only the sequence is reliable there
    let id_matches = offset == 0 || u16::from_be_bytes([icmp[4], icmp[5]]) == identifier;
    icmp[0] == reply_type && id_matches && u16::from_be_bytes([icmp[6], icmp[7]]) == sequence
}

fn echo_request(kind: u8, identifier: u16, sequence: u16, with_checksum: bool) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = kind;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    packet[8..].iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);

    // The kernel fills in ICMPv6 checksums
    if with_checksum {
        let sum = checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

/// RFC 1071 internet checksum.
fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => (*hi as u32) << 8,
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

async fn ping_command(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let secs = timeout.as_secs().max(1).to_string();
    let output = Command::new("ping")
        .args(["-c", "1", "-W", &secs, host])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        if stdout.contains("100% packet loss") || stdout.contains("100.0% packet loss") {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping exited with {}", output.status)));
    }

    parse_reply_time(&stdout)
        .ok_or_else(|| ProbeError::Command(format!("unrecognized ping output: {}", stdout.trim())))
}

/// Extract the round-trip time from `ping` output (per-reply `time=` or the summary line).
fn parse_reply_time(output: &str) -> Option<Duration> {
    static REPLY: OnceLock<Regex> = OnceLock::new();
    static SUMMARY: OnceLock<Regex> = OnceLock::new();

    let reply = REPLY.get_or_init(|| {
        Regex::new(r"time[=<](?P<ms>[0-9.]+)\s*ms").expect("valid reply regex")
    });
    let summary = SUMMARY.get_or_init(|| {
        Regex::new(r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = [0-9.]+/(?P<ms>[0-9.]+)/")
            .expect("valid summary regex")
    });

    reply
        .captures(output)
        .or_else(|| summary.captures(output))
        .and_then(|caps| caps.name("ms")?.as_str().parse::<f64>().ok())
        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_verifies() {
        let packet = echo_request(8, 0x1234, 1, true);
        // A packet including its own checksum sums to zero
        assert_eq!(checksum(&packet), 0);
    }

    #[test]
    fn test_echo_request_layout() {
        let packet = echo_request(128, 0xBEEF, 7, false);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 128);
        assert_eq!(packet[2..4], [0, 0]);
        assert_eq!(packet[4..6], [0xBE, 0xEF]);
        assert_eq!(packet[6..8], [0, 7]);
    }

    #[test]
    fn test_is_reply() {
        let mut reply = echo_request(0, 0x1234, 9, true);
        assert!(is_reply(&reply, 0, 0, 0x1234, 9));
        assert!(!is_reply(&reply, 0, 0, 0x1234, 10));
        reply[0] = 3;
        assert!(!is_reply(&reply, 0, 0, 0x1234, 9));
        assert!(!is_reply(&reply[..4], 0, 0, 0x1234, 9));
    }

    #[test]
    fn test_parse_linux_reply() {
        let out = "64 bytes from 10.0.0.5: icmp_seq=1 ttl=64 time=0.412 ms";
        let rtt = parse_reply_time(out).unwrap();
        assert!((rtt.as_secs_f64() - 0.000412).abs() < 1e-9);
    }

    #[test]
    fn test_parse_summary_only() {
        let out = "--- web01 ping statistics ---\n\
                   1 packets transmitted, 1 packets received, 0.0% packet loss\n\
                   round-trip min/avg/max/stddev = 1.500/2.500/3.500/0.000 ms";
        let rtt = parse_reply_time(out).unwrap();
        assert!((rtt.as_secs_f64() - 0.0025).abs() < 1e-9);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_reply_time("Request timeout for icmp_seq 0").is_none());
    }
}
