//! Host identity of the machine running the monitor

use crate::models::HostInfo;
use std::net::UdpSocket;
use std::path::Path;

const HOSTNAME_FILE: &str = "/etc/hostname";
const UNKNOWN_HOST: &str = "unknown";

/// Detect hostname, outbound address and platform of the local machine
pub fn detect() -> HostInfo {
    HostInfo {
        hostname: hostname_from(std::env::var("HOSTNAME").ok(), Path::new(HOSTNAME_FILE)),
        ip_addresses: outbound_ip().into_iter().collect(),
        platform: platform(),
    }
}

fn hostname_from(env: Option<String>, file: &Path) -> String {
    env.map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string(file)
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

/// Address of the interface used for outbound traffic. Connecting a UDP
/// socket sends nothing.
fn outbound_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

fn platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
