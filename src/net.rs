use std::net::{IpAddr, UdpSocket};
use std::sync::OnceLock;

static LOCAL_IP: OnceLock<String> = OnceLock::new();

/// First non-loopback IPv4 address of this host, or an empty string.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub fn local_ipv4() -> String {
    LOCAL_IP.get_or_init(|| route_ip().unwrap_or_default()).clone()
}

fn route_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip.to_string()),
        _ => None,
    }
}
