//! Controller discovery announcements.
//!
//! # How the announce/listen exchange works (for beginners)
//!
//! The appliance does not answer search requests.  Instead the controller
//! *announces itself* with a NOTIFY-style UDP datagram broadcast on each
//! candidate interface, and the appliance (if it is on that subnet)
//! responds with its own advertisement datagram.  The broadcast address is
//! derived with the legacy classful rule ([`broadcast_for`]); the vendor
//! firmware predates CIDR and expects exactly that.
//!
//! One outbound datagram per call; no response is awaited here.  The
//! receive side lives in [`super::discovery`].

use std::io;
use std::net::Ipv4Addr;

use aircon_core::broadcast_for;
use tokio::net::UdpSocket;
use tracing::debug;

/// Fixed HOST header of every announcement.
pub const SSDP_HOST: &str = "239.255.255.250:1900";

/// Fixed CACHE-CONTROL header of every announcement.
pub const CACHE_CONTROL: &str = "max-age=20";

/// SERVER signature string the appliance recognises.
pub const SERVER_SIGNATURE: &str = "AIR CONDITIONER";

/// Extra headers identifying a controller start announcement.
pub const CONTROLLER_HEADERS: [(&str, &str); 3] = [
    ("SPEC_VER", "MSpec-1.00"),
    ("SERVICE_NAME", "ControlServer-MLib"),
    ("MESSAGE_TYPE", "CONTROLLER_START"),
];

/// Builds a NOTIFY-style announcement datagram.
///
/// Fixed request line, fixed header block (HOST, CACHE-CONTROL, SERVER,
/// LOCATION = the announcing interface address), then the caller's extra
/// headers, terminated by a blank line.  CRLF line endings throughout.
pub fn build_announcement(location: Ipv4Addr, extra_headers: &[(&str, &str)]) -> Vec<u8> {
    let mut out = String::from("NOTIFY * HTTP/1.1\r\n");
    out.push_str(&format!("HOST: {SSDP_HOST}\r\n"));
    out.push_str(&format!("CACHE-CONTROL: {CACHE_CONTROL}\r\n"));
    out.push_str(&format!("SERVER: {SERVER_SIGNATURE}\r\n"));
    out.push_str(&format!("LOCATION: {location}\r\n"));
    for (key, value) in extra_headers {
        out.push_str(&format!("{key}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Sends `announcement` by UDP broadcast from `interface_address` to that
/// address's classful broadcast address on `port`.
pub async fn send(
    interface_address: Ipv4Addr,
    port: u16,
    announcement: &[u8],
) -> io::Result<()> {
    let socket = UdpSocket::bind((interface_address, 0)).await?;
    socket.set_broadcast(true)?;
    let broadcast = broadcast_for(interface_address);
    socket.send_to(announcement, (broadcast, port)).await?;
    debug!(%interface_address, %broadcast, port, "sent controller announcement");
    Ok(())
}

/// Builds and sends the standard controller-start announcement for one
/// interface.
pub async fn announce_controller(interface_address: Ipv4Addr, port: u16) -> io::Result<()> {
    let announcement = build_announcement(interface_address, &CONTROLLER_HEADERS);
    send(interface_address, port, &announcement).await
}
