//! Two-byte marker reports sent to a remote listener.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tracing::{debug, warn};

use crate::detect::Detection;
use crate::traits::{CameraError, Result};

/// Per-frame result: `[id, found]`, with id 0 when nothing was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkerReport {
    /// Marker id, if one was found.
    pub id: Option<u8>,
}

impl MarkerReport {
    /// Report for a frame without a marker.
    pub const NOT_FOUND: Self = Self { id: None };

    /// Build a report from the selected detection of a frame.
    ///
    /// Ids that do not fit the one-byte record are reported as not found.
    pub fn from_detection(detection: Option<&Detection>) -> Self {
        let Some(detection) = detection else {
            return Self::NOT_FOUND;
        };
        match u8::try_from(detection.id) {
            Ok(id) => Self { id: Some(id) },
            Err(_) => {
                warn!(id = detection.id, "marker id does not fit a telemetry record");
                Self::NOT_FOUND
            }
        }
    }

    /// Wire encoding.
    pub fn to_bytes(self) -> [u8; 2] {
        match self.id {
            Some(id) => [id, 1],
            None => [0, 0],
        }
    }
}

/// Destination for marker reports.
pub trait TelemetrySink {
    /// Send one report.
    fn send(&mut self, report: MarkerReport) -> Result<()>;
}

/// Sends each report as a single UDP datagram.
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    /// Bind an ephemeral local socket that reports to `target`.
    pub fn connect(target: SocketAddr) -> Result<Self> {
        let local = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).map_err(CameraError::Telemetry)?;
        debug!(%target, local = ?socket.local_addr().ok(), "telemetry socket bound");

        Ok(Self { socket, target })
    }

    /// Where reports go.
    pub const fn target(&self) -> SocketAddr {
        self.target
    }
}

impl TelemetrySink for UdpSink {
    fn send(&mut self, report: MarkerReport) -> Result<()> {
        self.socket
            .send_to(&report.to_bytes(), self.target)
            .map_err(CameraError::Telemetry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_encoding() {
        assert_eq!(MarkerReport::NOT_FOUND.to_bytes(), [0, 0]);
        assert_eq!(MarkerReport { id: Some(7) }.to_bytes(), [7, 1]);
        assert_eq!(MarkerReport { id: Some(0) }.to_bytes(), [0, 1]);
    }

    #[test]
    fn test_from_detection() {
        let detection = Detection { id: 5, hamming: 0 };
        assert_eq!(MarkerReport::from_detection(Some(&detection)).id, Some(5));
        assert_eq!(MarkerReport::from_detection(None), MarkerReport::NOT_FOUND);

        let large = Detection { id: 300, hamming: 0 };
        assert_eq!(
            MarkerReport::from_detection(Some(&large)),
            MarkerReport::NOT_FOUND
        );
    }

    #[test]
    fn test_udp_sink_sends_record() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("set timeout");
        let target = receiver.local_addr().expect("local addr");

        let mut sink = UdpSink::connect(target).expect("connect");
        sink.send(MarkerReport { id: Some(3) }).expect("send");

        let mut buf = [0u8; 8];
        let (len, _) = receiver.recv_from(&mut buf).expect("recv");
        assert_eq!(buf.get(..len), Some(&[3u8, 1][..]));
    }
}
