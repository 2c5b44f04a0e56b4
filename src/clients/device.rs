//! Wake-on-LAN device control.

use crate::error::HubError;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::info;

/// The device-control boundary: wake a named device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Wake the device registered under `name`.
    async fn wake(&self, name: String) -> Result<(), HubError>;
}

/// A wakeable device from settings.
#[derive(Debug, Clone)]
pub struct Device {
    /// Name used in callbacks and settings.
    pub name: String,
    /// MAC address, colon- or dash-separated.
    pub mac: String,
}

/// Broadcast wake-on-LAN implementation.
pub struct WolDeviceService {
    devices: Vec<Device>,
}

impl WolDeviceService {
    /// Service over the configured device list.
    #[must_use]
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }
}

fn parse_mac(mac: &str) -> Result<[u8; 6], HubError> {
    let octets: Vec<u8> = mac
        .split(|c| c == ':' || c == '-')
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<_, _>>()
        .map_err(|_| HubError::WrongFormat(format!("MAC-адрес: {mac}")))?;
    octets
        .try_into()
        .map_err(|_| HubError::WrongFormat(format!("MAC-адрес: {mac}")))
}

fn magic_packet(mac: [u8; 6]) -> Vec<u8> {
    let mut packet = vec![0xFF; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&mac);
    }
    packet
}

#[async_trait]
impl DeviceService for WolDeviceService {
    async fn wake(&self, name: String) -> Result<(), HubError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| HubError::NotFound(format!("устройство «{name}»")))?;
        let packet = magic_packet(parse_mac(&device.mac)?);

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        socket.send_to(&packet, ("255.255.255.255", 9)).await?;
        info!(device = %name, "wake-on-LAN packet sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_packet_shape() -> Result<(), HubError> {
        let mac = parse_mac("aa:bb:cc:dd:ee:ff")?;
        let packet = magic_packet(mac);
        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        assert_eq!(&packet[6..12], &mac);
        assert_eq!(&packet[96..], &mac);
        Ok(())
    }

    #[test]
    fn bad_mac_is_wrong_format() {
        assert!(matches!(parse_mac("not-a-mac"), Err(HubError::WrongFormat(_))));
        assert!(matches!(parse_mac("aa:bb:cc"), Err(HubError::WrongFormat(_))));
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let service = WolDeviceService::new(vec![]);
        let result = service.wake("nas".to_string()).await;
        assert!(matches!(result, Err(HubError::NotFound(_))));
    }
}
