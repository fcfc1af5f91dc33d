use std::net::{IpAddr, Ipv4Addr};

use tickwire::{SyncConfig, UdpConfig};

pub const DEFAULT_PORT: u16 = 27_960;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub objects: usize,
    /// Stop after this many ticks; run forever when `None`.
    pub ticks: Option<u64>,
    pub sync: SyncConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            objects: 8,
            ticks: None,
            sync: SyncConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn udp(&self) -> UdpConfig {
        UdpConfig {
            bind_address: self.bind,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinConfig {
    pub endpoint: String,
    /// Stop after this many applied ticks; run forever when `None`.
    pub ticks: Option<u64>,
    pub sync: SyncConfig,
}
