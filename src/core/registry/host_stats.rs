//! Host statistics attached to every heartbeat

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use sysinfo::System;

use crate::domain::entities::HostStats;

/// Samples CPU, memory and load figures for the local host.
///
/// CPU usage is computed between two refreshes, so the first sample after
/// construction reads close to zero.
pub struct HostStatsCollector {
    system: System,
}

impl HostStatsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        Self { system }
    }

    pub fn collect(&mut self) -> HostStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();

        HostStats {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: System::host_name(),
            cpu_count: self.system.cpus().len(),
            cpu_usage_percent: self.system.global_cpu_usage(),
            memory_used_bytes: self.system.used_memory(),
            memory_total_bytes: self.system.total_memory(),
            load_average_one: System::load_average().one,
            uptime_seconds: System::uptime(),
        }
    }
}

impl Default for HostStatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

pub fn local_hostname() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Address other processes would use to reach this host.
///
/// Connecting a UDP socket sends no packet; it only asks the OS which local
/// interface routes outward.
pub fn local_ip_address() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_package_version() {
        let stats = HostStatsCollector::new().collect();
        assert_eq!(stats.version, env!("CARGO_PKG_VERSION"));
        assert!(stats.memory_total_bytes >= stats.memory_used_bytes);
    }
}
