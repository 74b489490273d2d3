use super::{ReferenceSetMonitor, ReferenceSource};
use crate::config::MonitorConfig;
use crate::reference::{HostRef, Network, VmRef};
use anyhow::Result;
use std::time::Duration;

/// VMs appearing and disappearing on a host
pub type HostMonitor = ReferenceSetMonitor<HostRef, VmRef>;

/// Hosts appearing and disappearing on the network
pub type NetworkMonitor = ReferenceSetMonitor<Network, HostRef>;

/// Build a host monitor ticking at `host_poll_interval_ms`.
pub fn host_monitor(source: impl ReferenceSource<HostRef, VmRef>, config: &MonitorConfig) -> HostMonitor {
    ReferenceSetMonitor::new(source, Duration::from_millis(config.host_poll_interval_ms))
}

/// Build a network monitor ticking at `network_poll_interval_ms`.
pub fn network_monitor(
    source: impl ReferenceSource<Network, HostRef>,
    config: &MonitorConfig,
) -> NetworkMonitor {
    ReferenceSetMonitor::new(source, Duration::from_millis(config.network_poll_interval_ms))
}

impl ReferenceSetMonitor<HostRef, VmRef> {
    /// VMs currently on `host` that match `filter`
    pub fn virtual_machines<P>(&self, host: &HostRef, filter: P) -> Result<Vec<VmRef>>
    where
        P: Fn(&VmRef) -> bool,
    {
        self.query(host, filter)
    }
}

impl ReferenceSetMonitor<Network, HostRef> {
    /// Hosts currently on the network that match `filter`
    pub fn hosts<P>(&self, filter: P) -> Result<Vec<HostRef>>
    where
        P: Fn(&HostRef) -> bool,
    {
        self.query(&Network, filter)
    }
}
