// Monitored entity identities (hosts and VMs)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Identity of a monitored entity.
///
/// Reference sets are diffed by membership, so equality and hashing must
/// describe identity and nothing else. Implemented for every type that meets
/// the bounds.
pub trait Reference: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Reference for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// A host running an agent
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostRef {
    /// Agent identifier (unique per agent process)
    pub agent_id: String,

    /// Host name as reported by the agent
    pub name: String,
}

impl HostRef {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.agent_id)
    }
}

/// A Java virtual machine running on a host
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmRef {
    /// Host the VM runs on
    pub host: HostRef,

    /// VM identifier assigned by the agent
    pub vm_id: String,

    /// Process id on the host
    pub pid: u32,

    /// Main class or command line summary
    pub name: String,
}

impl VmRef {
    pub fn new(host: HostRef, vm_id: impl Into<String>, pid: u32, name: impl Into<String>) -> Self {
        Self {
            host,
            vm_id: vm_id.into(),
            pid,
            name: name.into(),
        }
    }
}

impl fmt::Display for VmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [pid {}] on {}", self.name, self.pid, self.host.name)
    }
}

/// Polling target for host discovery. There is exactly one network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Network;
