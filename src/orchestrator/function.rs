//! Network function types and the collaborators that run them

use crate::protocol::EndpointDesc;

use std::error;
use std::fmt;
use std::str::FromStr;

/// The kinds of virtual network functions that can be chained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionType {
    Firewall,
    RateLimiter,
    NetworkMonitoring,
}

struct FunctionInfo {
    typ: FunctionType,
    key: &'static str,
    display_name: &'static str,
    image: &'static str,
}

static FUNCTIONS: [FunctionInfo; 3] = [
    FunctionInfo {
        typ: FunctionType::Firewall,
        key: "firewall",
        display_name: "Firewall",
        image: "sfc/firewall",
    },
    FunctionInfo {
        typ: FunctionType::RateLimiter,
        key: "rate-limiter",
        display_name: "Rate Limiter",
        image: "sfc/rate-limiter",
    },
    FunctionInfo {
        typ: FunctionType::NetworkMonitoring,
        key: "network-monitoring",
        display_name: "Network Monitoring",
        image: "sfc/network-monitoring",
    },
];

impl FunctionType {
    fn info(self) -> &'static FunctionInfo {
        match self {
            FunctionType::Firewall => &FUNCTIONS[0],
            FunctionType::RateLimiter => &FUNCTIONS[1],
            FunctionType::NetworkMonitoring => &FUNCTIONS[2],
        }
    }

    /// The name used on the command line
    pub fn key(self) -> &'static str {
        self.info().key
    }

    pub fn display_name(self) -> &'static str {
        self.info().display_name
    }

    /// The workload image the function runs from
    pub fn image(self) -> &'static str {
        self.info().image
    }
}

impl FromStr for FunctionType {
    type Err = String;

    fn from_str(key: &str) -> Result<FunctionType, Self::Err> {
        FUNCTIONS
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.typ)
            .ok_or_else(|| key.to_owned())
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Identifies a running workload, assigned by `Workloads::create`
pub type WorkloadHandle = String;

/// A failure reported by a collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadError(pub String);

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Workload failure: {}", self.0)
    }
}

impl error::Error for WorkloadError {}

/// Starts and stops network function workloads
pub trait Workloads {
    fn create(&mut self, function: FunctionType, name: &str) -> Result<WorkloadHandle, WorkloadError>;

    /// Connects the workload to the switch and returns its address
    fn attach_to_network(&mut self, handle: &WorkloadHandle) -> Result<EndpointDesc, WorkloadError>;

    fn destroy(&mut self, handle: &WorkloadHandle) -> Result<(), WorkloadError>;
}

/// Knows how workloads and hosts are wired to the switch
pub trait Topology {
    /// The switch port a workload is connected to
    fn resolve_port(&self, handle: &WorkloadHandle) -> Option<u32>;

    /// The address of a host that is not a network function
    fn resolve_host(&self, name: &str) -> Option<EndpointDesc>;
}
