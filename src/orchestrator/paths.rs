//! The service paths of the orchestrated switch

use crate::protocol::{ChainId, EndpointDesc};

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Traffic from `source` to `destination` steered through a chain
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub source_name: String,
    pub destination_name: String,
    pub source: EndpointDesc,
    pub destination: EndpointDesc,
    pub chain_id: ChainId,
}

/// Paths by source and destination IP address.
/// (a, b) and (b, a) are different paths.
#[derive(Debug, Default)]
pub struct PathRegistry {
    paths: BTreeMap<(Ipv4Addr, Ipv4Addr), Path>,
}

impl PathRegistry {
    pub fn get(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<&Path> {
        self.paths.get(&(src, dst))
    }

    pub fn contains(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.paths.contains_key(&(src, dst))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.values()
    }

    /// The keys of all paths through the chain `id`
    pub fn using(&self, id: &str) -> Vec<(Ipv4Addr, Ipv4Addr)> {
        self.paths
            .iter()
            .filter(|&(_, path)| path.chain_id == id)
            .map(|(&key, _)| key)
            .collect()
    }

    pub(super) fn insert(&mut self, path: Path) {
        self.paths.insert((path.source.ip, path.destination.ip), path);
    }

    pub(super) fn remove(&mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<Path> {
        self.paths.remove(&(src, dst))
    }
}
