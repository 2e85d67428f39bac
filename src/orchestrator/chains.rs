//! The service chains of the orchestrated switch

use crate::protocol::ChainId;

use std::collections::BTreeMap;

/// An ordered sequence of node names
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    members: Vec<String>,
    uses: usize,
}

impl Chain {
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// The number of paths through the chain
    pub fn uses(&self) -> usize {
        self.uses
    }

    /// The members joined by arrows
    pub fn describe(&self) -> String {
        self.members.join(" -> ")
    }
}

#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainId, Chain>,
    seq: u64,
}

impl ChainRegistry {
    /// The id the next inserted chain gets on switch `dpid`
    pub(super) fn next_id(&self, dpid: u64) -> ChainId {
        format!("{:x}-{:x}", dpid, self.seq)
    }

    pub fn get(&self, id: &str) -> Option<&Chain> {
        self.chains.get(id)
    }

    /// All chains ordered by id
    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &Chain)> {
        self.chains.iter()
    }

    /// The ids of all chains with the node `name`
    pub fn containing(&self, name: &str) -> Vec<ChainId> {
        self.chains
            .iter()
            .filter(|&(_, chain)| chain.members.iter().any(|m| m == name))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Adds an unused chain and advances the id sequence
    pub(super) fn insert(&mut self, id: ChainId, members: Vec<String>) {
        self.seq += 1;
        self.chains.insert(id, Chain { members, uses: 0 });
    }

    pub(super) fn remove(&mut self, id: &str) -> Option<Chain> {
        self.chains.remove(id)
    }

    pub(super) fn increment_use(&mut self, id: &str) {
        match self.chains.get_mut(id) {
            Some(chain) => chain.uses += 1,
            None => error!("Cannot count a use of the unknown chain {}", id),
        }
    }

    pub(super) fn decrement_use(&mut self, id: &str) {
        match self.chains.get_mut(id) {
            Some(chain) if chain.uses > 0 => chain.uses -= 1,
            Some(_) => error!("Chain {} is not in use", id),
            None => error!("Cannot release the unknown chain {}", id),
        }
    }
}
