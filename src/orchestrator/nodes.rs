//! The running network function instances

use super::function::{FunctionType, WorkloadHandle};
use crate::protocol::EndpointDesc;

use std::collections::BTreeMap;

/// A running network function instance
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    function: FunctionType,
    handle: WorkloadHandle,
    iface: EndpointDesc,
    uses: usize,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> FunctionType {
        self.function
    }

    pub fn handle(&self) -> &WorkloadHandle {
        &self.handle
    }

    /// The address the node got on attaching it to the switch
    pub fn iface(&self) -> &EndpointDesc {
        &self.iface
    }

    /// The number of chains containing the node
    pub fn uses(&self) -> usize {
        self.uses
    }
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Node>,
}

impl NodeRegistry {
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Adds an unused node
    pub(super) fn insert(
        &mut self,
        name: &str,
        function: FunctionType,
        handle: WorkloadHandle,
        iface: EndpointDesc,
    ) {
        let node = Node {
            name: name.to_owned(),
            function,
            handle,
            iface,
            uses: 0,
        };
        self.nodes.insert(name.to_owned(), node);
    }

    pub(super) fn remove(&mut self, name: &str) -> Option<Node> {
        self.nodes.remove(name)
    }

    pub(super) fn increment_use(&mut self, name: &str) {
        match self.nodes.get_mut(name) {
            Some(node) => node.uses += 1,
            None => error!("Cannot count a use of the unknown node {}", name),
        }
    }

    pub(super) fn decrement_use(&mut self, name: &str) {
        match self.nodes.get_mut(name) {
            Some(node) if node.uses > 0 => node.uses -= 1,
            Some(_) => error!("Node {} is not in use", name),
            None => error!("Cannot release the unknown node {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mac_address::MacAddress;
    use std::net::Ipv4Addr;

    fn registry() -> NodeRegistry {
        let mut nodes = NodeRegistry::default();
        let iface = EndpointDesc::new(Ipv4Addr::new(10, 0, 0, 2), MacAddress::new([2, 0, 0, 0, 0, 2]));
        nodes.insert("fw", FunctionType::Firewall, "c0ffee".to_owned(), iface);
        nodes
    }

    #[test]
    fn use_count() {
        let mut nodes = registry();
        assert_eq!(0, nodes.get("fw").unwrap().uses());
        nodes.increment_use("fw");
        nodes.increment_use("fw");
        nodes.decrement_use("fw");
        assert_eq!(1, nodes.get("fw").unwrap().uses());
    }

    #[test]
    fn use_count_does_not_underflow() {
        let mut nodes = registry();
        nodes.decrement_use("fw");
        assert_eq!(0, nodes.get("fw").unwrap().uses());
    }

    #[test]
    fn unknown_nodes_are_not_counted() {
        let mut nodes = registry();
        nodes.increment_use("nope");
        assert_eq!(1, nodes.len());
        assert!(!nodes.contains("nope"));
    }
}
