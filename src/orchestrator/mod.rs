/*!
The orchestrator's view on service function chaining

An `Orchestrator` owns the registries of network function nodes, chains and
paths of one switch. Every operation first validates its arguments, then
tells the switch's flow controller about the change and only then updates the
registries, so a failed operation leaves everything as it was.
*/

pub mod chains;
pub mod function;
pub mod nodes;
pub mod paths;

use self::chains::ChainRegistry;
use self::function::{FunctionType, Topology, WorkloadError, Workloads};
use self::nodes::{Node, NodeRegistry};
use self::paths::{Path, PathRegistry};

use crate::northbound;
use crate::northbound::client::ControlChannel;
use crate::protocol::{ChainId, EndpointDesc, Message};

use std::error;
use std::fmt;
use std::net::Ipv4Addr;
use std::result;
use std::str::FromStr;

#[derive(Debug)]
pub enum Error {
    UnknownFunctionType(String),
    UnknownNode(String),
    UnknownChain(ChainId),
    /// Neither a node nor a host known to the topology
    UnknownEndpoint(String),
    UnknownPath(String, String),
    EmptyChain,
    DuplicatePath(String, String),
    /// The node is member of the given number of chains
    NodeInUse(String, usize),
    /// The chain is used by the given number of paths
    ChainInUse(ChainId, usize),
    /// There is no connection to a flow controller
    NotConnected,
    Workload(WorkloadError),
    Northbound(northbound::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnknownFunctionType(ref t) => write!(f, "'{}' is not a network function type", t),
            Error::UnknownNode(ref n) => write!(f, "There is no node named '{}'", n),
            Error::UnknownChain(ref c) => write!(f, "There is no chain with id {}", c),
            Error::UnknownEndpoint(ref e) => write!(f, "'{}' is neither a node nor a known host", e),
            Error::UnknownPath(ref s, ref d) => write!(f, "There is no path from {} to {}", s, d),
            Error::EmptyChain => write!(f, "A chain needs at least one node"),
            Error::DuplicatePath(ref s, ref d) => {
                write!(f, "There already is a path from {} to {}", s, d)
            }
            Error::NodeInUse(ref n, uses) => write!(f, "Node {} is in use by {} chain(s)", n, uses),
            Error::ChainInUse(ref c, uses) => write!(f, "Chain {} is in use by {} path(s)", c, uses),
            Error::NotConnected => write!(f, "Not connected to a flow controller"),
            Error::Workload(ref e) => write!(f, "{}", e),
            Error::Northbound(ref e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Workload(ref e) => Some(e),
            Error::Northbound(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<WorkloadError> for Error {
    fn from(e: WorkloadError) -> Self {
        Error::Workload(e)
    }
}

impl From<northbound::Error> for Error {
    fn from(e: northbound::Error) -> Self {
        Error::Northbound(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// How a successful operation changed the registries
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Done,
    /// Nothing had to be done
    AlreadySatisfied,
}

/// A node as shown to the operator
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescription {
    pub name: String,
    pub function: FunctionType,
    pub iface: EndpointDesc,
    /// The switch port, if the topology knows it
    pub port: Option<u32>,
}

/// A path as shown to the operator
#[derive(Debug, Clone, PartialEq)]
pub struct PathDescription {
    pub source: String,
    pub destination: String,
    pub chain_id: ChainId,
    /// The chain's members joined by arrows
    pub chain: String,
}

pub struct Orchestrator<W: Workloads, T: Topology> {
    workloads: W,
    topology: T,
    channel: Option<Box<dyn ControlChannel + Send>>,
    nodes: NodeRegistry,
    chains: ChainRegistry,
    paths: PathRegistry,
}

impl<W: Workloads, T: Topology> Orchestrator<W, T> {
    /// Creates an orchestrator without nodes and without flow controller connection
    pub fn new(workloads: W, topology: T) -> Orchestrator<W, T> {
        Orchestrator {
            workloads,
            topology,
            channel: None,
            nodes: NodeRegistry::default(),
            chains: ChainRegistry::default(),
            paths: PathRegistry::default(),
        }
    }

    pub fn workloads(&self) -> &W {
        &self.workloads
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    /// Uses `channel` for all further messages to the flow controller
    pub fn connect(&mut self, channel: Box<dyn ControlChannel + Send>) {
        info!("Orchestrating switch {:x}", channel.dpid());
        if self.channel.is_some() {
            if let Err(e) = self.disconnect() {
                warn!("Could not say goodbye to the former flow controller: {}", e);
            }
        }
        self.channel = Some(channel);
    }

    /// Says goodbye to the flow controller and drops the connection
    pub fn disconnect(&mut self) -> Result<()> {
        match self.channel.take() {
            Some(mut channel) => {
                let bye = Message::bye(channel.dpid());
                channel.send(&bye)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn dpid(&self) -> Result<u64> {
        self.channel
            .as_ref()
            .map(|c| c.dpid())
            .ok_or(Error::NotConnected)
    }

    fn send(&mut self, msg: &Message) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(Error::NotConnected)?;
        channel.send(msg)?;
        Ok(())
    }

    /// Starts a network function of type `function` named `name`.
    /// Starting an existing name again is a no-op.
    pub fn start_node(&mut self, function: &str, name: &str) -> Result<Outcome> {
        let function = FunctionType::from_str(function).map_err(Error::UnknownFunctionType)?;
        if self.nodes.contains(name) {
            warn!("Node {} already exists", name);
            return Ok(Outcome::AlreadySatisfied);
        }

        let handle = self.workloads.create(function, name)?;
        let iface = match self.workloads.attach_to_network(&handle) {
            Ok(iface) => iface,
            Err(e) => {
                if let Err(destroy_err) = self.workloads.destroy(&handle) {
                    warn!("Could not clean up workload {}: {}", handle, destroy_err);
                }
                return Err(e.into());
            }
        };
        info!("Started {} node {} at {}", function.display_name(), name, iface);
        self.nodes.insert(name, function, handle, iface);
        Ok(Outcome::Done)
    }

    /// Stops a node. Without `force` a node that is part of a chain is kept,
    /// with `force` its chains and their paths are removed first.
    pub fn remove_node(&mut self, name: &str, force: bool) -> Result<()> {
        let uses = self
            .nodes
            .get(name)
            .map(Node::uses)
            .ok_or_else(|| Error::UnknownNode(name.to_owned()))?;
        if uses > 0 {
            if !force {
                return Err(Error::NodeInUse(name.to_owned(), uses));
            }
            for id in self.chains.containing(name) {
                if let Err(e) = self.remove_chain(&id, true) {
                    warn!("Could not remove chain {} of node {}: {}", id, name, e);
                }
            }
            let uses = self.nodes.get(name).map_or(0, Node::uses);
            if uses > 0 {
                return Err(Error::NodeInUse(name.to_owned(), uses));
            }
        }

        if let Some(node) = self.nodes.get(name) {
            self.workloads.destroy(node.handle())?;
        }
        self.nodes.remove(name);
        info!("Removed node {}", name);
        Ok(())
    }

    /// All nodes ordered by name
    pub fn describe_nodes(&self) -> Vec<NodeDescription> {
        self.nodes
            .iter()
            .map(|node| NodeDescription {
                name: node.name().to_owned(),
                function: node.function(),
                iface: *node.iface(),
                port: self.topology.resolve_port(node.handle()),
            })
            .collect()
    }

    fn member_ifaces(&self, names: &[String]) -> Result<Vec<EndpointDesc>> {
        names
            .iter()
            .map(|name| {
                self.nodes
                    .get(name)
                    .map(|node| *node.iface())
                    .ok_or_else(|| Error::UnknownNode(name.clone()))
            })
            .collect()
    }

    /// Chains the named nodes in the given order and returns the chain's id
    pub fn create_chain(&mut self, names: &[&str]) -> Result<ChainId> {
        if names.is_empty() {
            return Err(Error::EmptyChain);
        }
        let names: Vec<String> = names.iter().map(|&n| n.to_owned()).collect();
        let ifaces = self.member_ifaces(&names)?;
        let dpid = self.dpid()?;
        let id = self.chains.next_id(dpid);

        self.send(&Message::add_chain(dpid, &id, ifaces))?;

        for name in &names {
            self.nodes.increment_use(name);
        }
        info!("Created chain {}: {}", id, names.join(" -> "));
        self.chains.insert(id.clone(), names);
        Ok(id)
    }

    /// Removes a chain. Without `force` a chain with paths is kept,
    /// with `force` its paths are removed first.
    pub fn remove_chain(&mut self, id: &str, force: bool) -> Result<()> {
        let uses = self
            .chains
            .get(id)
            .map(|c| c.uses())
            .ok_or_else(|| Error::UnknownChain(id.to_owned()))?;
        let dpid = self.dpid()?;
        if uses > 0 {
            if !force {
                return Err(Error::ChainInUse(id.to_owned(), uses));
            }
            for (src, dst) in self.paths.using(id) {
                if let Err(e) = self.remove_path_by_key(src, dst) {
                    warn!("Could not remove path {} -> {} of chain {}: {}", src, dst, id, e);
                }
            }
            let uses = self.chains.get(id).map_or(0, |c| c.uses());
            if uses > 0 {
                return Err(Error::ChainInUse(id.to_owned(), uses));
            }
        }

        self.send(&Message::del_chain(dpid, id))?;

        if let Some(chain) = self.chains.remove(id) {
            for name in chain.members() {
                self.nodes.decrement_use(name);
            }
        }
        info!("Removed chain {}", id);
        Ok(())
    }

    /// All chains with their member names ordered by id
    pub fn list_chains(&self) -> Vec<(ChainId, Vec<String>)> {
        self.chains
            .iter()
            .map(|(id, chain)| (id.clone(), chain.members().to_vec()))
            .collect()
    }

    /// The address of a node or of a host known to the topology
    fn resolve_endpoint(&self, name: &str) -> Result<EndpointDesc> {
        if let Some(node) = self.nodes.get(name) {
            return Ok(*node.iface());
        }
        self.topology
            .resolve_host(name)
            .ok_or_else(|| Error::UnknownEndpoint(name.to_owned()))
    }

    /// Steers the traffic from `src` to `dst` through the chain `chain_id`
    pub fn create_path(&mut self, src: &str, dst: &str, chain_id: &str) -> Result<()> {
        let source = self.resolve_endpoint(src)?;
        let destination = self.resolve_endpoint(dst)?;
        if self.paths.contains(source.ip, destination.ip) {
            return Err(Error::DuplicatePath(src.to_owned(), dst.to_owned()));
        }
        if self.chains.get(chain_id).is_none() {
            return Err(Error::UnknownChain(chain_id.to_owned()));
        }

        let dpid = self.dpid()?;
        self.send(&Message::add_path(dpid, source, destination, chain_id))?;

        self.chains.increment_use(chain_id);
        self.paths.insert(Path {
            source_name: src.to_owned(),
            destination_name: dst.to_owned(),
            source,
            destination,
            chain_id: chain_id.to_owned(),
        });
        info!("Created path {} -> {} through chain {}", src, dst, chain_id);
        Ok(())
    }

    /// Stops steering the traffic from `src` to `dst` through a chain
    pub fn remove_path(&mut self, src: &str, dst: &str) -> Result<()> {
        let unknown = || Error::UnknownPath(src.to_owned(), dst.to_owned());
        let source = self.resolve_endpoint(src).map_err(|_| unknown())?;
        let destination = self.resolve_endpoint(dst).map_err(|_| unknown())?;
        if !self.paths.contains(source.ip, destination.ip) {
            return Err(unknown());
        }
        self.remove_path_by_key(source.ip, destination.ip)
    }

    fn remove_path_by_key(&mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Result<()> {
        let (source, destination, chain_id) = match self.paths.get(src, dst) {
            Some(path) => (path.source, path.destination, path.chain_id.clone()),
            None => return Err(Error::UnknownPath(src.to_string(), dst.to_string())),
        };
        let dpid = self.dpid()?;
        self.send(&Message::del_path(dpid, source, destination))?;

        self.paths.remove(src, dst);
        self.chains.decrement_use(&chain_id);
        info!("Removed path {} -> {}", src, dst);
        Ok(())
    }

    /// All paths ordered by source and destination address
    pub fn list_paths(&self) -> Vec<PathDescription> {
        self.paths
            .iter()
            .map(|path| PathDescription {
                source: path.source_name.clone(),
                destination: path.destination_name.clone(),
                chain_id: path.chain_id.clone(),
                chain: self
                    .chains
                    .get(&path.chain_id)
                    .map(|c| c.describe())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Sends every chain and path again, e.g. after the flow controller lost its state
    pub fn replay(&mut self) -> Result<()> {
        let dpid = self.dpid()?;
        let mut msgs = vec![];
        for (id, chain) in self.chains.iter() {
            msgs.push(Message::add_chain(dpid, id, self.member_ifaces(chain.members())?));
        }
        for path in self.paths.iter() {
            msgs.push(Message::add_path(dpid, path.source, path.destination, &path.chain_id));
        }
        info!("Replaying {} message(s) to switch {:x}", msgs.len(), dpid);
        for msg in &msgs {
            self.send(msg)?;
        }
        Ok(())
    }
}
