/*!
The switch-side state of service function chaining

A `FlowController` is owned by exactly one OpenFlow session. It caches the
chains and paths announced by the orchestrator, discovers the switch ports
of the involved hosts with ARP and translates every path into one flow entry
per hop. Traffic that is not part of a service path is switched by L2
learning.
*/

use crate::conf::FlowConf;
use crate::openflow::gen_xid;
use crate::openflow::messages::serialize::OfpPacket;
use crate::openflow::messages::*;
use crate::packet::{self, EthernetFrame, Payload};
use crate::protocol::{ChainId, Command, EndpointDesc, Message};

use ipnetwork::Ipv4Network;
use mac_address::MacAddress;

use std::collections::HashMap;
use std::io;
use std::io::Write;
use std::net::Ipv4Addr;

/// Priority of the rule that catches replies to the controller's ARP requests
pub const ARP_PRIORITY: u16 = 0x9000;
/// Priority of service path rules
pub const PATH_PRIORITY: u16 = OFP_DEFAULT_PRIORITY;
/// Priority of the rule that hands a path's IPv4 traffic to the controller
/// while its hop rules are missing. Must stay above `L2_PRIORITY`.
pub const PATH_GUARD_PRIORITY: u16 = 0x200;
/// Priority of L2-learning rules
pub const L2_PRIORITY: u16 = 0x100;
/// Priority of the table-miss rule
pub const TABLE_MISS_PRIORITY: u16 = 0;

/// A host on the data plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    /// The switch port the host is connected to, if already discovered
    pub port: Option<u32>,
}

/// The flow entry steering a path's traffic from one hop to the next
#[derive(Debug, Clone, PartialEq)]
pub struct PathRule {
    pub in_port: u32,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub next_mac: MacAddress,
    pub out_port: u32,
}

impl PathRule {
    fn match_field(&self) -> OfpMatch {
        let mut match_field = OfpMatch::new();
        match_field
            .add_tlv(OfpOxmTlv::new_in_port(self.in_port))
            .add_tlv(OfpOxmTlv::new_eth_type(EtherType::Ipv4))
            .add_tlv(OfpOxmTlv::new_ipv4(&host(self.src), &ProtocolEndpoint::Src))
            .add_tlv(OfpOxmTlv::new_ipv4(&host(self.dst), &ProtocolEndpoint::Dst));
        match_field
    }

    fn actions(&self) -> Vec<OfpAction> {
        vec![
            OfpAction::set_eth_dst(&self.next_mac),
            OfpAction::output(self.out_port),
        ]
    }
}

fn host(ip: Ipv4Addr) -> Ipv4Network {
    Ipv4Network::from(ip)
}

/// Matches all IPv4 traffic from `src` to `dst` on any port
fn path_guard_match(src: Ipv4Addr, dst: Ipv4Addr) -> OfpMatch {
    let mut match_field = OfpMatch::new();
    match_field
        .add_tlv(OfpOxmTlv::new_eth_type(EtherType::Ipv4))
        .add_tlv(OfpOxmTlv::new_ipv4(&host(src), &ProtocolEndpoint::Src))
        .add_tlv(OfpOxmTlv::new_ipv4(&host(dst), &ProtocolEndpoint::Dst));
    match_field
}

/// A frame the switch handed to the controller
struct Received<'a> {
    in_port: u32,
    src: MacAddress,
    dst: MacAddress,
    data: &'a [u8],
}

pub struct FlowController<W: Write> {
    dpid: u64,
    out: W,
    conf: FlowConf,
    controller_ip: Option<Ipv4Addr>,
    endpoints: HashMap<Ipv4Addr, Endpoint>,
    chains: HashMap<ChainId, Vec<Ipv4Addr>>,
    paths: HashMap<(Ipv4Addr, Ipv4Addr), ChainId>,
    mac_to_port: HashMap<[u8; 6], u32>,
}

impl<W: Write> FlowController<W> {
    /// Creates the empty state of a switch that writes its OpenFlow messages to `out`
    pub fn new(dpid: u64, out: W, conf: FlowConf) -> FlowController<W> {
        let controller_ip = conf.controller.ip;
        FlowController {
            dpid,
            out,
            conf,
            controller_ip,
            endpoints: HashMap::new(),
            chains: HashMap::new(),
            paths: HashMap::new(),
            mac_to_port: HashMap::new(),
        }
    }

    pub fn dpid(&self) -> u64 {
        self.dpid
    }

    /// The MAC address that marks controller originated ARP traffic
    pub fn mac(&self) -> MacAddress {
        self.conf.controller.mac
    }

    pub fn controller_ip(&self) -> Option<Ipv4Addr> {
        self.controller_ip
    }

    pub fn endpoint(&self, ip: Ipv4Addr) -> Option<&Endpoint> {
        self.endpoints.get(&ip)
    }

    pub fn chain(&self, chain_id: &str) -> Option<&[Ipv4Addr]> {
        self.chains.get(chain_id).map(Vec::as_slice)
    }

    pub fn path(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<&ChainId> {
        self.paths.get(&(src, dst))
    }

    /// Installs the table-miss rule and the rule for replies to the controller's ARP requests
    pub fn connection_up(&mut self) -> io::Result<()> {
        info!("Installing the standing rules on switch {:x}", self.dpid);
        let to_controller = vec![OfpAction::Output(OfpActionOutput::new_to_controller())];
        self.send_flow_mod(
            OfpFlowModCommand::Add,
            OfpMatch::new(),
            to_controller.clone(),
            TABLE_MISS_PRIORITY,
            OFP_FLOW_PERMANENT,
        )?;

        let mut arp_match = OfpMatch::new();
        arp_match
            .add_tlv(OfpOxmTlv::new_eth_addr(&self.mac(), &ProtocolEndpoint::Dst))
            .add_tlv(OfpOxmTlv::new_eth_type(EtherType::Arp));
        self.send_flow_mod(
            OfpFlowModCommand::Add,
            arp_match,
            to_controller,
            ARP_PRIORITY,
            OFP_FLOW_PERMANENT,
        )
    }

    /// Registers a host. Known (ip, mac) pairs are left alone.
    /// Without a known `port` the host is asked for its port with an ARP request.
    pub fn add_endpoint(&mut self, desc: &EndpointDesc, port: Option<u32>) -> io::Result<Endpoint> {
        if let Some(known) = self.endpoints.get(&desc.ip) {
            if known.mac == desc.mac {
                return Ok(*known);
            }
            info!(
                "Host {} changed its MAC from {} to {}",
                desc.ip, known.mac, desc.mac
            );
        }
        let endpoint = Endpoint {
            ip: desc.ip,
            mac: desc.mac,
            port,
        };
        debug!("New endpoint {:?}", endpoint);
        self.endpoints.insert(desc.ip, endpoint);
        if port.is_none() {
            self.send_arp_request(desc.ip)?;
        }
        Ok(endpoint)
    }

    /// Records the port of a host that answered the controller's ARP request.
    /// Any other ARP reply is switched by L2 learning.
    fn handle_arp_reply(&mut self, src_ip: Ipv4Addr, received: &Received) -> io::Result<()> {
        if received.dst != self.mac() {
            return self.l2_fallback(received);
        }
        match self.endpoints.get_mut(&src_ip) {
            Some(endpoint) => {
                if endpoint.port != Some(received.in_port) {
                    info!("Host {} is connected to port {}", src_ip, received.in_port);
                }
                endpoint.port = Some(received.in_port);
            }
            None => {
                debug!("Ignoring ARP reply from unknown host {}", src_ip);
                return Ok(());
            }
        }

        // paths waiting for this host can go live now
        let waiting: Vec<_> = self
            .paths
            .keys()
            .filter(|&&(src, dst)| self.hops(src, dst).map_or(false, |h| h.contains(&src_ip)))
            .cloned()
            .collect();
        for (src, dst) in waiting {
            self.install_path_rules(src, dst)?;
        }
        Ok(())
    }

    /// Caches a chain and registers its members
    pub fn add_service_chain(&mut self, chain_id: &str, members: &[EndpointDesc]) -> io::Result<()> {
        for member in members {
            self.add_endpoint(member, None)?;
        }
        let ips = members.iter().map(|m| m.ip).collect();
        if self.chains.insert(chain_id.to_owned(), ips).is_some() {
            info!("Replaced the definition of chain {}", chain_id);
        }
        Ok(())
    }

    /// Removes a chain with all paths through it.
    /// Returns false if the chain is unknown.
    pub fn remove_service_chain(&mut self, chain_id: &str) -> io::Result<bool> {
        if !self.chains.contains_key(chain_id) {
            debug!("Chain {} is not known", chain_id);
            return Ok(false);
        }
        let using: Vec<_> = self
            .paths
            .iter()
            .filter(|&(_, id)| id == chain_id)
            .map(|(&key, _)| key)
            .collect();
        for (src, dst) in using {
            self.remove_service_path(src, dst)?;
        }
        self.chains.remove(chain_id);
        Ok(true)
    }

    /// Steers traffic from `src` to `dst` through a cached chain.
    /// Returns false if the chain is unknown.
    pub fn add_service_path(&mut self, src: Ipv4Addr, dst: Ipv4Addr, chain_id: &str) -> io::Result<bool> {
        if !self.chains.contains_key(chain_id) {
            warn!("Not adding path {} -> {}: chain {} is unknown", src, dst, chain_id);
            return Ok(false);
        }
        if let Some(old) = self.paths.get(&(src, dst)) {
            if old != chain_id {
                self.remove_service_path(src, dst)?;
            }
        }
        self.paths.insert((src, dst), chain_id.to_owned());
        // keeps learned L2 rules from carrying the path's traffic around the chain
        self.send_flow_mod(
            OfpFlowModCommand::Add,
            path_guard_match(src, dst),
            vec![OfpAction::Output(OfpActionOutput::new_to_controller())],
            PATH_GUARD_PRIORITY,
            OFP_FLOW_PERMANENT,
        )?;
        self.install_path_rules(src, dst)?;
        Ok(true)
    }

    /// Deletes the flow entries of a path.
    /// Returns false if the path is unknown.
    pub fn remove_service_path(&mut self, src: Ipv4Addr, dst: Ipv4Addr) -> io::Result<bool> {
        if !self.paths.contains_key(&(src, dst)) {
            warn!("Not removing path {} -> {}: it is unknown", src, dst);
            return Ok(false);
        }
        let rules: Vec<_> = self
            .hop_rules(src, dst)
            .into_iter()
            .filter_map(|rule| rule.ok())
            .collect();
        for rule in rules {
            self.send_flow_mod(
                OfpFlowModCommand::DeleteStrict,
                rule.match_field(),
                vec![],
                PATH_PRIORITY,
                OFP_FLOW_PERMANENT,
            )?;
        }
        self.send_flow_mod(
            OfpFlowModCommand::DeleteStrict,
            path_guard_match(src, dst),
            vec![],
            PATH_GUARD_PRIORITY,
            OFP_FLOW_PERMANENT,
        )?;
        self.paths.remove(&(src, dst));
        Ok(true)
    }

    /// The hops of a path from source to destination
    fn hops(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<Vec<Ipv4Addr>> {
        let chain = self.chains.get(self.paths.get(&(src, dst))?)?;
        let mut hops = Vec::with_capacity(chain.len() + 2);
        hops.push(src);
        hops.extend_from_slice(chain);
        hops.push(dst);
        Some(hops)
    }

    /// One rule per adjacent pair of hops or the hop whose port is unknown
    fn hop_rules(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<Result<PathRule, Ipv4Addr>> {
        let hops = match self.hops(src, dst) {
            Some(hops) => hops,
            None => return vec![],
        };
        hops.windows(2)
            .map(|pair| {
                let resolved = |ip: Ipv4Addr| match self.endpoints.get(&ip) {
                    Some(&Endpoint {
                        port: Some(port),
                        mac,
                        ..
                    }) => Ok((port, mac)),
                    _ => Err(ip),
                };
                let (in_port, _) = resolved(pair[0])?;
                let (out_port, next_mac) = resolved(pair[1])?;
                Ok(PathRule {
                    in_port,
                    src,
                    dst,
                    next_mac,
                    out_port,
                })
            })
            .collect()
    }

    /// Derives the flow rules of a path in hop order.
    /// Stops at the first hop whose switch port is not known and returns its address.
    pub fn path_rules(&self, src: Ipv4Addr, dst: Ipv4Addr) -> (Vec<PathRule>, Option<Ipv4Addr>) {
        let mut rules = vec![];
        for rule in self.hop_rules(src, dst) {
            match rule {
                Ok(rule) => rules.push(rule),
                Err(unresolved) => return (rules, Some(unresolved)),
            }
        }
        (rules, None)
    }

    fn install_path_rules(&mut self, src: Ipv4Addr, dst: Ipv4Addr) -> io::Result<Vec<PathRule>> {
        let (rules, unresolved) = self.path_rules(src, dst);
        for rule in &rules {
            let timeout = self.conf.timeouts.path;
            self.send_flow_mod(
                OfpFlowModCommand::Add,
                rule.match_field(),
                rule.actions(),
                PATH_PRIORITY,
                timeout,
            )?;
        }
        if let Some(ip) = unresolved {
            warn!(
                "Path {} -> {} is incomplete: the port of {} is unknown",
                src, dst, ip
            );
            self.send_arp_request(ip)?;
        }
        Ok(rules)
    }

    /// Dispatches a packet-in. Service paths take precedence over
    /// discovery replies, which take precedence over L2 learning.
    pub fn handle_packet_in(&mut self, packet_in: &OfpPacketIn) -> io::Result<()> {
        let in_port = match packet_in.in_port() {
            Some(port) => port,
            None => {
                debug!("Ignoring packet-in without input port");
                return Ok(());
            }
        };
        let frame = match EthernetFrame::parse(packet_in.data()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Ignoring packet-in: {}", e);
                return Ok(());
            }
        };
        let received = Received {
            in_port,
            src: frame.src,
            dst: frame.dst,
            data: packet_in.data(),
        };
        match frame.payload {
            Payload::Ipv4(ref addrs) if self.paths.contains_key(&(addrs.src, addrs.dst)) => {
                self.forward_on_path(addrs.src, addrs.dst, &received)
            }
            Payload::Arp(ref arp) if arp.operation == packet::ArpOperation::REPLY => {
                self.handle_arp_reply(arp.sender_ip, &received)
            }
            _ => self.l2_fallback(&received),
        }
    }

    fn forward_on_path(&mut self, src: Ipv4Addr, dst: Ipv4Addr, received: &Received) -> io::Result<()> {
        let rules = self.install_path_rules(src, dst)?;
        match rules.into_iter().find(|r| r.in_port == received.in_port) {
            Some(rule) => self.send_packet_out(received.in_port, rule.actions(), received.data),
            None => {
                debug!(
                    "Dropping packet of path {} -> {} from port {} without resolved hop",
                    src, dst, received.in_port
                );
                Ok(())
            }
        }
    }

    fn l2_fallback(&mut self, received: &Received) -> io::Result<()> {
        if !packet::is_multicast(&received.src) {
            self.mac_to_port.insert(received.src.bytes(), received.in_port);
        }
        let out_port = if packet::is_multicast(&received.dst) {
            None
        }
        else {
            self.mac_to_port.get(&received.dst.bytes()).cloned()
        };

        match out_port {
            None => {
                trace!("Flooding frame for {}", received.dst);
                self.send_packet_out(received.in_port, vec![OfpAction::output(OFPP_FLOOD)], received.data)
            }
            Some(port) if port == received.in_port => {
                trace!("Dropping frame for {} that would leave its input port", received.dst);
                Ok(())
            }
            Some(port) => {
                debug!(
                    "Learned {} on port {} and {} on port {}",
                    received.src, received.in_port, received.dst, port
                );
                self.send_l2_flow(&received.src, &received.dst, port)?;
                self.send_l2_flow(&received.dst, &received.src, received.in_port)?;
                self.send_packet_out(received.in_port, vec![OfpAction::output(port)], received.data)
            }
        }
    }

    fn send_l2_flow(&mut self, src: &MacAddress, dst: &MacAddress, out_port: u32) -> io::Result<()> {
        let mut match_field = OfpMatch::new();
        match_field
            .add_tlv(OfpOxmTlv::new_eth_addr(dst, &ProtocolEndpoint::Dst))
            .add_tlv(OfpOxmTlv::new_eth_addr(src, &ProtocolEndpoint::Src));
        let timeout = self.conf.timeouts.l2;
        self.send_flow_mod(
            OfpFlowModCommand::Add,
            match_field,
            vec![OfpAction::output(out_port)],
            L2_PRIORITY,
            timeout,
        )
    }

    /// Applies one northbound message. Incomplete messages are dropped.
    pub fn handle_northbound(&mut self, msg: &Message) -> io::Result<()> {
        let command = match msg.command() {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping northbound message for switch {:x}: {}", self.dpid, e);
                return Ok(());
            }
        };
        match command {
            Command::Hello { controller_ip } => {
                info!("Orchestrator said hello to switch {:x}", self.dpid);
                if controller_ip.is_some() {
                    self.controller_ip = controller_ip;
                }
            }
            Command::Bye => info!("Orchestrator said goodbye to switch {:x}", self.dpid),
            Command::AddChain { chain_id, chain } => self.add_service_chain(chain_id, chain)?,
            Command::DelChain { chain_id } => {
                self.remove_service_chain(chain_id)?;
            }
            Command::AddPath {
                source,
                destination,
                chain_id,
            } => {
                self.add_endpoint(source, None)?;
                self.add_endpoint(destination, None)?;
                self.add_service_path(source.ip, destination.ip, chain_id)?;
            }
            Command::DelPath {
                source,
                destination,
            } => {
                self.remove_service_path(source.ip, destination.ip)?;
            }
        }
        Ok(())
    }

    fn send_arp_request(&mut self, target: Ipv4Addr) -> io::Result<()> {
        let sender_ip = self.controller_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
        debug!("Asking for the port of {} as {}", target, sender_ip);
        let frame = packet::arp_request(&self.mac(), sender_ip, target)?;
        self.send_packet_out(OFPP_CONTROLLER, vec![OfpAction::output(OFPP_FLOOD)], &frame)
    }

    fn send_flow_mod(
        &mut self,
        cmd: OfpFlowModCommand,
        match_field: OfpMatch,
        actions: Vec<OfpAction>,
        prio: u16,
        hard_timeout: u16,
    ) -> io::Result<()> {
        let instr = if actions.is_empty() {
            vec![]
        }
        else {
            vec![OfpInstructionActions::new(actions)]
        };

        let flow_mod = OfpFlowMod::new(cmd, self.conf.table.id, prio, OFPP_ANY, match_field, instr)
            .with_hard_timeout(hard_timeout);

        trace!("Outgoing message: {:?}", flow_mod);
        flow_mod.serialize(&mut self.out, gen_xid())
    }

    fn send_packet_out(&mut self, in_port: u32, actions: Vec<OfpAction>, data: &[u8]) -> io::Result<()> {
        let packet_out = OfpPacketOut::new(in_port, actions, data.to_vec());
        trace!("Outgoing message: {:?}", packet_out);
        packet_out.serialize(&mut self.out, gen_xid())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::conf::{ControllerIdentity, OfTable, Timeouts};
    use crate::openflow::messages::deserialize::Deserialize;
    use crate::packet::tests::{arp_reply, ipv4_frame};
    use byteorder::{ByteOrder, NetworkEndian};
    use std::str::FromStr;

    const DPID: u64 = 0x2a;

    fn mac(s: &str) -> MacAddress {
        MacAddress::from_str(s).unwrap()
    }

    fn ip(s: &str) -> Ipv4Addr {
        Ipv4Addr::from_str(s).unwrap()
    }

    fn desc(ip_str: &str, mac_str: &str) -> EndpointDesc {
        EndpointDesc::new(ip(ip_str), mac(mac_str))
    }

    pub fn controller() -> FlowController<Vec<u8>> {
        let conf = FlowConf {
            table: OfTable { id: 0 },
            timeouts: Timeouts { path: 90, l2: 30 },
            controller: ControllerIdentity {
                mac: mac("02:00:00:00:00:fe"),
                ip: Some(ip("10.0.0.254")),
            },
        };
        FlowController::new(DPID, vec![], conf)
    }

    /// The type and body of every message written so far. Clears the output.
    fn sent(fc: &mut FlowController<Vec<u8>>) -> Vec<(u8, Vec<u8>)> {
        let out = std::mem::replace(&mut fc.out, vec![]);
        let mut msgs = vec![];
        let mut rest = &out[..];
        while !rest.is_empty() {
            let typ = rest[1];
            let len = NetworkEndian::read_u16(&rest[2..4]) as usize;
            msgs.push((typ, rest[8..len].to_vec()));
            rest = &rest[len..];
        }
        msgs
    }

    fn flow_mods(msgs: &[(u8, Vec<u8>)], cmd: OfpFlowModCommand) -> Vec<Vec<u8>> {
        msgs.iter()
            .filter(|&&(typ, ref body)| typ == OfpType::FlowMod as u8 && body[17] == cmd as u8)
            .map(|&(_, ref body)| body.clone())
            .collect()
    }

    fn packet_outs(msgs: &[(u8, Vec<u8>)]) -> usize {
        msgs.iter().filter(|&&(typ, _)| typ == OfpType::PacketOut as u8).count()
    }

    fn priority(flow_mod: &[u8]) -> u16 {
        NetworkEndian::read_u16(&flow_mod[22..24])
    }

    fn hard_timeout(flow_mod: &[u8]) -> u16 {
        NetworkEndian::read_u16(&flow_mod[20..22])
    }

    fn with_priority(flow_mods: Vec<Vec<u8>>, prio: u16) -> Vec<Vec<u8>> {
        flow_mods.into_iter().filter(|fm| priority(fm) == prio).collect()
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    /// The input ports of every packet-out written
    fn packet_out_ports(msgs: &[(u8, Vec<u8>)]) -> Vec<u32> {
        msgs.iter()
            .filter(|&&(typ, _)| typ == OfpType::PacketOut as u8)
            .map(|&(_, ref body)| NetworkEndian::read_u32(&body[4..8]))
            .collect()
    }

    /// A packet-in as sent by Open vSwitch for a table miss
    fn packet_in(in_port: u32, frame: Vec<u8>) -> OfpPacketIn {
        let mut bytes = vec![0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0];
        NetworkEndian::write_u16(&mut bytes[4..6], frame.len() as u16);
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[0x00, 0x01, 0x00, 0x0c, 0x80, 0x00, 0x00, 0x04]);
        let mut port = [0; 4];
        NetworkEndian::write_u32(&mut port, in_port);
        bytes.extend_from_slice(&port);
        bytes.extend_from_slice(&[0; 6]);
        bytes.extend_from_slice(&frame);
        OfpPacketIn::deserialize(bytes).unwrap()
    }

    /// Lets `host` answer the controller's ARP request from `port`
    pub fn discover(fc: &mut FlowController<Vec<u8>>, host: &EndpointDesc, port: u32) {
        let ctrl_mac = fc.mac();
        let reply = arp_reply(&host.mac, host.ip, &ctrl_mac, ip("10.0.0.254"));
        fc.handle_packet_in(&packet_in(port, reply)).unwrap();
    }

    fn firewall() -> EndpointDesc {
        desc("10.0.0.2", "02:00:00:00:00:02")
    }

    fn monitor() -> EndpointDesc {
        desc("10.0.0.3", "02:00:00:00:00:03")
    }

    fn source() -> EndpointDesc {
        desc("10.0.0.5", "02:00:00:00:00:05")
    }

    fn destination() -> EndpointDesc {
        desc("10.0.0.9", "02:00:00:00:00:09")
    }

    /// A chain "7" of firewall and monitor with a path from source to destination
    fn with_path(fc: &mut FlowController<Vec<u8>>) {
        fc.add_service_chain("7", &[firewall(), monitor()]).unwrap();
        fc.add_endpoint(&source(), None).unwrap();
        fc.add_endpoint(&destination(), None).unwrap();
        assert!(fc.add_service_path(source().ip, destination().ip, "7").unwrap());
    }

    fn resolve_all(fc: &mut FlowController<Vec<u8>>) {
        discover(fc, &source(), 1);
        discover(fc, &firewall(), 2);
        discover(fc, &monitor(), 3);
        discover(fc, &destination(), 4);
    }

    #[test]
    fn standing_rules() {
        let mut fc = controller();
        fc.connection_up().unwrap();
        let adds = flow_mods(&sent(&mut fc), OfpFlowModCommand::Add);
        assert_eq!(2, adds.len());
        assert_eq!(TABLE_MISS_PRIORITY, priority(&adds[0]));
        assert_eq!(ARP_PRIORITY, priority(&adds[1]));
        assert!(ARP_PRIORITY > PATH_PRIORITY);
    }

    #[test]
    fn add_endpoint_is_idempotent() {
        let mut fc = controller();
        let first = fc.add_endpoint(&firewall(), None).unwrap();
        assert_eq!(1, packet_outs(&sent(&mut fc)));
        let second = fc.add_endpoint(&firewall(), None).unwrap();
        assert_eq!(first, second);
        assert!(sent(&mut fc).is_empty());
    }

    #[test]
    fn add_endpoint_with_known_port_skips_arp() {
        let mut fc = controller();
        let endpoint = fc.add_endpoint(&firewall(), Some(7)).unwrap();
        assert_eq!(Some(7), endpoint.port);
        assert!(sent(&mut fc).is_empty());
    }

    #[test]
    fn conflicting_mac_replaces_endpoint() {
        let mut fc = controller();
        fc.add_endpoint(&firewall(), None).unwrap();
        discover(&mut fc, &firewall(), 2);
        sent(&mut fc);

        let moved = desc("10.0.0.2", "02:00:00:00:00:22");
        let endpoint = fc.add_endpoint(&moved, None).unwrap();
        assert_eq!(moved.mac, endpoint.mac);
        assert_eq!(None, endpoint.port);
        assert_eq!(1, packet_outs(&sent(&mut fc)));
    }

    #[test]
    fn discovery_reply_overwrites_port() {
        let mut fc = controller();
        fc.add_endpoint(&firewall(), None).unwrap();
        discover(&mut fc, &firewall(), 2);
        assert_eq!(Some(2), fc.endpoint(firewall().ip).unwrap().port);
        discover(&mut fc, &firewall(), 5);
        assert_eq!(Some(5), fc.endpoint(firewall().ip).unwrap().port);
    }

    #[test]
    fn foreign_arp_reply_is_l2_switched() {
        let mut fc = controller();
        fc.add_endpoint(&firewall(), None).unwrap();
        sent(&mut fc);

        let other = mac("02:00:00:00:00:77");
        let reply = arp_reply(&firewall().mac, firewall().ip, &other, ip("10.0.0.77"));
        fc.handle_packet_in(&packet_in(2, reply)).unwrap();

        assert_eq!(None, fc.endpoint(firewall().ip).unwrap().port);
        // unknown destination is flooded
        let msgs = sent(&mut fc);
        assert_eq!(1, packet_outs(&msgs));
        assert!(flow_mods(&msgs, OfpFlowModCommand::Add).is_empty());
    }

    #[test]
    fn path_with_unknown_chain() {
        let mut fc = controller();
        assert!(!fc.add_service_path(source().ip, destination().ip, "nope").unwrap());
        assert_eq!(None, fc.path(source().ip, destination().ip));
        assert!(sent(&mut fc).is_empty());
    }

    #[test]
    fn path_rules_follow_the_chain() {
        let mut fc = controller();
        with_path(&mut fc);
        resolve_all(&mut fc);

        let (rules, unresolved) = fc.path_rules(source().ip, destination().ip);
        assert_eq!(None, unresolved);
        assert_eq!(3, rules.len());
        let hops: Vec<_> = rules
            .iter()
            .map(|r| (r.in_port, r.next_mac, r.out_port))
            .collect();
        assert_eq!(
            vec![
                (1, firewall().mac, 2),
                (2, monitor().mac, 3),
                (3, destination().mac, 4),
            ],
            hops
        );
        assert!(rules.iter().all(|r| r.src == source().ip && r.dst == destination().ip));
    }

    #[test]
    fn resolved_path_is_installed_in_hop_order() {
        let mut fc = controller();
        with_path(&mut fc);
        resolve_all(&mut fc);
        sent(&mut fc);

        assert!(fc.add_service_path(source().ip, destination().ip, "7").unwrap());
        let adds = flow_mods(&sent(&mut fc), OfpFlowModCommand::Add);
        assert_eq!(4, adds.len());
        assert_eq!(PATH_GUARD_PRIORITY, priority(&adds[0]));
        let hops = with_priority(adds, PATH_PRIORITY);
        assert_eq!(3, hops.len());
        assert!(hops.iter().all(|fm| hard_timeout(fm) == 90));
    }

    #[test]
    fn unresolved_hop_aborts_installation() {
        let mut fc = controller();
        with_path(&mut fc);
        discover(&mut fc, &source(), 1);
        discover(&mut fc, &firewall(), 2);
        sent(&mut fc);

        assert!(fc.add_service_path(source().ip, destination().ip, "7").unwrap());
        let (rules, unresolved) = fc.path_rules(source().ip, destination().ip);
        assert_eq!(1, rules.len());
        assert_eq!(Some(monitor().ip), unresolved);

        let msgs = sent(&mut fc);
        let adds = flow_mods(&msgs, OfpFlowModCommand::Add);
        assert_eq!(1, with_priority(adds, PATH_PRIORITY).len());
        // the missing hop is asked again
        assert_eq!(1, packet_outs(&msgs));
    }

    #[test]
    fn remove_unknown_path() {
        let mut fc = controller();
        with_path(&mut fc);
        sent(&mut fc);
        assert!(!fc.remove_service_path(destination().ip, source().ip).unwrap());
        assert!(sent(&mut fc).is_empty());
        assert!(fc.path(source().ip, destination().ip).is_some());
    }

    #[test]
    fn remove_path_deletes_rules() {
        let mut fc = controller();
        with_path(&mut fc);
        resolve_all(&mut fc);
        sent(&mut fc);

        assert!(fc.remove_service_path(source().ip, destination().ip).unwrap());
        let deletes = flow_mods(&sent(&mut fc), OfpFlowModCommand::DeleteStrict);
        assert_eq!(4, deletes.len());
        assert_eq!(1, with_priority(deletes, PATH_GUARD_PRIORITY).len());
        assert_eq!(None, fc.path(source().ip, destination().ip));
        // removing twice is harmless
        assert!(!fc.remove_service_path(source().ip, destination().ip).unwrap());
    }

    #[test]
    fn remove_chain_cascades() {
        let mut fc = controller();
        with_path(&mut fc);
        fc.add_service_path(destination().ip, source().ip, "7").unwrap();

        assert!(fc.remove_service_chain("7").unwrap());
        assert_eq!(None, fc.chain("7"));
        assert_eq!(None, fc.path(source().ip, destination().ip));
        assert_eq!(None, fc.path(destination().ip, source().ip));
        assert!(!fc.remove_service_chain("7").unwrap());
    }

    #[test]
    fn path_traffic_is_forwarded_to_the_next_hop() {
        let mut fc = controller();
        with_path(&mut fc);
        resolve_all(&mut fc);
        sent(&mut fc);

        let frame = ipv4_frame(&source().mac, &destination().mac, source().ip, destination().ip);
        fc.handle_packet_in(&packet_in(2, frame)).unwrap();
        let msgs = sent(&mut fc);
        assert_eq!(3, flow_mods(&msgs, OfpFlowModCommand::Add).len());
        assert_eq!(1, packet_outs(&msgs));
        // source MAC is not learned from path traffic
        assert!(fc.mac_to_port.is_empty());
    }

    #[test]
    fn path_guard_outranks_l2_rules() {
        let mut fc = controller();
        fc.add_service_chain("7", &[firewall()]).unwrap();
        fc.add_endpoint(&source(), None).unwrap();
        fc.add_endpoint(&destination(), None).unwrap();
        discover(&mut fc, &source(), 1);
        discover(&mut fc, &destination(), 4);
        sent(&mut fc);

        assert!(fc.add_service_path(source().ip, destination().ip, "7").unwrap());
        let msgs = sent(&mut fc);
        let guards = with_priority(flow_mods(&msgs, OfpFlowModCommand::Add), PATH_GUARD_PRIORITY);
        assert_eq!(1, guards.len());
        assert!(PATH_GUARD_PRIORITY > L2_PRIORITY && PATH_GUARD_PRIORITY < PATH_PRIORITY);
        assert_eq!(0, hard_timeout(&guards[0]));
        let guard_match = &guards[0][40..];
        assert!(contains(guard_match, &source().ip.octets()));
        assert!(contains(guard_match, &destination().ip.octets()));
        // any input port
        assert!(!contains(guard_match, &[0x80, 0x00, 0x00, 0x04]));

        // ordinary ARP between the path's endpoints teaches the MAC pair
        let request = packet::arp_request(&source().mac, source().ip, destination().ip).unwrap();
        fc.handle_packet_in(&packet_in(1, request)).unwrap();
        let reply = arp_reply(&destination().mac, destination().ip, &source().mac, source().ip);
        fc.handle_packet_in(&packet_in(4, reply)).unwrap();
        let l2 = with_priority(flow_mods(&sent(&mut fc), OfpFlowModCommand::Add), L2_PRIORITY);
        assert_eq!(2, l2.len());

        // the guard hands the path's IPv4 traffic to the controller,
        // which does not forward it while the firewall is unresolved
        let frame = ipv4_frame(&source().mac, &destination().mac, source().ip, destination().ip);
        fc.handle_packet_in(&packet_in(1, frame)).unwrap();
        let msgs = sent(&mut fc);
        assert!(with_priority(flow_mods(&msgs, OfpFlowModCommand::Add), PATH_PRIORITY).is_empty());
        assert_eq!(vec![OFPP_CONTROLLER], packet_out_ports(&msgs));
    }

    #[test]
    fn l2_learning() {
        let mut fc = controller();
        let a = mac("02:00:00:00:00:0a");
        let b = mac("02:00:00:00:00:0b");
        let frame = |src, dst| ipv4_frame(src, dst, ip("192.168.0.1"), ip("192.168.0.2"));

        fc.handle_packet_in(&packet_in(1, frame(&a, &b))).unwrap();
        let msgs = sent(&mut fc);
        assert_eq!(1, packet_outs(&msgs));
        assert!(flow_mods(&msgs, OfpFlowModCommand::Add).is_empty());

        fc.handle_packet_in(&packet_in(2, frame(&b, &a))).unwrap();
        let msgs = sent(&mut fc);
        let adds = flow_mods(&msgs, OfpFlowModCommand::Add);
        assert_eq!(2, adds.len());
        assert!(adds.iter().all(|fm| priority(fm) == L2_PRIORITY));
        assert!(adds.iter().all(|fm| hard_timeout(fm) == 30));
        assert_eq!(1, packet_outs(&msgs));
    }

    #[test]
    fn northbound_messages() {
        let mut fc = controller();
        fc.handle_northbound(&Message::hello(DPID, Some(ip("10.0.0.1"))))
            .unwrap();
        assert_eq!(Some(ip("10.0.0.1")), fc.controller_ip());

        fc.handle_northbound(&Message::add_chain(DPID, "7", vec![firewall(), monitor()]))
            .unwrap();
        assert_eq!(Some(&[firewall().ip, monitor().ip][..]), fc.chain("7"));

        fc.handle_northbound(&Message::add_path(DPID, source(), destination(), "7"))
            .unwrap();
        assert_eq!(Some(&"7".to_owned()), fc.path(source().ip, destination().ip));
        assert!(fc.endpoint(source().ip).is_some());

        fc.handle_northbound(&Message::del_path(DPID, source(), destination()))
            .unwrap();
        assert_eq!(None, fc.path(source().ip, destination().ip));

        fc.handle_northbound(&Message::del_chain(DPID, "7")).unwrap();
        assert_eq!(None, fc.chain("7"));
    }

    #[test]
    fn incomplete_northbound_message_is_dropped() {
        let mut fc = controller();
        let mut msg = Message::add_chain(DPID, "7", vec![firewall()]);
        msg.chain.clear();
        fc.handle_northbound(&msg).unwrap();
        assert_eq!(None, fc.chain("7"));
        assert!(sent(&mut fc).is_empty());
    }
}
