/*!
All serialization and construction routines for the OpenFlow message primitives

Use the trait `OfpPacket` for serialization implementations of messages
that are sent. Other primitives that are part of a message should
implement a serialize funtion that operates on a given byte stream.
*/

use crate::openflow::messages::*;
use byteorder::{NetworkEndian, WriteBytesExt};
use std::io;
use std::io::Write;
use std::mem::size_of;

/// Rounds `len` up to the next multiple of 8
fn padded_to_8(len: usize) -> usize {
    (len + 7) / 8 * 8
}

impl OfpHeader {
    /// Constructs an `OfpHeader`
    pub fn new(typ: OfpType, xid: u32) -> OfpHeader {
        OfpHeader {
            version: OFP_VERSION,
            typ: typ as u8,
            length: OfpHeader::header_length() as u16,
            xid,
        }
    }

    /// Returns the fixed header length of 8 (in byte)
    pub fn header_length() -> usize {
        size_of::<OfpHeader>()
    }

    /// Serializes this header on the given stream
    pub fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&[self.version, self.typ])?;
        stream.write_u16::<NetworkEndian>(self.length)?;
        stream.write_u32::<NetworkEndian>(self.xid)
    }
}

impl OfpMatch {
    /// Constructs an empty match.
    pub fn new() -> OfpMatch {
        OfpMatch {
            typ: OfpMatchType::Oxm as u16,
            oxm_fields: vec![],
        }
    }

    /// Adds a single match field to the match.
    pub fn add_tlv(&mut self, oxm_tlv: OfpOxmTlv) -> &mut OfpMatch {
        self.oxm_fields.push(oxm_tlv);
        self
    }

    /// Length of OfpMatch (excluding padding)
    fn length(&self) -> usize {
        let mut length = 4;
        for oxm in &self.oxm_fields {
            length += oxm.length();
        }
        length
    }

    /// Padding of OfpMatch
    fn pad_len(&self) -> usize {
        let len = self.length();
        padded_to_8(len) - len
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.length() as u16)?;
        for oxm in &self.oxm_fields {
            oxm.serialize(stream)?;
        }
        // make its overall size a multiple of 8; fill with zeros
        stream.write_all(&vec![0; self.pad_len()])
    }
}

impl OfpOxmTlv {
    fn length(&self) -> usize {
        4 + self.body.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let class = self.class as u32;
        let hasmask_u32 = if self.hasmask { 1 } else { 0 };
        let header = ((class) << 16) | ((self.field as u32) << 9) | (hasmask_u32 << 8)
            | self.body.len() as u32;
        stream.write_u32::<NetworkEndian>(header)?;
        stream.write_all(&self.body)
    }
}

impl OfpActionOutput {
    /// Constructs an `OfpActionOutput`
    pub fn new(port: u32) -> OfpActionOutput {
        OfpActionOutput {
            typ: OfpActionType::Output as u16,
            len: size_of::<OfpActionOutput>() as u16,
            port,
            max_len: 0,
            pad: [0; 6],
        }
    }

    /// Constructs an `OfpActionOutput` that sends whole packets to the controller
    pub fn new_to_controller() -> OfpActionOutput {
        OfpActionOutput {
            max_len: OFPCML_NO_BUFFER,
            ..OfpActionOutput::new(OFPP_CONTROLLER)
        }
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.len)?;
        stream.write_u32::<NetworkEndian>(self.port)?;
        stream.write_u16::<NetworkEndian>(self.max_len)?;
        stream.write_all(&self.pad)
    }
}

impl OfpActionSetField {
    /// Constructs an `OfpActionSetField` that rewrites the header field of `field`
    pub fn new(field: OfpOxmTlv) -> OfpActionSetField {
        OfpActionSetField { field }
    }

    fn length(&self) -> usize {
        padded_to_8(4 + self.field.length())
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(OfpActionType::SetField as u16)?;
        stream.write_u16::<NetworkEndian>(self.length() as u16)?;
        self.field.serialize(stream)?;
        stream.write_all(&vec![0; self.length() - 4 - self.field.length()])
    }
}

impl OfpAction {
    /// Output to the given switch port
    pub fn output(port: u32) -> OfpAction {
        OfpAction::Output(OfpActionOutput::new(port))
    }

    /// Rewrite the Ethernet destination address
    pub fn set_eth_dst(mac: &MacAddress) -> OfpAction {
        let tlv = OfpOxmTlv::new_eth_addr(mac, &ProtocolEndpoint::Dst);
        OfpAction::SetField(OfpActionSetField::new(tlv))
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        match *self {
            OfpAction::Output(ref o) => o.serialize(stream),
            OfpAction::SetField(ref s) => s.serialize(stream),
        }
    }
}

fn serialize_actions(actions: &[OfpAction]) -> io::Result<Vec<u8>> {
    let mut buf = vec![];
    for action in actions {
        action.serialize(&mut buf)?;
    }
    Ok(buf)
}

impl OfpInstructionActions {
    /// Constructs an `OfpInstructionActions`
    pub fn new(actions: Vec<OfpAction>) -> OfpInstructionActions {
        OfpInstructionActions {
            typ: OfpInstructionType::ApplyActions as u16,
            pad: [0; 4],
            actions,
        }
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let actions = serialize_actions(&self.actions)?;
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(8 + actions.len() as u16)?;
        stream.write_all(&self.pad)?;
        stream.write_all(&actions)
    }
}

impl OfpFlowMod {
    /// Constructs a permanent `OfpFlowMod` with the given fields.
    pub fn new(
        command: OfpFlowModCommand,
        table_id: u8,
        priority: u16,
        out_port: u32,
        match_field: OfpMatch,
        instructions: Vec<OfpInstructionActions>,
    ) -> OfpFlowMod {
        OfpFlowMod {
            cookie: 0,
            cookie_mask: 0,
            table_id,
            command: command as u8,
            idle_timeout: OFP_FLOW_PERMANENT,
            hard_timeout: OFP_FLOW_PERMANENT,
            priority,
            buffer_id: OFP_NO_BUFFER,
            out_port,
            out_group: OFPP_ANY,
            flags: 0,
            pad: [0; 2],
            match_field,
            instructions,
        }
    }

    /// Lets the flow entry expire after `secs` seconds
    pub fn with_hard_timeout(mut self, secs: u16) -> OfpFlowMod {
        self.hard_timeout = secs;
        self
    }
}

impl OfpPacketOut {
    /// Constructs an unbuffered `OfpPacketOut` carrying `data`
    pub fn new(in_port: u32, actions: Vec<OfpAction>, data: Vec<u8>) -> OfpPacketOut {
        OfpPacketOut {
            buffer_id: OFP_NO_BUFFER,
            in_port,
            actions,
            data,
        }
    }
}

impl OfpSwitchConfig {
    /// Constructs a switch configuration that
    /// sends unbuffered, complete packets to the controller
    pub fn new_unbuffered() -> OfpSwitchConfig {
        OfpSwitchConfig {
            flags: 0,
            miss_send_len: OFPCML_NO_BUFFER,
        }
    }
}

impl OfpAsyncConfig {
    /// Subscribes to packet-ins caused by table misses and explicit
    /// output actions. Port status and flow removed messages are muted.
    pub fn packet_in_only() -> OfpAsyncConfig {
        let reasons =
            (1 << OfpPacketInReason::NoMatch as u32) | (1 << OfpPacketInReason::Action as u32);
        OfpAsyncConfig {
            packet_in_mask: [reasons, 0],
            ..OfpAsyncConfig::default()
        }
    }
}

/// An OpenFlow packet. Must be implemented for all OpenFlow messsages that are sent.
pub trait OfpPacket {
    /// Constructs an OfpHeader with the given body length and transaction ID
    fn header(&self, body_length: usize, xid: u32) -> OfpHeader {
        OfpHeader {
            version: OFP_VERSION,
            typ: Self::typ() as u8,
            length: (OfpHeader::header_length() + body_length) as u16,
            xid,
        }
    }

    /// Returns the packet's type
    fn typ() -> OfpType;

    /// Serializes this packet with network byte order.
    /// The xid is used as its header's transaction id.
    fn serialize<S: Write>(&self, stream: &mut S, xid: u32) -> io::Result<()> {
        let mut body = vec![];
        self.serialize_body(&mut body)?;
        let header = self.header(body.len(), xid);
        trace!("Outgoing message: {:?}", header);
        header.serialize(stream)?;
        stream.write_all(&body)
    }

    /// Serializes this packet's body.
    /// Implementers have to output network byte order on the given stream.
    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()>;
}

impl OfpEchoReply {
    /// Constructs a new `OfpEchoReply` with `arbitrary` content.
    /// This should be the same as in the `OfpEchoRequest` that issued this reply.
    pub fn new(arbitrary: Vec<u8>) -> OfpEchoReply {
        OfpEchoReply { arbitrary }
    }
}
impl OfpPacket for OfpEchoReply {
    fn typ() -> OfpType {
        OfpType::EchoReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&self.arbitrary)
    }
}

impl OfpPacket for OfpErrorMsg {
    fn typ() -> OfpType {
        OfpType::Error
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.code)?;
        stream.write_all(&self.data)
    }
}

impl OfpPacket for OfpFlowMod {
    fn typ() -> OfpType {
        OfpType::FlowMod
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u64::<NetworkEndian>(self.cookie_mask)?;
        stream.write_all(&[self.table_id, self.command])?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        stream.write_u16::<NetworkEndian>(self.hard_timeout)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u32::<NetworkEndian>(self.out_port)?;
        stream.write_u32::<NetworkEndian>(self.out_group)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_all(&self.pad)?;
        self.match_field.serialize(stream)?;
        for instr in &self.instructions {
            instr.serialize(stream)?;
        }
        Ok(())
    }
}

impl OfpPacket for OfpPacketOut {
    fn typ() -> OfpType {
        OfpType::PacketOut
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let actions = serialize_actions(&self.actions)?;
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u32::<NetworkEndian>(self.in_port)?;
        stream.write_u16::<NetworkEndian>(actions.len() as u16)?;
        stream.write_all(&[0; 6])?;
        stream.write_all(&actions)?;
        stream.write_all(&self.data)
    }
}

impl OfpPacket for OfpSwitchConfig {
    fn typ() -> OfpType {
        OfpType::SetConfig
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_u16::<NetworkEndian>(self.miss_send_len)
    }
}

impl OfpPacket for OfpAsyncConfig {
    fn typ() -> OfpType {
        OfpType::SetAsync
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u32::<NetworkEndian>(self.packet_in_mask[0])?;
        stream.write_u32::<NetworkEndian>(self.packet_in_mask[1])?;
        stream.write_u32::<NetworkEndian>(self.port_status_mask[0])?;
        stream.write_u32::<NetworkEndian>(self.port_status_mask[1])?;
        stream.write_u32::<NetworkEndian>(self.flow_removed_mask[0])?;
        stream.write_u32::<NetworkEndian>(self.flow_removed_mask[1])
    }
}
