/*!
All deserialization routines for the OpenFlow message primitives

The header uses a special deserialization because its size is known.
Use the trait `Deserialize` for any other deserialization implementation.
*/

use crate::openflow::error::{Error, Result};
use crate::openflow::messages::*;
use byteorder::{ByteOrder, NetworkEndian};

use std::io;
use std::mem::size_of;

impl OfpHeader {
    /// Deserializes an OpenFlow header
    pub fn deserialize(bytes: &[u8; 8]) -> OfpHeader {
        OfpHeader {
            version: bytes[0],
            typ: bytes[1],
            length: NetworkEndian::read_u16(&bytes[2..4]),
            xid: NetworkEndian::read_u32(&bytes[4..]),
        }
    }

    /// Returns the body length in byte.
    /// A header announcing less than its own length has an empty body.
    pub fn body_length(&self) -> usize {
        (self.length as usize).saturating_sub(OfpHeader::header_length())
    }
}

/// To be implemented by all OpenFlow message parts that are received.
pub trait Deserialize {
    /// The type to deserialize
    type R;

    /// Deserialize the bytes buffer
    /// Fails on providing a too small or too large buffer
    fn deserialize(bytes: Vec<u8>) -> Result<Self::R> {
        if Self::min_length() > bytes.len() || Self::max_length() < bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes));
        }
        Self::deserialize_len_ok(bytes)
    }

    /// Deserializes the byte buffer (network byte order)
    /// Implementers can rely on the bytes buffer's size to be greater or equal Self::min_length()
    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R>;

    /// The minimum length of the message part in bytes
    /// If Self::R contains dynamically sized fields,
    /// you probably have to override this implementation.
    fn min_length() -> usize {
        size_of::<Self::R>()
    }

    /// The maximum length of the message part in bytes
    /// May not return a value greater than 0xFFF7
    /// If Self::R is fixed size, you probably have to
    /// override this implementation.
    fn max_length() -> usize {
        0xffff - OfpHeader::header_length()
    }
}

impl Deserialize for OfpEchoRequest {
    type R = OfpEchoRequest;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpEchoRequest { arbitrary: bytes })
    }

    fn min_length() -> usize {
        0
    }
}

impl Deserialize for OfpSwitchFeatures {
    type R = OfpSwitchFeatures;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpSwitchFeatures {
            datapath_id: NetworkEndian::read_u64(&bytes[0..8]),
            n_buffers: NetworkEndian::read_u32(&bytes[8..12]),
            n_tables: bytes[12],
            auxiliary_id: bytes[13],
            pad: [bytes[14], bytes[15]],
            capabilities: NetworkEndian::read_u32(&bytes[16..20]),
            reserved: NetworkEndian::read_u32(&bytes[20..]),
        })
    }

    fn max_length() -> usize {
        24
    }
}

impl Deserialize for OfpErrorMsg {
    type R = OfpErrorMsg;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let code = NetworkEndian::read_u16(&bytes[2..4]);
        Ok(OfpErrorMsg {
            typ,
            code,
            data: bytes[4..].to_vec(),
        })
    }

    fn min_length() -> usize {
        4
    }
}

/// Fixed part of a packet-in before the match
const PACKET_IN_FIXED_LEN: usize = 16;

/// Walks the OXM TLVs of a match and returns the input port if present
fn oxm_in_port(mut oxms: &[u8]) -> Option<u32> {
    while oxms.len() >= 4 {
        let header = NetworkEndian::read_u32(&oxms[0..4]);
        let class = header >> 16;
        let field = (header >> 9) & 0x7f;
        let len = (header & 0xff) as usize;
        if oxms.len() < 4 + len {
            return None;
        }
        if class == OfpOxmClass::OpenflowBasic as u32
            && field == OxmOfbMatchFields::InPort as u32
            && len == 4
        {
            return Some(NetworkEndian::read_u32(&oxms[4..8]));
        }
        oxms = &oxms[4 + len..];
    }
    None
}

impl Deserialize for OfpPacketIn {
    type R = OfpPacketIn;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        let match_len = NetworkEndian::read_u16(&bytes[18..20]) as usize;
        let padded_match_len = (match_len + 7) / 8 * 8;
        // the match is followed by 2 bytes of padding before the frame
        let data_start = PACKET_IN_FIXED_LEN + padded_match_len + 2;
        if match_len < 4 || bytes.len() < data_start {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes));
        }
        let oxms = &bytes[PACKET_IN_FIXED_LEN + 4..PACKET_IN_FIXED_LEN + match_len];
        Ok(OfpPacketIn {
            buffer_id: NetworkEndian::read_u32(&bytes[0..4]),
            total_len: NetworkEndian::read_u16(&bytes[4..6]),
            reason: bytes[6],
            table_id: bytes[7],
            cookie: NetworkEndian::read_u64(&bytes[8..16]),
            in_port: oxm_in_port(oxms),
            data: bytes[data_start..].to_vec(),
        })
    }

    fn min_length() -> usize {
        // an empty match is padded to 8 bytes
        PACKET_IN_FIXED_LEN + 8 + 2
    }
}

impl OfpErrorMsg {
    /// Fail if the error message is OfpErrorType::BadAction
    /// with OfpBadActionCode::BadOutPort
    pub fn fail_on_bad_port(&self) -> io::Result<()> {
        if self.typ == OfpErrorType::BadAction as u16
            && self.code == OfpBadActionCode::BadOutPort as u16
        {
            // This error is caused by an `OfpFlowMod`.
            // Deserialize its `out_port` field
            let msg = if self.data.len() < 40 {
                "A service path references a switch port that does not exist.".to_owned()
            }
            else {
                let out_port = NetworkEndian::read_u32(&self.data[36..40]);
                format!("Switch port number {} does not exist.", out_port)
            };
            Err(io::Error::new(io::ErrorKind::InvalidData, msg))
        }
        else {
            Ok(())
        }
    }
}
