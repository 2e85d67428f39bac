/*!
Just enough Ethernet, ARP and IPv4 parsing to dispatch packet-ins

VLAN tagged frames are reported with their tag's Ethernet type and are
left to the L2-learning fallback.
*/

use etherparse::err::ipv4::HeaderSliceError;
use etherparse::{ArpHardwareId, ArpPacket, ArpPacketSlice, EtherType, Ethernet2Header, Ipv4Header};
use mac_address::MacAddress;

pub use etherparse::ArpOperation;

use std::error;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;

/// The Ethernet broadcast address
pub fn broadcast() -> MacAddress {
    MacAddress::new([0xff; 6])
}

/// Errors on parsing a received frame
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The frame ends before the named header is complete
    Truncated(&'static str),
    /// The IPv4 header is malformed
    InvalidIpv4,
    /// The ARP packet is not Ethernet/IPv4
    UnsupportedArp,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Truncated(header) => write!(f, "Truncated {} header", header),
            Error::InvalidIpv4 => write!(f, "Malformed IPv4 header"),
            Error::UnsupportedArp => write!(f, "ARP packet is not for Ethernet and IPv4"),
        }
    }
}

impl error::Error for Error {}

/// An ARP packet for IPv4 over Ethernet
#[derive(Debug, PartialEq)]
pub struct Arp {
    pub operation: ArpOperation,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Addr,
}

/// The addresses of an IPv4 header
#[derive(Debug, PartialEq)]
pub struct Ipv4Addrs {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

/// The network layer of a frame
#[derive(Debug, PartialEq)]
pub enum Payload {
    Ipv4(Ipv4Addrs),
    Arp(Arp),
    /// Any other Ethernet type
    Other(u16),
}

/// A parsed Ethernet II frame
#[derive(Debug, PartialEq)]
pub struct EthernetFrame {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub payload: Payload,
}

fn mac_from(bytes: &[u8]) -> Option<MacAddress> {
    let mut mac = [0; 6];
    if bytes.len() != mac.len() {
        return None;
    }
    mac.copy_from_slice(bytes);
    Some(MacAddress::new(mac))
}

fn ipv4_from(bytes: &[u8]) -> Option<Ipv4Addr> {
    let mut ip = [0; 4];
    if bytes.len() != ip.len() {
        return None;
    }
    ip.copy_from_slice(bytes);
    Some(Ipv4Addr::from(ip))
}

/// Checks the group bit of a MAC address, which is set for broadcasts and multicasts
pub fn is_multicast(mac: &MacAddress) -> bool {
    mac.bytes()[0] & 0x01 == 0x01
}

impl Arp {
    fn parse(bytes: &[u8]) -> Result<Arp, Error> {
        let arp = ArpPacketSlice::from_slice(bytes).map_err(|_| Error::Truncated("ARP"))?;
        if arp.hw_addr_type() != ArpHardwareId::ETHERNET || arp.proto_addr_type() != EtherType::IPV4 {
            return Err(Error::UnsupportedArp);
        }
        let addrs = (
            mac_from(arp.sender_hw_addr()),
            ipv4_from(arp.sender_protocol_addr()),
            mac_from(arp.target_hw_addr()),
            ipv4_from(arp.target_protocol_addr()),
        );
        match addrs {
            (Some(sender_mac), Some(sender_ip), Some(target_mac), Some(target_ip)) => Ok(Arp {
                operation: arp.operation(),
                sender_mac,
                sender_ip,
                target_mac,
                target_ip,
            }),
            _ => Err(Error::UnsupportedArp),
        }
    }
}

impl EthernetFrame {
    /// Parses the frame's Ethernet header and, for ARP and IPv4, its network layer
    pub fn parse(bytes: &[u8]) -> Result<EthernetFrame, Error> {
        let (eth, net) = Ethernet2Header::from_slice(bytes).map_err(|_| Error::Truncated("Ethernet"))?;
        let payload = match eth.ether_type {
            EtherType::ARP => Payload::Arp(Arp::parse(net)?),
            EtherType::IPV4 => {
                let (ip, _) = Ipv4Header::from_slice(net).map_err(|e| match e {
                    HeaderSliceError::Len(_) => Error::Truncated("IPv4"),
                    HeaderSliceError::Content(_) => Error::InvalidIpv4,
                })?;
                Payload::Ipv4(Ipv4Addrs {
                    src: Ipv4Addr::from(ip.source),
                    dst: Ipv4Addr::from(ip.destination),
                })
            }
            other => Payload::Other(other.0),
        };
        Ok(EthernetFrame {
            dst: MacAddress::new(eth.destination),
            src: MacAddress::new(eth.source),
            payload,
        })
    }
}

/// Builds a broadcast ARP request for `target_ip`
/// originating from `sender_mac` and `sender_ip`
pub fn arp_request(sender_mac: &MacAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> io::Result<Vec<u8>> {
    let eth = Ethernet2Header {
        source: sender_mac.bytes(),
        destination: broadcast().bytes(),
        ether_type: EtherType::ARP,
    };
    let arp = ArpPacket::new(
        ArpHardwareId::ETHERNET,
        EtherType::IPV4,
        ArpOperation::REQUEST,
        &sender_mac.bytes(),
        &sender_ip.octets(),
        &[0; 6],
        &target_ip.octets(),
    )
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{:?}", e)))?;

    let mut frame = vec![];
    eth.write(&mut frame)?;
    arp.write(&mut frame)?;
    Ok(frame)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use etherparse::IpNumber;
    use std::str::FromStr;

    /// Builds an ARP reply frame from `sender` to `target`
    pub fn arp_reply(
        sender_mac: &MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: &MacAddress,
        target_ip: Ipv4Addr,
    ) -> Vec<u8> {
        let eth = Ethernet2Header {
            source: sender_mac.bytes(),
            destination: target_mac.bytes(),
            ether_type: EtherType::ARP,
        };
        let arp = ArpPacket::new(
            ArpHardwareId::ETHERNET,
            EtherType::IPV4,
            ArpOperation::REPLY,
            &sender_mac.bytes(),
            &sender_ip.octets(),
            &target_mac.bytes(),
            &target_ip.octets(),
        )
        .unwrap();
        let mut frame = vec![];
        eth.write(&mut frame).unwrap();
        arp.write(&mut frame).unwrap();
        frame
    }

    /// Builds a minimal IPv4 frame without payload
    pub fn ipv4_frame(src_mac: &MacAddress, dst_mac: &MacAddress, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        let eth = Ethernet2Header {
            source: src_mac.bytes(),
            destination: dst_mac.bytes(),
            ether_type: EtherType::IPV4,
        };
        let ip = Ipv4Header::new(0, 64, IpNumber::UDP, src.octets(), dst.octets()).unwrap();
        let mut frame = vec![];
        eth.write(&mut frame).unwrap();
        ip.write(&mut frame).unwrap();
        frame
    }

    fn mac(s: &str) -> MacAddress {
        MacAddress::from_str(s).unwrap()
    }

    #[test]
    fn arp_request_layout() {
        let ctrl = mac("02:00:00:00:00:fe");
        let bytes = arp_request(&ctrl, Ipv4Addr::new(10, 0, 0, 254), Ipv4Addr::new(10, 0, 0, 5)).unwrap();
        assert_eq!(42, bytes.len());
        let frame = EthernetFrame::parse(&bytes).unwrap();
        assert_eq!(broadcast(), frame.dst);
        assert_eq!(ctrl, frame.src);
        match frame.payload {
            Payload::Arp(arp) => {
                assert_eq!(ArpOperation::REQUEST, arp.operation);
                assert_eq!(Ipv4Addr::new(10, 0, 0, 5), arp.target_ip);
                assert_eq!(Ipv4Addr::new(10, 0, 0, 254), arp.sender_ip);
                assert_eq!(MacAddress::new([0; 6]), arp.target_mac);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn arp_reply_addresses() {
        let host = mac("02:00:00:00:00:02");
        let ctrl = mac("02:00:00:00:00:fe");
        let bytes = arp_reply(&host, Ipv4Addr::new(10, 0, 0, 2), &ctrl, Ipv4Addr::new(10, 0, 0, 254));
        let expected = Payload::Arp(Arp {
            operation: ArpOperation::REPLY,
            sender_mac: host,
            sender_ip: Ipv4Addr::new(10, 0, 0, 2),
            target_mac: ctrl,
            target_ip: Ipv4Addr::new(10, 0, 0, 254),
        });
        assert_eq!(expected, EthernetFrame::parse(&bytes).unwrap().payload);
    }

    #[test]
    fn ipv4_addresses() {
        let bytes = ipv4_frame(
            &mac("02:00:00:00:00:01"),
            &mac("02:00:00:00:00:02"),
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(10, 0, 0, 9),
        );
        let frame = EthernetFrame::parse(&bytes).unwrap();
        let expected = Payload::Ipv4(Ipv4Addrs {
            src: Ipv4Addr::new(10, 0, 0, 5),
            dst: Ipv4Addr::new(10, 0, 0, 9),
        });
        assert_eq!(expected, frame.payload);
    }

    #[test]
    fn truncated_frames() {
        assert_eq!(Err(Error::Truncated("Ethernet")), EthernetFrame::parse(&[0; 13]));
        let mut bytes = vec![0; 12];
        bytes.extend_from_slice(&[0x08, 0x06, 0, 1]);
        assert_eq!(Err(Error::Truncated("ARP")), EthernetFrame::parse(&bytes));
        let mut bytes = vec![0; 12];
        bytes.extend_from_slice(&[0x08, 0x00, 0x45, 0]);
        assert_eq!(Err(Error::Truncated("IPv4")), EthernetFrame::parse(&bytes));
    }

    #[test]
    fn malformed_ipv4() {
        let mut bytes = vec![0; 12];
        bytes.extend_from_slice(&[0x08, 0x00]);
        // version 6 in an IPv4 frame
        bytes.extend_from_slice(&[0x65; 20]);
        assert_eq!(Err(Error::InvalidIpv4), EthernetFrame::parse(&bytes));
    }

    #[test]
    fn other_ether_types() {
        let mut bytes = vec![0; 12];
        bytes.extend_from_slice(&[0x86, 0xdd]);
        assert_eq!(Payload::Other(0x86dd), EthernetFrame::parse(&bytes).unwrap().payload);
    }

    #[test]
    fn multicast_bit() {
        assert!(is_multicast(&broadcast()));
        assert!(is_multicast(&mac("01:00:5e:00:00:01")));
        assert!(!is_multicast(&mac("02:00:00:00:00:01")));
    }
}
