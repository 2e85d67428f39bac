/*!
The northbound message exchanged between the orchestrator and the flow controller

A message is a JSON object with a fixed set of fields:

```json
{
  "Type": 1,
  "Action": 0,
  "POX IP": null,
  "DPID": 1,
  "Source": null,
  "Destination": null,
  "ChainID": "1-0",
  "Chain": [{"IP": "10.0.0.1", "MAC": "aa:aa:aa:aa:aa:aa"}]
}
```

`Type` is the `MessageClass` and `Action` is numbered per class.
Unknown fields are ignored on decoding, unknown classes or actions are not.
*/

use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use std::error;
use std::fmt;
use std::net::Ipv4Addr;
use std::result;

/// Identifies a service chain, unique per switch
pub type ChainId = String;

/// The `ChainID` value for messages that do not refer to a chain
const NO_CHAIN_ID: i64 = -1;

#[derive(Debug)]
pub enum Error {
    /// The message misses the named field or has it in an inconsistent state
    IncompletePayload(&'static str),
    /// The `Type` value is not a `MessageClass`
    UnknownClass(i64),
    /// The `Action` value is not defined for the `MessageClass`
    UnknownAction(MessageClass, i64),
    /// The message is not a JSON object with the expected field types
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IncompletePayload(field) => {
                write!(f, "Incomplete payload: missing or inconsistent '{}'", field)
            }
            Error::UnknownClass(class) => write!(f, "Unknown message type {}", class),
            Error::UnknownAction(class, action) => {
                write!(f, "Unknown action {} for {:?} message", action, class)
            }
            Error::Json(ref e) => write!(f, "Malformed message: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Json(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Distinguishes session management from chain and path manipulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Meta = 0,
    Control = 1,
}

impl MessageClass {
    fn from_code(code: i64) -> Result<MessageClass> {
        match code {
            0 => Ok(MessageClass::Meta),
            1 => Ok(MessageClass::Control),
            _ => Err(Error::UnknownClass(code)),
        }
    }
}

/// What a message asks the flow controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hello,
    Bye,
    AddChain,
    DelChain,
    AddPath,
    DelPath,
}

impl Action {
    /// The class the action is defined for
    pub fn class(self) -> MessageClass {
        match self {
            Action::Hello | Action::Bye => MessageClass::Meta,
            _ => MessageClass::Control,
        }
    }

    /// The action's number within its class
    fn code(self) -> i64 {
        match self {
            Action::Hello => 0,
            Action::Bye => 1,
            Action::AddChain => 0,
            Action::DelChain => 1,
            Action::AddPath => 2,
            Action::DelPath => 3,
        }
    }

    fn from_code(class: MessageClass, code: i64) -> Result<Action> {
        match (class, code) {
            (MessageClass::Meta, 0) => Ok(Action::Hello),
            (MessageClass::Meta, 1) => Ok(Action::Bye),
            (MessageClass::Control, 0) => Ok(Action::AddChain),
            (MessageClass::Control, 1) => Ok(Action::DelChain),
            (MessageClass::Control, 2) => Ok(Action::AddPath),
            (MessageClass::Control, 3) => Ok(Action::DelPath),
            _ => Err(Error::UnknownAction(class, code)),
        }
    }
}

mod mac_serde {
    use mac_address::MacAddress;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(mac: &MacAddress, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(mac)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MacAddress, D::Error> {
        let s = String::deserialize(deserializer)?;
        MacAddress::from_str(&s).map_err(|e| D::Error::custom(format!("{}: {:?}", s, e)))
    }
}

/// The data-plane address of a host or network function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDesc {
    #[serde(rename = "IP")]
    pub ip: Ipv4Addr,
    #[serde(rename = "MAC", with = "mac_serde")]
    pub mac: MacAddress,
}

impl EndpointDesc {
    pub fn new(ip: Ipv4Addr, mac: MacAddress) -> EndpointDesc {
        EndpointDesc { ip, mac }
    }
}

impl fmt::Display for EndpointDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.mac)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireChainId {
    Number(i64),
    Text(String),
}

/// The JSON object as it is sent over the wire
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "Type")]
    class: i64,
    #[serde(rename = "Action")]
    action: i64,
    #[serde(rename = "POX IP", default)]
    controller_ip: Option<Ipv4Addr>,
    #[serde(rename = "DPID", default)]
    dpid: u64,
    #[serde(rename = "Source", default)]
    source: Option<EndpointDesc>,
    #[serde(rename = "Destination", default)]
    destination: Option<EndpointDesc>,
    #[serde(rename = "ChainID", default)]
    chain_id: Option<WireChainId>,
    #[serde(rename = "Chain", default)]
    chain: Vec<EndpointDesc>,
}

/// A validated view on a `Message`
#[derive(Debug, PartialEq)]
pub enum Command<'a> {
    Hello {
        controller_ip: Option<Ipv4Addr>,
    },
    Bye,
    AddChain {
        chain_id: &'a str,
        chain: &'a [EndpointDesc],
    },
    DelChain {
        chain_id: &'a str,
    },
    AddPath {
        source: &'a EndpointDesc,
        destination: &'a EndpointDesc,
        chain_id: &'a str,
    },
    DelPath {
        source: &'a EndpointDesc,
        destination: &'a EndpointDesc,
    },
}

/// One northbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub class: MessageClass,
    pub action: Option<Action>,
    /// The IP address the flow controller uses as sender of its ARP requests.
    /// Only set on `Action::Hello`.
    pub controller_ip: Option<Ipv4Addr>,
    /// The switch the message is meant for
    pub dpid: u64,
    pub source: Option<EndpointDesc>,
    pub destination: Option<EndpointDesc>,
    pub chain_id: Option<ChainId>,
    /// The ordered chain members. Only set on `Action::AddChain`.
    pub chain: Vec<EndpointDesc>,
}

impl Message {
    fn new(action: Action, dpid: u64) -> Message {
        Message {
            class: action.class(),
            action: Some(action),
            controller_ip: None,
            dpid,
            source: None,
            destination: None,
            chain_id: None,
            chain: vec![],
        }
    }

    pub fn hello(dpid: u64, controller_ip: Option<Ipv4Addr>) -> Message {
        Message {
            controller_ip,
            ..Message::new(Action::Hello, dpid)
        }
    }

    pub fn bye(dpid: u64) -> Message {
        Message::new(Action::Bye, dpid)
    }

    pub fn add_chain(dpid: u64, chain_id: &str, chain: Vec<EndpointDesc>) -> Message {
        Message {
            chain_id: Some(chain_id.to_owned()),
            chain,
            ..Message::new(Action::AddChain, dpid)
        }
    }

    pub fn del_chain(dpid: u64, chain_id: &str) -> Message {
        Message {
            chain_id: Some(chain_id.to_owned()),
            ..Message::new(Action::DelChain, dpid)
        }
    }

    pub fn add_path(dpid: u64, source: EndpointDesc, destination: EndpointDesc, chain_id: &str) -> Message {
        Message {
            source: Some(source),
            destination: Some(destination),
            chain_id: Some(chain_id.to_owned()),
            ..Message::new(Action::AddPath, dpid)
        }
    }

    pub fn del_path(dpid: u64, source: EndpointDesc, destination: EndpointDesc) -> Message {
        Message {
            source: Some(source),
            destination: Some(destination),
            ..Message::new(Action::DelPath, dpid)
        }
    }

    /// Checks the message for completeness and returns what it asks for
    pub fn command(&self) -> Result<Command> {
        let action = self.action.ok_or(Error::IncompletePayload("Action"))?;
        if action.class() != self.class {
            return Err(Error::IncompletePayload("Type"));
        }
        let chain_id = self
            .chain_id
            .as_ref()
            .map(String::as_str)
            .ok_or(Error::IncompletePayload("ChainID"));
        let source = self.source.as_ref().ok_or(Error::IncompletePayload("Source"));
        let destination = self
            .destination
            .as_ref()
            .ok_or(Error::IncompletePayload("Destination"));

        Ok(match action {
            Action::Hello => Command::Hello {
                controller_ip: self.controller_ip,
            },
            Action::Bye => Command::Bye,
            Action::AddChain => {
                if self.chain.is_empty() {
                    return Err(Error::IncompletePayload("Chain"));
                }
                Command::AddChain {
                    chain_id: chain_id?,
                    chain: &self.chain,
                }
            }
            Action::DelChain => Command::DelChain {
                chain_id: chain_id?,
            },
            Action::AddPath => Command::AddPath {
                source: source?,
                destination: destination?,
                chain_id: chain_id?,
            },
            Action::DelPath => Command::DelPath {
                source: source?,
                destination: destination?,
            },
        })
    }

    /// Serializes a complete message to JSON
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.command()?;
        let action = self.action.ok_or(Error::IncompletePayload("Action"))?;
        let wire = WireMessage {
            class: self.class as i64,
            action: action.code(),
            controller_ip: self.controller_ip,
            dpid: self.dpid,
            source: self.source,
            destination: self.destination,
            chain_id: Some(match self.chain_id {
                Some(ref id) => WireChainId::Text(id.clone()),
                None => WireChainId::Number(NO_CHAIN_ID),
            }),
            chain: self.chain.clone(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Deserializes a message from JSON.
    /// The message is not checked for completeness, use `Message::command` for that.
    pub fn decode(bytes: &[u8]) -> Result<Message> {
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        let class = MessageClass::from_code(wire.class)?;
        let action = Action::from_code(class, wire.action)?;
        let chain_id = match wire.chain_id {
            None => None,
            Some(WireChainId::Number(n)) if n < 0 => None,
            Some(WireChainId::Number(n)) => Some(n.to_string()),
            Some(WireChainId::Text(s)) => Some(s),
        };
        Ok(Message {
            class,
            action: Some(action),
            controller_ip: wire.controller_ip,
            dpid: wire.dpid,
            source: wire.source,
            destination: wire.destination,
            chain_id,
            chain: wire.chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn endpoint(ip: &str, mac: &str) -> EndpointDesc {
        EndpointDesc::new(Ipv4Addr::from_str(ip).unwrap(), MacAddress::from_str(mac).unwrap())
    }

    fn incomplete_field(res: Result<Vec<u8>>) -> &'static str {
        match res {
            Err(Error::IncompletePayload(field)) => field,
            other => panic!("expected an incomplete payload, got {:?}", other),
        }
    }

    #[test]
    fn add_chain_round_trip() {
        let member = endpoint("10.0.0.1", "aa:aa:aa:aa:aa:aa");
        let msg = Message::add_chain(1, "7", vec![member]);
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(MessageClass::Control, decoded.class);
        assert_eq!(Some(Action::AddChain), decoded.action);
        assert_eq!(Some("7".to_owned()), decoded.chain_id);
        assert_eq!(vec![member], decoded.chain);
        assert_eq!(msg, decoded);
    }

    #[test]
    fn empty_chain_is_incomplete() {
        let msg = Message::add_chain(1, "7", vec![]);
        assert_eq!("Chain", incomplete_field(msg.encode()));
    }

    #[test]
    fn add_path_without_source_is_incomplete() {
        let dst = endpoint("10.0.0.9", "02:00:00:00:00:09");
        let mut msg = Message::add_path(1, dst, dst, "1-0");
        msg.source = None;
        assert_eq!("Source", incomplete_field(msg.encode()));
    }

    #[test]
    fn del_path_without_destination_is_incomplete() {
        let src = endpoint("10.0.0.5", "02:00:00:00:00:05");
        let mut msg = Message::del_path(1, src, src);
        msg.destination = None;
        assert_eq!("Destination", incomplete_field(msg.encode()));
    }

    #[test]
    fn control_without_chain_id_is_incomplete() {
        let mut msg = Message::del_chain(1, "1-0");
        msg.chain_id = None;
        assert_eq!("ChainID", incomplete_field(msg.encode()));

        let ep = endpoint("10.0.0.5", "02:00:00:00:00:05");
        let mut msg = Message::add_path(1, ep, ep, "1-0");
        msg.chain_id = None;
        assert_eq!("ChainID", incomplete_field(msg.encode()));
    }

    #[test]
    fn del_path_needs_no_chain_id() {
        let ep = endpoint("10.0.0.5", "02:00:00:00:00:05");
        assert!(Message::del_path(1, ep, ep).encode().is_ok());
    }

    #[test]
    fn unset_action_is_incomplete() {
        let mut msg = Message::bye(1);
        msg.action = None;
        assert_eq!("Action", incomplete_field(msg.encode()));
    }

    #[test]
    fn inconsistent_class_is_incomplete() {
        let mut msg = Message::hello(1, None);
        msg.class = MessageClass::Control;
        assert_eq!("Type", incomplete_field(msg.encode()));
    }

    #[test]
    fn hello_carries_controller_ip() {
        let msg = Message::hello(3, Some(Ipv4Addr::new(10, 0, 0, 254)));
        let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["POX IP"], "10.0.0.254");
        assert_eq!(json["DPID"], 3);
        assert_eq!(json["ChainID"], -1);
        assert_eq!(json["Type"], 0);
        assert_eq!(json["Action"], 0);
    }

    #[test]
    fn decode_tolerates_unknown_fields() {
        let json = br#"{"Type": 1, "Action": 1, "DPID": 2, "ChainID": 12, "Comment": "x"}"#;
        let msg = Message::decode(json).unwrap();
        assert_eq!(Some(Action::DelChain), msg.action);
        assert_eq!(Some("12".to_owned()), msg.chain_id);
        assert_eq!(Command::DelChain { chain_id: "12" }, msg.command().unwrap());
    }

    #[test]
    fn decode_rejects_unknown_codes() {
        match Message::decode(br#"{"Type": 2, "Action": 0}"#) {
            Err(Error::UnknownClass(2)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match Message::decode(br#"{"Type": 0, "Action": 2}"#) {
            Err(Error::UnknownAction(MessageClass::Meta, 2)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_malformed_json() {
        match Message::decode(b"{\"Type\": ") {
            Err(Error::Json(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match Message::decode(br#"{"Type": 1, "Action": 2, "Source": {"IP": "10.0.0.1", "MAC": "zz"}}"#) {
            Err(Error::Json(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
