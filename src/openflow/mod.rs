/*!
Implements an OpenFlow Controller with protocol version 0x04 compatibility.
It provides only a small subset of the OpenFlow features to steer traffic
through service chains and to switch everything else by L2 learning.

Every switch connection is served by a session thread that owns the switch's
`FlowController`. A reader thread feeds the session with the switch's messages
and the northbound server feeds it with the orchestrator's messages, both via
the same channel, so all state changes of one switch are serialized.
*/

pub mod error;
pub mod messages;

use crate::conf::FlowConf;
use crate::flow_controller::FlowController;
use crate::protocol::Message;

use self::error::{Error, Result};
use self::messages::deserialize::Deserialize;
use self::messages::serialize::OfpPacket;
use self::messages::*;

use std::collections::HashMap;
use std::io;
use std::io::Read;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

pub(crate) fn gen_xid() -> u32 {
    let xid = rand::random();
    trace!("Using xid {} for the outgoing message", xid);
    xid
}

/// Everything a switch session reacts on
#[derive(Debug)]
pub enum SwitchEvent {
    /// A message from the switch with its raw header
    OpenFlow([u8; 8], Vec<u8>),
    /// A message from the orchestrator
    Northbound(Message),
    /// The switch connection is lost
    Down(io::Error),
}

struct Registration {
    session: usize,
    tx: Sender<SwitchEvent>,
}

/// The connected switches by datapath id
#[derive(Clone, Default)]
pub struct SwitchTable {
    switches: Arc<RwLock<HashMap<u64, Registration>>>,
    sessions: Arc<AtomicUsize>,
}

impl SwitchTable {
    pub fn new() -> SwitchTable {
        SwitchTable::default()
    }

    /// Makes a session reachable by its switch's datapath id.
    /// Returns the registration's id.
    fn register(&self, dpid: u64, tx: Sender<SwitchEvent>) -> usize {
        let session = self.sessions.fetch_add(1, Ordering::Relaxed);
        let mut switches = self.switches.write().unwrap_or_else(PoisonError::into_inner);
        if switches.insert(dpid, Registration { session, tx }).is_some() {
            warn!("Switch {:x} reconnected, dropping its former session", dpid);
        }
        session
    }

    /// Removes a registration unless the switch has reconnected in the meantime
    fn unregister(&self, dpid: u64, session: usize) {
        let mut switches = self.switches.write().unwrap_or_else(PoisonError::into_inner);
        if switches.get(&dpid).map_or(false, |r| r.session == session) {
            switches.remove(&dpid);
            info!("Switch {:x} disconnected", dpid);
        }
    }

    /// Hands a northbound message to the session of its switch.
    /// Returns false if the switch is not connected.
    pub fn dispatch(&self, msg: Message) -> bool {
        let switches = self.switches.read().unwrap_or_else(PoisonError::into_inner);
        let dpid = msg.dpid;
        match switches.get(&dpid) {
            Some(registration) => registration.tx.send(SwitchEvent::Northbound(msg)).is_ok(),
            None => {
                warn!("Dropping northbound message for unknown switch {:x}", dpid);
                false
            }
        }
    }

    /// The datapath ids of all connected switches
    pub fn connected(&self) -> Vec<u64> {
        let switches = self.switches.read().unwrap_or_else(PoisonError::into_inner);
        switches.keys().cloned().collect()
    }
}

fn read_message(stream: &mut TcpStream) -> io::Result<([u8; 8], Vec<u8>)> {
    let mut hbuf = [0; 8];
    stream.read_exact(&mut hbuf)?;
    let header = OfpHeader::deserialize(&hbuf);
    let mut body = vec![0; header.body_length()];
    stream.read_exact(&mut body)?;
    Ok((hbuf, body))
}

/// Forwards the switch's messages to its session until the connection fails
fn read_messages(mut stream: TcpStream, tx: Sender<SwitchEvent>) {
    loop {
        let event = match read_message(&mut stream) {
            Ok((hbuf, body)) => SwitchEvent::OpenFlow(hbuf, body),
            Err(e) => SwitchEvent::Down(e),
        };
        let down = match event {
            SwitchEvent::Down(_) => true,
            _ => false,
        };
        if tx.send(event).is_err() || down {
            return;
        }
    }
}

/// The session with one switch.
/// Use the run function to create running instances.
pub struct OfSession<'a> {
    conf: &'a FlowConf,
    switches: &'a SwitchTable,
    stream: TcpStream,
    tx: Sender<SwitchEvent>,
    hello_received: bool,
    registration: Option<(u64, usize)>,
    flows: Option<FlowController<TcpStream>>,
}

impl<'a> OfSession<'a> {
    fn handle_ofp_message(&mut self, header: &OfpHeader, buf: Vec<u8>) -> Result<()> {
        debug!("Incoming message: {:?}", header);

        // Process the message
        let t = header.typ();
        if t == OfpType::Hello as u8 {
            // simple version discovery
            if header.version() < OFP_VERSION {
                return Err(Error::HelloFailed);
            }
            self.hello_received = true;
            let req = OfpHeader::new(OfpType::FeaturesRequest, gen_xid());
            req.serialize(&mut self.stream)?;
        }
        else if !self.hello_received || header.version() != OFP_VERSION {
            return Err(Error::BadRequest(OfpBadRequestCode::BadVersion, buf));
        }
        else if t == OfpType::EchoRequest as u8 {
            // The EchoReply takes the same body byte stream as the EchoRequest
            let req = OfpEchoRequest::deserialize(buf)?;
            let rep = OfpEchoReply::new(req.arbitrary());
            rep.serialize(&mut self.stream, header.xid())?;
        }
        else if t == OfpType::FeaturesReply as u8 {
            let features = OfpSwitchFeatures::deserialize(buf)?;
            self.connection_up(features.datapath_id())?;
        }
        else if t == OfpType::PacketIn as u8 {
            let packet_in = OfpPacketIn::deserialize(buf)?;
            match self.flows {
                Some(ref mut flows) => flows.handle_packet_in(&packet_in)?,
                None => debug!("Ignoring packet-in before the features reply"),
            }
        }
        else if t == OfpType::PortStatus as u8 || t == OfpType::FlowRemoved as u8 {
            // Ignore. Can be received before unsubscribing via OfpType::SetAsync.
            trace!("Ignoring asynchronous message of type {}", t);
        }
        else if t == OfpType::Error as u8 {
            let error = OfpErrorMsg::deserialize(buf)?;
            if let Err(e) = error.fail_on_bad_port() {
                // a single broken hop does not affect the other paths
                warn!("{}", e);
            }
            else if error.check_table_full() {
                error!(
                    "Table {} does not have enough free memory for a new Flow. {}",
                    self.conf.table.id, error
                );
            }
            else {
                error!("Unexpected {}", error);
                debug!("Full error message: {:?}", error);
            }
        }
        else {
            debug!(
                "Cannot interpret message of type {}. Full message body: {:?}",
                header.typ(),
                buf
            );
            return Err(Error::BadRequest(OfpBadRequestCode::BadType, buf));
        }
        Ok(())
    }

    /// Configures a switch that identified itself and makes it reachable for the orchestrator
    fn connection_up(&mut self, dpid: u64) -> io::Result<()> {
        info!("The connected switch identified itself with datapath id {:x}", dpid);
        self.connection_down();

        OfpSwitchConfig::new_unbuffered().serialize(&mut self.stream, gen_xid())?;
        OfpAsyncConfig::packet_in_only().serialize(&mut self.stream, gen_xid())?;

        let mut flows = FlowController::new(dpid, self.stream.try_clone()?, self.conf.clone());
        flows.connection_up()?;
        self.flows = Some(flows);

        let session = self.switches.register(dpid, self.tx.clone());
        self.registration = Some((dpid, session));
        Ok(())
    }

    /// Drops all state of the switch
    fn connection_down(&mut self) {
        if let Some((dpid, session)) = self.registration.take() {
            self.switches.unregister(dpid, session);
        }
        self.flows = None;
    }

    fn handle_northbound(&mut self, msg: &Message) -> io::Result<()> {
        debug!("Northbound message: {:?}", msg);
        match self.flows {
            Some(ref mut flows) => flows.handle_northbound(msg),
            None => {
                warn!("Dropping northbound message for a switch that is not up");
                Ok(())
            }
        }
    }

    fn handle_of_errors(
        &mut self,
        error: Error,
        header: &OfpHeader,
        header_buf: &[u8],
    ) -> io::Result<()> {
        let err_msg = match error {
            Error::Io(e) => return Err(e),
            Error::HelloFailed => {
                let msg = format!(
                    "The connected switch supports only OpenFlow protocol version {:x}",
                    header.version()
                );
                let err = OfpErrorMsg::new_hello_failed();
                err.serialize(&mut self.stream, header.xid())?;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, msg));
            }
            Error::BadRequest(code, buf) => OfpErrorMsg::new_bad_request(code, header_buf, &buf),
        };
        debug!("Outgoing error message: {:?}", err_msg);
        err_msg.serialize(&mut self.stream, header.xid())
    }

    fn handle_events(&mut self, rx: &Receiver<SwitchEvent>) -> io::Result<()> {
        for event in rx.iter() {
            match event {
                SwitchEvent::OpenFlow(hbuf, body) => {
                    let header = OfpHeader::deserialize(&hbuf);
                    if let Err(e) = self.handle_ofp_message(&header, body) {
                        self.handle_of_errors(e, &header, &hbuf)?;
                    }
                }
                SwitchEvent::Northbound(msg) => self.handle_northbound(&msg)?,
                SwitchEvent::Down(e) => {
                    return match e.kind() {
                        io::ErrorKind::UnexpectedEof => Ok(()),
                        _ => Err(e),
                    };
                }
            }
        }
        Ok(())
    }

    /// Manages the lifetime of a switch session by sending a Hello message
    /// and handling incoming messages both from the switch and the orchestrator.
    /// Returns when the switch disconnects.
    /// Is an implicit factory for OfSession instances.
    pub fn run(stream: TcpStream, conf: &FlowConf, switches: &SwitchTable) -> io::Result<()> {
        let addr = stream.peer_addr()?;
        info!("connection from {}", addr);

        let (tx, rx) = channel();
        let reader = stream.try_clone()?;
        let reader_tx = tx.clone();
        thread::spawn(move || read_messages(reader, reader_tx));

        let mut session = OfSession {
            conf,
            switches,
            stream,
            tx,
            hello_received: false,
            registration: None,
            flows: None,
        };

        // Send a Hello
        // Rely on the simple version: If one Hello is empty,
        // the smaller OfpHeader::version is agreed upon
        let hello = OfpHeader::new(OfpType::Hello, gen_xid());
        let res = hello
            .serialize(&mut session.stream)
            .and_then(|_| session.handle_events(&rx));

        session.connection_down();
        // ends the reader thread
        let _ = session.stream.shutdown(Shutdown::Both);
        info!("connection from {} closed", addr);
        res
    }
}
