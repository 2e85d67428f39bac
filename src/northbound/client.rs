//! The orchestrator's end of the northbound connection

use super::{write_frame, Result};
use crate::protocol::Message;

use std::net::{Ipv4Addr, Shutdown, TcpStream, ToSocketAddrs};

/// Carries the orchestrator's messages to the flow controller of one switch
pub trait ControlChannel {
    /// The switch the channel leads to
    fn dpid(&self) -> u64;

    /// Sends one message
    fn send(&mut self, msg: &Message) -> Result<()>;
}

pub struct NorthboundClient {
    stream: TcpStream,
    dpid: u64,
}

impl NorthboundClient {
    /// Connects to a flow controller and says hello.
    /// `reachable_ip` is announced as the sender address of the controller's ARP requests.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        dpid: u64,
        reachable_ip: Option<Ipv4Addr>,
    ) -> Result<NorthboundClient> {
        let stream = TcpStream::connect(addr)?;
        info!("Connected to the flow controller at {}", stream.peer_addr()?);
        let mut client = NorthboundClient { stream, dpid };
        client.send(&Message::hello(dpid, reachable_ip))?;
        Ok(client)
    }

    /// Says goodbye and closes the connection
    pub fn close(mut self) -> Result<()> {
        let bye = Message::bye(self.dpid);
        self.send(&bye)?;
        self.stream.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

impl ControlChannel for NorthboundClient {
    fn dpid(&self) -> u64 {
        self.dpid
    }

    fn send(&mut self, msg: &Message) -> Result<()> {
        let payload = msg.encode()?;
        debug!("Sending northbound message: {:?}", msg);
        write_frame(&mut self.stream, &payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::northbound::read_frame;
    use crate::protocol::Action;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn hello_first_and_bye_last() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut msgs = vec![];
            while let Some(frame) = read_frame(&mut stream).unwrap() {
                msgs.push(Message::decode(&frame).unwrap());
            }
            msgs
        });

        let ip = Ipv4Addr::new(10, 0, 0, 254);
        let mut client = NorthboundClient::connect(addr, 5, Some(ip)).unwrap();
        assert_eq!(5, client.dpid());
        client.send(&Message::del_chain(5, "5-0")).unwrap();
        client.close().unwrap();

        let msgs = server.join().unwrap();
        let actions: Vec<_> = msgs.iter().map(|m| m.action).collect();
        assert_eq!(
            vec![Some(Action::Hello), Some(Action::DelChain), Some(Action::Bye)],
            actions
        );
        assert_eq!(Some(ip), msgs[0].controller_ip);
        assert!(msgs.iter().all(|m| m.dpid == 5));
    }

    #[test]
    fn incomplete_message_is_not_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || listener.accept().unwrap());

        let mut client = NorthboundClient::connect(addr, 5, None).unwrap();
        let _conn = server.join().unwrap();
        let empty_chain = Message::add_chain(5, "5-0", vec![]);
        assert!(client.send(&empty_chain).is_err());
    }
}
