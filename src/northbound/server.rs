//! Accepts orchestrator connections and routes their messages to the switch sessions

use super::{read_frame, Result};
use crate::openflow::SwitchTable;
use crate::protocol::{Action, Message};

use std::io::{BufRead, BufReader};
use std::net::{TcpListener, TcpStream};
use std::thread;

/// Serves every accepted connection in its own thread. Never returns.
pub fn serve(listener: TcpListener, switches: SwitchTable) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Could not accept a northbound connection: {}", e);
                continue;
            }
        };
        let switches = switches.clone();
        thread::spawn(move || {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown peer".to_owned());
            info!("Northbound connection from {}", peer);
            match handle_connection(stream, &switches) {
                Ok(()) => info!("Northbound connection from {} closed", peer),
                Err(e) => error!("Northbound connection from {} failed: {}", peer, e),
            }
        });
    }
}

fn handle_connection(stream: TcpStream, switches: &SwitchTable) -> Result<()> {
    handle_messages(BufReader::new(stream), |msg| {
        switches.dispatch(msg);
    })
}

/// Decodes the frames of one connection in arrival order until Bye or end of stream.
/// Undecodable messages are dropped, corrupt frames end the connection.
fn handle_messages<R: BufRead, F: FnMut(Message)>(mut reader: R, mut dispatch: F) -> Result<()> {
    while let Some(frame) = read_frame(&mut reader)? {
        let msg = match Message::decode(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping northbound message: {}", e);
                continue;
            }
        };
        debug!("Northbound message: {:?}", msg);
        let bye = msg.action == Some(Action::Bye);
        dispatch(msg);
        if bye {
            break;
        }
    }
    Ok(())
}
