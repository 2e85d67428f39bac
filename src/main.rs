/*!
An OpenFlow controller that splices traffic through chains of virtual network functions.

The controller accepts any number of switches and one orchestrator connection
per switch. You can use mininet as a test switch.
To spawn an instance with 4 ports you can run:

```sh
# mn --controller remote,port=6653 --topo single,4 --switch ovs,protocols=OpenFlow13
```
*/

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use sfc_controller::conf;
use sfc_controller::northbound::server;
use sfc_controller::openflow::{OfSession, SwitchTable};

#[cfg(unix)]
use std::fs::File;
use std::io;
#[cfg(unix)]
use std::io::prelude::*;
use std::net;
use std::process::exit;
use std::sync::Arc;
use std::thread;

fn init_logging(level: log::Level, use_syslog: bool) -> io::Result<()> {
    let to_io = |e: String| io::Error::new(io::ErrorKind::Other, format!("error on logging initialization: {}", e));
    if use_syslog {
        #[cfg(unix)]
        {
            syslog::init(syslog::Facility::LOG_USER, level.to_level_filter(), Some(crate_name!()))
                .map_err(|e| to_io(e.to_string()))?;
            log_panics::init();
        }
        Ok(())
    }
    else {
        simple_logger::init_with_level(level).map_err(|e| to_io(e.to_string()))
    }
}

/// Reads command line arguments and calls the corresponding functions.
fn handle_cli_args() -> io::Result<()> {
    #[cfg(unix)]
    let unix_opts =
        "-p, --pid [file] 'Daemonizes the process and writes a PID file'
        -s, --syslog      'Logs via syslog'
        ";
    #[cfg(not(unix))]
    let unix_opts = "";

    let usage = &format!(
        "{}-v...          'Repeat to set the level of verbosity'
        -c, --conf <ini>  'The INI configuration file.'"
    , unix_opts);
    let matches = app_from_crate!().args_from_usage(usage).get_matches();

    let log_lvl = match matches.occurrences_of("v") {
        0 => log::Level::Error,
        1 => log::Level::Warn,
        2 => log::Level::Info,
        3 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    init_logging(log_lvl, matches.is_present("syslog"))?;

    let conf_path = matches
        .value_of("conf")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "configuration file missing"))?;
    let conf = conf::parse_file(conf_path)?;

    #[cfg(unix)] {
        if matches.is_present("pid") {
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(io::Error::last_os_error());
            } else if pid > 0 {
                // exit the parent process
                exit(0);
            }
            let pid_path = matches
                .value_of("pid")
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "pid file path missing"))?;
            let mut file = File::create(pid_path)?;
            write!(file, "{}", unsafe { libc::getpid() })?;
        }
    }

    let switches = SwitchTable::new();

    let northbound_socket = net::TcpListener::bind(conf.northbound.socket)?;
    info!("Listening for orchestrators on {}", northbound_socket.local_addr()?);
    let northbound_switches = switches.clone();
    thread::spawn(move || server::serve(northbound_socket, northbound_switches));

    let listen_socket = net::TcpListener::bind(conf.openflow.socket)?;
    info!("Listening for switches on {}", listen_socket.local_addr()?);

    let flow_conf = Arc::new(conf.flows);
    for stream in listen_socket.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                error!("retry connection on error: {}", e);
                continue;
            }
        };
        let flow_conf = flow_conf.clone();
        let switches = switches.clone();
        thread::spawn(move || {
            if let Err(e) = OfSession::run(stream, &flow_conf, &switches) {
                error!("switch session ended on error: {}", e);
            }
        });
    }
    Ok(())
}

/// Entry function with top level error handling.
fn main() {
    if let Err(e) = handle_cli_args() {
        error!("{}", e);
        exit(1);
    }
}
