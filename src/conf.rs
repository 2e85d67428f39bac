/*!
A parser for an INI file with the following structure:

```ini
[Connection]
uri=tcp:192.0.2.1:6653

[Northbound]
uri=tcp:192.0.2.1:6700

[Table]
id=0

[Timeouts]
; hard timeouts in seconds
path=90
l2=30

[Controller]
; both are optional, a random locally administered MAC is used by default
mac=02:00:00:00:00:fe
ip=192.0.2.254

; only read by orchestrator front ends
[Orchestrator]
uri=tcp:192.0.2.1:6700
dpid=1
ip=192.0.2.254
```
*/

use crate::openflow::messages::OFP_TCP_PORT;

use ini::ini;
use ini::Ini;

use mac_address::MacAddress;

use std::error;
use std::fmt;
use std::io;
use std::net::*;
use std::num::ParseIntError;
use std::str::FromStr;

/// The default port the flow controller listens on for the orchestrator
pub const NORTHBOUND_PORT: u16 = 6700;

/// The default hard timeout of service path flow entries
pub const PATH_HARD_TIMEOUT: u16 = 90;
/// The default hard timeout of L2-learning flow entries
pub const L2_HARD_TIMEOUT: u16 = 30;

const CONN_SECTION: &str = "Connection";
const NORTHBOUND_SECTION: &str = "Northbound";
const URI_KEY: &str = "uri";

const TABLE_SECTION: &str = "Table";
const ID_KEY: &str = "id";

const TIMEOUTS_SECTION: &str = "Timeouts";
const PATH_KEY: &str = "path";
const L2_KEY: &str = "l2";

const CONTROLLER_SECTION: &str = "Controller";
const MAC_KEY: &str = "mac";
const IP_KEY: &str = "ip";

const ORCHESTRATOR_SECTION: &str = "Orchestrator";
const DPID_KEY: &str = "dpid";

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Ini(ini::Error),
    ParseInt(&'static str, ParseIntError),
    InvalidMac(String),
    InvalidIp(String),
    MissingSection(&'static str),
    MissingEntry(&'static str, &'static str),
    InvalidUri(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Ini(ref e) => write!(f, "{}", e),
            Error::ParseInt(key, ref e) => {
                write!(f, "Error on trying to parse the '{}' value: {}", key, e)
            }
            Error::InvalidMac(ref m) => write!(f, "'{}' is not a MAC address", m),
            Error::InvalidIp(ref ip) => write!(f, "'{}' is not an IPv4 address", ip),
            Error::MissingSection(s) => write!(f, "The INI file does not have a [{}] section", s),
            Error::MissingEntry(s, k) => {
                write!(f, "The INI [{}] section does not have a '{}' key", s, k)
            }
            Error::InvalidUri(ref u) => write!(f, "The connection URI '{}' is invalid", u),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(ioe) => ioe,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl error::Error for Error {}

trait Section {
    type S;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error>;
}

/// Parses a `tcp:<ip>[:<port>]` URI
fn parse_uri(uri: &str, default_port: u16) -> Result<SocketAddr, Error> {
    let def_port = default_port.to_string();
    let mut conn_split: Vec<_> = uri.split(':').collect();
    if conn_split.len() == 2 {
        conn_split.push(&def_port);
    }
    if conn_split.len() == 3 && conn_split[0] == "tcp" {
        let joined = &format!("{}:{}", conn_split[1], conn_split[2]);
        if let Ok(socket) = SocketAddr::from_str(joined) {
            return Ok(socket);
        }
    }
    Err(Error::InvalidUri(uri.to_owned()))
}

fn parse_ip(ip: &str) -> Result<Ipv4Addr, Error> {
    Ipv4Addr::from_str(ip).map_err(|_| Error::InvalidIp(ip.to_owned()))
}

fn localhost(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), port))
}

/// Where the controller accepts OpenFlow switch connections
#[derive(Debug, PartialEq)]
pub struct OfConnection {
    pub socket: SocketAddr,
}

impl Section for OfConnection {
    type S = OfConnection;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", CONN_SECTION);

        let conn = match conf.section(Some(CONN_SECTION.to_owned())) {
            Some(conn_section) => {
                let uri = conn_section
                    .get(URI_KEY)
                    .ok_or(Error::MissingEntry(CONN_SECTION, URI_KEY))?;
                OfConnection::from_str(uri)?
            }
            _ => OfConnection::default(),
        };
        debug!("Got {:?}", conn);
        Ok(conn)
    }
}

impl FromStr for OfConnection {
    type Err = Error;

    fn from_str(conn: &str) -> Result<OfConnection, Self::Err> {
        Ok(OfConnection {
            socket: parse_uri(conn, OFP_TCP_PORT)?,
        })
    }
}

impl Default for OfConnection {
    fn default() -> Self {
        OfConnection {
            socket: localhost(OFP_TCP_PORT),
        }
    }
}

/// Where the controller accepts the orchestrator's connections
#[derive(Debug, PartialEq)]
pub struct NorthboundConnection {
    pub socket: SocketAddr,
}

impl Section for NorthboundConnection {
    type S = NorthboundConnection;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", NORTHBOUND_SECTION);

        let conn = match conf.section(Some(NORTHBOUND_SECTION.to_owned())) {
            Some(section) => {
                let uri = section
                    .get(URI_KEY)
                    .ok_or(Error::MissingEntry(NORTHBOUND_SECTION, URI_KEY))?;
                NorthboundConnection {
                    socket: parse_uri(uri, NORTHBOUND_PORT)?,
                }
            }
            _ => NorthboundConnection {
                socket: localhost(NORTHBOUND_PORT),
            },
        };
        debug!("Got {:?}", conn);
        Ok(conn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfTable {
    pub id: u8,
}

impl Section for OfTable {
    type S = OfTable;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", TABLE_SECTION);

        let table = match conf.section(Some(TABLE_SECTION.to_owned())) {
            Some(table_section) => {
                let id = table_section
                    .get(ID_KEY)
                    .ok_or(Error::MissingEntry(TABLE_SECTION, ID_KEY))?;

                OfTable {
                    id: id.parse().map_err(|e| Error::ParseInt(ID_KEY, e))?,
                }
            }
            _ => OfTable::default(),
        };

        debug!("Got {:?}", table);
        Ok(table)
    }
}

impl Default for OfTable {
    fn default() -> Self {
        OfTable { id: 0 }
    }
}

/// Hard timeouts of the installed flow entries in seconds
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub path: u16,
    pub l2: u16,
}

impl Section for Timeouts {
    type S = Timeouts;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", TIMEOUTS_SECTION);

        let mut timeouts = Timeouts::default();
        if let Some(section) = conf.section(Some(TIMEOUTS_SECTION.to_owned())) {
            if let Some(path) = section.get(PATH_KEY) {
                timeouts.path = path.parse().map_err(|e| Error::ParseInt(PATH_KEY, e))?;
            }
            if let Some(l2) = section.get(L2_KEY) {
                timeouts.l2 = l2.parse().map_err(|e| Error::ParseInt(L2_KEY, e))?;
            }
        }
        debug!("Got {:?}", timeouts);
        Ok(timeouts)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            path: PATH_HARD_TIMEOUT,
            l2: L2_HARD_TIMEOUT,
        }
    }
}

/// The addresses the controller uses for its own ARP requests
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerIdentity {
    pub mac: MacAddress,
    /// The ARP sender address until the orchestrator announces one
    pub ip: Option<Ipv4Addr>,
}

impl ControllerIdentity {
    /// Draws a random locally administered unicast MAC address
    pub fn random_mac() -> MacAddress {
        let mut bytes: [u8; 6] = rand::random();
        bytes[0] = (bytes[0] & 0xfe) | 0x02;
        MacAddress::new(bytes)
    }
}

impl Section for ControllerIdentity {
    type S = ControllerIdentity;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", CONTROLLER_SECTION);

        let mut identity = ControllerIdentity {
            mac: ControllerIdentity::random_mac(),
            ip: None,
        };
        if let Some(section) = conf.section(Some(CONTROLLER_SECTION.to_owned())) {
            if let Some(mac) = section.get(MAC_KEY) {
                identity.mac =
                    MacAddress::from_str(mac).map_err(|_| Error::InvalidMac(mac.to_string()))?;
            }
            if let Some(ip) = section.get(IP_KEY) {
                identity.ip = Some(parse_ip(ip)?);
            }
        }
        info!("Using MAC address {} for controller originated ARP", identity.mac);
        Ok(identity)
    }
}

/// Everything a flow controller needs to program a switch
#[derive(Debug, Clone, PartialEq)]
pub struct FlowConf {
    pub table: OfTable,
    pub timeouts: Timeouts,
    pub controller: ControllerIdentity,
}

/// The flow controller's configuration
#[derive(Debug)]
pub struct Conf {
    pub openflow: OfConnection,
    pub northbound: NorthboundConnection,
    pub flows: FlowConf,
}

impl Conf {
    fn from_ini(conf: &Ini) -> Result<Conf, Error> {
        Ok(Conf {
            openflow: OfConnection::from_ini(conf)?,
            northbound: NorthboundConnection::from_ini(conf)?,
            flows: FlowConf {
                table: OfTable::from_ini(conf)?,
                timeouts: Timeouts::from_ini(conf)?,
                controller: ControllerIdentity::from_ini(conf)?,
            },
        })
    }
}

/// How an orchestrator reaches the flow controller of its switch
#[derive(Debug, PartialEq)]
pub struct OrchestratorConf {
    pub controller: SocketAddr,
    pub dpid: u64,
    /// The IP address announced in the Hello message
    pub ip: Option<Ipv4Addr>,
}

impl Section for OrchestratorConf {
    type S = OrchestratorConf;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", ORCHESTRATOR_SECTION);

        let section = conf
            .section(Some(ORCHESTRATOR_SECTION.to_owned()))
            .ok_or(Error::MissingSection(ORCHESTRATOR_SECTION))?;
        let controller = match section.get(URI_KEY) {
            Some(uri) => parse_uri(uri, NORTHBOUND_PORT)?,
            None => localhost(NORTHBOUND_PORT),
        };
        let dpid = section
            .get(DPID_KEY)
            .ok_or(Error::MissingEntry(ORCHESTRATOR_SECTION, DPID_KEY))?;
        let ip = match section.get(IP_KEY) {
            Some(ip) => Some(parse_ip(ip)?),
            None => None,
        };

        let orchestrator = OrchestratorConf {
            controller,
            dpid: dpid.parse().map_err(|e| Error::ParseInt(DPID_KEY, e))?,
            ip,
        };
        debug!("Got {:?}", orchestrator);
        Ok(orchestrator)
    }
}

fn load(path: &str) -> Result<Ini, Error> {
    info!("Reading INI file {}", path);
    Ini::load_from_file(path).map_err(Error::Ini)
}

/// Reads the flow controller's configuration
pub fn parse_file(path: &str) -> Result<Conf, Error> {
    Conf::from_ini(&load(path)?)
}

/// Reads the orchestrator's configuration
pub fn parse_orchestrator_file(path: &str) -> Result<OrchestratorConf, Error> {
    OrchestratorConf::from_ini(&load(path)?)
}
