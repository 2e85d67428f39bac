/*!
Service function chaining on top of an OpenFlow 1.3 switch

The crate has two sides. The flow controller side (`openflow`,
`flow_controller`, `northbound::server`) accepts switch connections and
steers traffic through chains of virtual network functions.
The orchestrator side (`orchestrator`, `northbound::client`) manages the
network function nodes, chains and paths and tells the flow controller about
them. Both sides speak the `protocol` over the `northbound` byte stream.
*/

#[macro_use]
extern crate log;

pub mod conf;
pub mod flow_controller;
pub mod northbound;
pub mod openflow;
pub mod orchestrator;
pub mod packet;
pub mod protocol;
