//! A small robotics/automation execution substrate: named background
//! threads with priority, periodic real-time threads, a monotonic
//! millisecond timer, second-order IIR filters, a Module/Channel peripheral
//! adapter, and the three hardest device state machines it exists to carry
//! safely — the RPLidar A1/A2 serial scanners and the SMC JXCE1 EtherCAT
//! servo controller.
//!
//! The HTTP control surface, the raw EtherCAT frame transport/CoE mailbox,
//! and USB 6-DOF input devices are external collaborators: this crate
//! defines only the contracts they meet the core at ([`script`],
//! [`ethercat`], [`sixdof`]).

pub mod channel;
pub mod config;
pub mod drivers;
pub mod ethercat;
pub mod filter;
pub mod module;
pub mod realtime;
pub mod script;
pub mod serial;
pub mod sixdof;
pub mod thread;
pub mod timer;
