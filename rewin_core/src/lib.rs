//! SAT-based don't-care optimization of technology-mapped combinational
//! networks.
//!
//! The engine repeatedly cuts a bounded window around a pivot node,
//! encodes the window as a CNF miter (original cone against a copy with
//! the pivot toggled), enumerates admissible replacement functions over a
//! small divisor set under the window's observability don't-cares, and
//! commits the replacements that reduce area or improve the critical
//! path.

pub mod cnf;
pub mod driver;
pub mod expr;
pub mod faults;
pub mod interp;
pub mod library;
pub mod libmatch;
pub mod netlist;
pub mod network;
pub mod parse;
pub mod sat;
pub mod sop;
pub mod timing;
pub mod truth;

mod decomp;
mod encode;
mod window;

pub use driver::{OptParams, OptStats, Optimizer};
pub use interp::InterpResult;
pub use library::{Gate, GateId, Library, LibraryError, Pin, PinPhase};
pub use netlist::{read_netlist, write_netlist, NetlistError};
pub use network::{MappedNetwork, NodeId, ObjKind};
