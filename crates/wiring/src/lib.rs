//! Wiring model for simulation dashboards.
//!
//! A wiring is a JSON list of `{from, to}` entries connecting
//! `module.port` references. This crate decodes and normalizes that list,
//! turns it into a node/edge graph for display, and places nodes with a
//! layered auto layout.

pub mod auto_layout;
pub mod codec;
pub mod derive;
pub mod port_ref;
pub mod ports;

pub use auto_layout::{AutoLayout, LayeredLayout, LayoutDirection};
pub use codec::{
    FormatError, NormalizedWiring, Targets, WiringEntry, decode,
    parse_wiring_text,
};
pub use derive::{
    DerivedGraph, GraphEdge, GraphNode, Position, derive_graph,
    derive_graph_from_value,
};
pub use port_ref::PortRef;
pub use ports::{ModulePorts, PortDeclarations, PortDirection};
