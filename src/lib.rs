//! Storyloom — engine core for branching narrative graphs.
//!
//! Nodes are story beats, edges are player choices. The crate validates and
//! lays out authored graphs as plain data, and walks them at play time through
//! a state machine whose lifecycle is observable by pluggable modules.

pub mod config;
pub mod core;
pub mod plugins;
pub mod schema;
