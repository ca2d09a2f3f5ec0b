//! force-layout - force-directed graph layout with a background simulation worker.
//!
//! Callers hand the worker raw nodes (with optional children) and links per
//! graph id; the worker runs one d3-style force simulation per graph off the
//! caller's thread and streams a position snapshot for every tick.
//!
//! The pieces, leaf-first: [`builder`] resolves raw input into a [`graph_types::Graph`],
//! [`simulation`] ticks it, [`host`] keeps one simulation per graph id and maps
//! [`protocol`] messages onto them, and [`worker`] runs a host on its own thread.

pub mod builder;
pub mod config;
pub mod error;
pub mod graph_types;
pub mod host;
pub mod protocol;
mod quadtree;
pub mod simulation;
pub mod worker;

pub use error::{LayoutError, LayoutResult};
