//! Node-graph placement.

pub mod engine;
