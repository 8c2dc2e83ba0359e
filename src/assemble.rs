//! Script assembly: turning timeline structures into node graphs.

pub mod item_graph;
pub mod sequence_graph;
