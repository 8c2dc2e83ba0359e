pub mod graph;
pub mod knob;
pub mod node;
pub mod writer;
