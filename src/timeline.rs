pub mod effects;
pub mod item;
pub mod model;
pub mod tags;
