pub mod driver;
pub mod options;
pub mod progress;
pub mod range;
pub mod resolver;
