//! Collation: building one synthetic sequence from related items so they
//! export together into a single script.

pub mod builder;
