pub mod base;
pub mod cluster;
pub mod macros;
pub mod marker;
pub mod spider;
