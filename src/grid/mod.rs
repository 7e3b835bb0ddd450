//! Grid geometry: node axes and sub-regions.

pub mod region;
pub mod spec;

pub use region::*;
pub use spec::*;
