//! Numerical building blocks: geodesy, spatial search, interpolation, smoothing.

pub mod distaz;
pub mod gaussian;
pub mod interp;
pub mod kdtree;

pub use distaz::*;
pub use gaussian::*;
pub use interp::*;
