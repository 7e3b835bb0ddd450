//! Velocity/anisotropy models on a grid: background sources, resampling and
//! checkerboard perturbations.

pub mod background;
pub mod builder;
pub mod checkerboard;
pub mod crust1;
pub mod field;

pub use background::*;
pub use builder::*;
pub use checkerboard::*;
pub use crust1::Crust1Model;
pub use field::*;
