//! Input/output helpers.
//!
//! - model container read/write (`model_file`)
//! - solver output fields back on the global grid (`solver_output`)
//! - travel-time catalog text format (`catalog_file`)
//! - plain-text background samples (`ascii`)

pub mod ascii;
pub mod catalog_file;
pub mod model_file;
pub mod solver_output;

pub use ascii::*;
pub use catalog_file::*;
pub use model_file::*;
pub use solver_output::*;
