//! Travel-time catalog: sources, receivers and observations.

pub mod differential;
pub mod duplicates;
pub mod select;
pub mod synthetic;
pub mod table;
pub mod types;
pub mod weighting;

pub use differential::*;
pub use duplicates::*;
pub use table::*;
pub use types::*;
pub use weighting::*;
