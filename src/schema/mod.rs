pub mod types;
pub mod descriptor;

pub use types::*;
pub use descriptor::*;
