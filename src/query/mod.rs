//! Request-parameter parsing: filter conditions, paging and sorting.

pub mod condition;
pub mod page;

pub use condition::*;
pub use page::*;
