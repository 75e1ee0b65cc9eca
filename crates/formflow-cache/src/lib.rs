pub mod cache;
pub mod catalog;
pub mod coordinator;
pub mod invalidation;
pub mod memory;

pub use cache::*;
pub use catalog::*;
pub use coordinator::*;
pub use invalidation::*;
pub use memory::*;
