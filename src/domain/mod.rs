//! Domain module - catalog entities and value objects
//!
//! Items, feeds and work units are plain data; all behavior that touches
//! pages, files or the network lives in the infrastructure and
//! application layers.

pub mod feed;
pub mod product;
pub mod work_unit;

// Re-export commonly used items
pub use feed::{CategoryFeed, Feed, RunResult};
pub use product::{Item, ProductId};
pub use work_unit::{WorkKind, WorkUnit};
