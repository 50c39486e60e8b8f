//! Infrastructure layer - configuration, logging, page access, parsing and
//! file persistence

pub mod config;
pub mod decoy_filter;
pub mod error_report;
pub mod feed_repository;
pub mod http_page_driver;
pub mod identity_resolver;
pub mod logging;
pub mod page_driver;
pub mod parsing;
pub mod work_list;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager};
pub use decoy_filter::{DecoyDetected, DecoyFilter};
pub use error_report::{ErrorReport, FailureRecord};
pub use feed_repository::{ArchiveReadError, FeedRepository, parse_previous_feed};
pub use http_page_driver::HttpPageDriver;
pub use identity_resolver::{IdentityResolver, ResolutionError};
pub use logging::init_logging_with_config;
pub use page_driver::{
    NavigationError, NavigationOptions, PageDriver, PageGuard, PageHandle, PageSnapshot, WaitCondition,
};
pub use parsing::{ExtractionChain, ExtractionError, ListingParser};
pub use work_list::load_work_units;
