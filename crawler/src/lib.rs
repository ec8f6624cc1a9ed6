pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod links;
mod worker;

pub use config::{AppConfig, CrawlSettings};
pub use coordinator::{Coordinator, STOPPED_BY_USER};
pub use fetch::{FetchedPage, Fetcher};
