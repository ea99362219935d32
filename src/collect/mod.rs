mod collector;
mod http;
mod source;

pub use collector::{BacklogOutcome, CategoryOutcome, Collector, CollectorSettings, StopReason};
pub use http::PlatformClient;
pub use source::{ArticleDetail, DetailSource, ListingEntry, ListingSource};
