mod repository;
mod schema;

pub use repository::{RankedArticle, Repository};
