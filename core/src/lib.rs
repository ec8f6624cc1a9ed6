pub mod error;
pub mod html;
pub mod model;
pub mod persist;
pub mod repo;
pub mod search;
pub mod snippet;
pub mod stats;
pub mod tokenizer;
pub mod writer;

pub use error::{Error, Result};
pub use model::*;
pub use persist::SledRepository;
pub use repo::Repository;
pub use search::{SearchEngine, SearchHit, SearchResponse};
pub use tokenizer::{LemmaExtractor, StemmingLemmatizer};
pub use writer::LemmaIndexWriter;
