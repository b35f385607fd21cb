pub mod assemble;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod search;
pub mod tools;

pub use crate::config::{Config, StageToggles};
pub use crate::error::{SearchError, SearchResult};
pub use crate::search::{run_search, SearchSummary};
