//! Query input and normalization

pub mod normalize;
pub mod reader;

pub use normalize::{
    normalize, write_query_fasta, Job, NormalizedQueries, QueryEntry, QueryIndex,
    FIRST_QUERY_HEADER,
};
pub use reader::{parse_fasta_queries, read_queries, QueryRecord};
