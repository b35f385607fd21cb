//! External search engine integration
//!
//! The pipelines only see the [`SearchTool`] trait; [`MmseqsRunner`] drives a
//! real MMseqs2 binary and [`RecordingTool`] stands in for it in tests.

pub mod mmseqs;
pub mod testing;
pub mod traits;

pub use mmseqs::MmseqsRunner;
pub use testing::RecordingTool;
pub use traits::{Invocation, SearchTool};
