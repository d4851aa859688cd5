//! Conversion: chunking, provider orchestration, response cleanup and merging.
pub mod chunker;
pub mod merge;
pub mod orchestrator;
pub mod output;
pub mod prompt;
pub mod sanitize;

pub use chunker::{BoundaryKind, Budget, BudgetUnit, Chunk, Chunks, chunk};
pub use merge::{MergedArtifact, merge};
pub use orchestrator::{CancelToken, ChunkFailure, Orchestrator, RetryPolicy, TranslationResult};
pub use sanitize::{OutputFormat, SanitizeFailure, sanitize};
