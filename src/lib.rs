//! Duplicate-detection core for a repository-memory system: a semantic index
//! of pull-request descriptors with a probabilistic pre-filter, a cached
//! embedding pipeline, a pluggable storage back-end, and a weighted
//! multi-signal re-ranker with an explainable decision engine.

pub mod attribution;
pub mod bloom;
pub mod cache;
pub mod config;
pub mod detector;
pub mod embedder;
pub mod error;
pub mod fingerprint;
pub mod ranker;
pub mod storage;
pub mod vector_math;

pub use config::DetectorConfig;
pub use detector::{
    BatchCheckItem, CheckOptions, CheckResult, DetailedCheckResult, Descriptor, Detector,
    SearchResultItem, Stats,
};
pub use embedder::{Embedder, LocalEmbedder, RemoteHttpEmbedder};
pub use error::{DetectorError, Result, StorageError};
pub use ranker::{DecisionKind, ScoreBreakdown, Thresholds, Weights};
pub use storage::{MemoryStorage, PostgresStorage, Record, SnapshotStorage, SqliteStorage, Storage};
