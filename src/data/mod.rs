/// Data layer: core types and file loading.
///
/// Architecture:
/// ```text
///  .txt / .npy / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse matrix → LearningSet / RawSample
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ LearningSet │  axis, feature rows, label tuples
///   └─────────────┘
/// ```

pub mod loader;
pub mod model;
