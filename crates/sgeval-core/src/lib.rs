//! sgeval Core - Recall@K evaluation for scene-graph generation.
//!
//! Scores predicted (subject, relation, object) triplets against annotated
//! ground truth under the PredCls, SGCls and SGDet protocols, with flat or
//! hierarchical (geometric / possessive / semantic) relation taxonomies.
//!
//! # Architecture
//!
//! Predictions arrive in batches and accumulate in a window. Sealing the
//! window fuses the confidence prior; engines then rank and match:
//!
//! ```text
//! EdgeBatch → Window::append_edges → seal → rank per image → match (IoU) → tallies → report
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sgeval_core::{Config, Evaluator};
//!
//! fn main() -> sgeval_core::Result<()> {
//!     let mut evaluator = Evaluator::new(Config::load()?)?;
//!     let mut window = evaluator.open_window(evaluator.primary_mode())?;
//!     window.append_edges(&batch)?;
//!     window.append_targets(image, &targets)?;
//!
//!     let report = evaluator.absorb(&window.seal());
//!     println!("R@50: {:?}", report.running.recall.recall.recall_at(50));
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod category;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod geometry;
pub mod labels;
pub mod matching;
pub mod metrics;
pub mod output;
pub mod ranking;
pub mod taxonomy;
pub mod triplets;
pub mod wire;
pub mod window;

// Re-exports for convenient access
pub use batch::{EdgeBatch, EdgeTargets, TargetTriplet};
pub use category::{Category, CategoryMatcher};
pub use config::{Config, EvalMode, Task};
pub use error::{BatchError, BatchResult, ConfigError, EvalError, Result};
pub use evaluator::{Evaluator, Metrics, ProtocolSummary, WindowReport};
pub use geometry::BBox;
pub use labels::LabelNames;
pub use matching::{MatchSettings, PrecisionEngine, RecallEngine};
pub use metrics::{PrecisionReport, RecallReport, RecallSummary, ScoreCard};
pub use output::{OutputFormat, OutputRecord, OutputWriter};
pub use ranking::{ImageTriplets, RankedTriplet};
pub use taxonomy::{RelationId, RelationTaxonomy, SuperCategory};
pub use triplets::{ClassWeights, TripletKey, TripletTable};
pub use wire::BatchRecord;
pub use window::{RankingMode, SealedWindow, Window};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
