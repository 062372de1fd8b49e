//! Sub-configuration structs with defaults matching the Visual Genome setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Evaluation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Predicate classification: ground-truth boxes and labels
    #[default]
    PredCls,
    /// Scene-graph classification: ground-truth boxes, predicted labels
    SgCls,
    /// Scene-graph detection: predicted boxes and labels
    SgDet,
}

impl Task {
    /// Detection compares predicted labels through the equivalence tables.
    pub fn uses_equivalence(self) -> bool {
        matches!(self, Task::SgDet)
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::PredCls => write!(f, "predcls"),
            Task::SgCls => write!(f, "sgcls"),
            Task::SgDet => write!(f, "sgdet"),
        }
    }
}

/// How candidates are produced from each scored edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// One candidate per edge (three for a hierarchical taxonomy)
    #[default]
    GraphConstrained,
    /// One candidate per edge carrying all three head argmaxes
    Top3,
    /// Every relation class of every edge above a score floor
    NoGraphConstraint,
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalMode::GraphConstrained => write!(f, "graph_constrained"),
            EvalMode::Top3 => write!(f, "top3"),
            EvalMode::NoGraphConstraint => write!(f, "no_graph_constraint"),
        }
    }
}

/// Dataset whose side tables drive the extra metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetName {
    /// Visual Genome: zero-shot recall
    #[default]
    Vg,
    /// Open Images V6: weighted mean precision
    Oiv6,
}

/// Relation taxonomy layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Total number of relation classes
    pub num_relations: usize,

    /// Split relations into geometric / possessive / semantic heads
    pub hierarchical: bool,

    /// Width of the geometric range (ids `[0, num_geometric)`)
    pub num_geometric: usize,

    /// Width of the possessive range
    pub num_possessive: usize,

    /// Width of the semantic range
    pub num_semantic: usize,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            num_relations: 50,
            hierarchical: true,
            num_geometric: 15,
            num_possessive: 11,
            num_semantic: 24,
        }
    }
}

/// Matching and ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Evaluation protocol
    pub task: Task,

    /// Primary ranking mode
    pub mode: EvalMode,

    /// Also run the Top-3 protocol next to the primary mode
    /// (only meaningful with a hierarchical taxonomy)
    pub track_top3: bool,

    /// Side length of the rasterization grid
    pub feature_size: usize,

    /// Minimum IoU for subject and object boxes to match
    pub iou_thresh: f32,

    /// Recall cutoffs, strictly increasing
    pub top_k: Vec<usize>,

    /// Fraction of flattened edge scores kept in no-graph-constraint mode
    pub keep_fraction: f32,

    /// Candidates per image considered by the precision metric
    pub precision_top_k: usize,

    /// Include per-class recall vectors in reports
    pub per_class: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            task: Task::PredCls,
            mode: EvalMode::GraphConstrained,
            track_top3: true,
            feature_size: 64,
            iou_thresh: 0.5,
            top_k: vec![20, 50, 100],
            keep_fraction: 0.1,
            precision_top_k: 20,
            per_class: true,
        }
    }
}

/// Dataset side tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset identifier
    pub name: DatasetName,

    /// JSON array of `"s_r_o"` training triplet signatures
    pub train_triplets: Option<String>,

    /// JSON array of `"s_r_o"` zero-shot triplet signatures
    pub zero_shot_triplets: Option<String>,

    /// JSON array of per-relation weights (Open Images precision)
    pub class_weights: Option<String>,

    /// JSON `{ "objects": [...], "relations": [...] }` display names
    pub labels: Option<String>,
}

/// An umbrella category that accepts any of its members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UmbrellaGroup {
    pub umbrella: u32,
    pub members: Vec<u32>,
}

/// Category equivalence tables used for detection matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EquivalenceConfig {
    /// Groups of mutually interchangeable categories
    pub groups: Vec<Vec<u32>>,

    /// Umbrella categories (e.g. "vehicle" over car, bus, truck)
    pub umbrellas: Vec<UmbrellaGroup>,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        Self {
            // man, person, woman, people, boy, girl, lady, child, kid, men | tree, plant | plane, airplane
            groups: vec![
                vec![1, 5, 11, 23, 38, 44, 121, 124, 148, 149],
                vec![0, 50],
                vec![92, 137],
            ],
            umbrellas: vec![
                // vehicle
                UmbrellaGroup {
                    umbrella: 123,
                    members: vec![14, 63, 95, 87, 123],
                },
                // animal
                UmbrellaGroup {
                    umbrella: 108,
                    members: vec![89, 102, 67, 72, 71, 81, 96, 105, 90, 111, 108],
                },
                // food
                UmbrellaGroup {
                    umbrella: 60,
                    members: vec![145, 106, 142, 144, 77, 60],
                },
            ],
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format ("json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,

    /// Number of named top-K triplets to dump per image (0 disables)
    pub top_k_dump: usize,

    /// Keep one triplet per unordered subject/object category pair in dumps
    pub dump_unique: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            pretty: false,
            top_k_dump: 0,
            dump_unique: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Expand `~` in a configured path.
pub(crate) fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
