//! Hit/target tallies and the reports computed from them.
//!
//! Counters are kept per relation class; global counts are their sums, so
//! the global target count always equals the per-class total.
//!
//! Per-class values are NaN for classes without targets (or without
//! predictions, for precision). NaN means "class absent", not zero, and
//! serializes as JSON `null`.

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use crate::taxonomy::RelationId;
use crate::triplets::ClassWeights;

/// Lower bound of the recall denominator, so an empty window reports 0.
pub const RECALL_EPSILON: f64 = 1e-3;

/// Mean of the non-NaN values; NaN when there are none.
pub fn nanmean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Recall hits per cutoff and class, plus targets per class.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallTally {
    top_k: Vec<usize>,
    /// `top_k.len() × num_relations`
    hits: Array2<f64>,
    targets: Array1<f64>,
}

impl RecallTally {
    pub fn new(top_k: &[usize], num_relations: usize) -> Self {
        Self {
            top_k: top_k.to_vec(),
            hits: Array2::zeros((top_k.len(), num_relations)),
            targets: Array1::zeros(num_relations),
        }
    }

    pub fn top_k(&self) -> &[usize] {
        &self.top_k
    }

    pub fn num_relations(&self) -> usize {
        self.targets.len()
    }

    /// Count one ground-truth triplet of `class`.
    pub fn record_target(&mut self, class: RelationId) {
        if let Some(t) = self.targets.get_mut(class) {
            *t += 1.0;
        }
    }

    /// Credit a match found at 0-based `rank` to every cutoff `k` with
    /// `rank < max(k, floor)`.
    pub fn record_hit(&mut self, class: RelationId, rank: usize, floor: usize) {
        if class >= self.num_relations() {
            return;
        }
        for (ki, &k) in self.top_k.iter().enumerate() {
            if rank < k.max(floor) {
                self.hits[[ki, class]] += 1.0;
            }
        }
    }

    /// Add another tally's counts. Both must share cutoffs and class count.
    pub fn merge(&mut self, other: &RecallTally) {
        debug_assert_eq!(self.top_k, other.top_k);
        self.hits += &other.hits;
        self.targets += &other.targets;
    }

    /// Total number of targets.
    pub fn targets(&self) -> f64 {
        self.targets.sum()
    }

    pub fn targets_per_class(&self) -> &Array1<f64> {
        &self.targets
    }

    /// Total hits at cutoff `k`, if `k` is one of the configured cutoffs.
    pub fn hits(&self, k: usize) -> Option<f64> {
        let ki = self.top_k.iter().position(|&c| c == k)?;
        Some(self.hits.row(ki).sum())
    }

    pub fn report(&self, per_class: bool) -> RecallReport {
        let targets = self.targets();
        let hits: Vec<f64> = self.hits.sum_axis(Axis(1)).to_vec();
        let recall = hits
            .iter()
            .map(|h| h / targets.max(RECALL_EPSILON))
            .collect();

        let class_recall: Vec<Vec<f64>> = self
            .hits
            .outer_iter()
            .map(|row| {
                row.iter()
                    .zip(self.targets.iter())
                    .map(|(&h, &t)| if t == 0.0 { f64::NAN } else { h / t })
                    .collect()
            })
            .collect();
        let mean_recall = class_recall
            .iter()
            .map(|r| nanmean(r.iter().copied()))
            .collect();

        RecallReport {
            top_k: self.top_k.clone(),
            recall,
            mean_recall,
            hits,
            targets,
            per_class: per_class.then_some(class_recall),
        }
    }
}

/// Recall@K and mean-recall@K for one tally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallReport {
    pub top_k: Vec<usize>,
    pub recall: Vec<f64>,
    pub mean_recall: Vec<f64>,
    pub hits: Vec<f64>,
    pub targets: f64,
    /// Recall per cutoff and relation class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_class: Option<Vec<Vec<f64>>>,
}

impl RecallReport {
    fn at(&self, values: &[f64], k: usize) -> Option<f64> {
        let ki = self.top_k.iter().position(|&c| c == k)?;
        values.get(ki).copied()
    }

    pub fn recall_at(&self, k: usize) -> Option<f64> {
        self.at(&self.recall, k)
    }

    pub fn mean_recall_at(&self, k: usize) -> Option<f64> {
        self.at(&self.mean_recall, k)
    }
}

/// Every recall tally produced by scoring one window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub recall: RecallTally,
    /// Zero-shot triplets only
    pub zero_shot: Option<RecallTally>,
    /// Top-3 mode: the head picked by the super-category classifier
    pub top1: Option<RecallTally>,
    /// Detection: boxes and relation matched, categories ignored
    pub label_agnostic: Option<RecallTally>,
}

fn merge_optional(into: &mut Option<RecallTally>, from: &Option<RecallTally>) {
    match (into.as_mut(), from) {
        (Some(a), Some(b)) => a.merge(b),
        (None, Some(b)) => *into = Some(b.clone()),
        _ => {}
    }
}

impl ScoreCard {
    pub fn new(top_k: &[usize], num_relations: usize) -> Self {
        Self {
            recall: RecallTally::new(top_k, num_relations),
            zero_shot: None,
            top1: None,
            label_agnostic: None,
        }
    }

    pub fn merge(&mut self, other: &ScoreCard) {
        self.recall.merge(&other.recall);
        merge_optional(&mut self.zero_shot, &other.zero_shot);
        merge_optional(&mut self.top1, &other.top1);
        merge_optional(&mut self.label_agnostic, &other.label_agnostic);
    }

    pub fn report(&self, per_class: bool) -> RecallSummary {
        RecallSummary {
            recall: self.recall.report(per_class),
            zero_shot: self.zero_shot.as_ref().map(|t| t.report(per_class)),
            top1: self.top1.as_ref().map(|t| t.report(per_class)),
            label_agnostic: self.label_agnostic.as_ref().map(|t| t.report(per_class)),
        }
    }
}

/// Reports for every tally of a [`ScoreCard`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallSummary {
    #[serde(flatten)]
    pub recall: RecallReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_shot: Option<RecallReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top1: Option<RecallReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_agnostic: Option<RecallReport>,
}

/// Per-class precision counts.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionTally {
    relationship_hits: Array1<f64>,
    phrase_hits: Array1<f64>,
    predicted: Array1<f64>,
}

impl PrecisionTally {
    pub fn new(num_relations: usize) -> Self {
        Self {
            relationship_hits: Array1::zeros(num_relations),
            phrase_hits: Array1::zeros(num_relations),
            predicted: Array1::zeros(num_relations),
        }
    }

    fn bump(values: &mut Array1<f64>, class: RelationId) {
        if let Some(v) = values.get_mut(class) {
            *v += 1.0;
        }
    }

    /// Count one kept candidate predicted as `class`.
    pub fn record_prediction(&mut self, class: RelationId) {
        Self::bump(&mut self.predicted, class);
    }

    /// Both boxes matched.
    pub fn record_relationship_hit(&mut self, class: RelationId) {
        Self::bump(&mut self.relationship_hits, class);
    }

    /// The subject ∪ object region matched.
    pub fn record_phrase_hit(&mut self, class: RelationId) {
        Self::bump(&mut self.phrase_hits, class);
    }

    pub fn merge(&mut self, other: &PrecisionTally) {
        self.relationship_hits += &other.relationship_hits;
        self.phrase_hits += &other.phrase_hits;
        self.predicted += &other.predicted;
    }

    pub fn predictions(&self) -> f64 {
        self.predicted.sum()
    }

    pub fn report(&self, weights: &ClassWeights) -> PrecisionReport {
        let per_class = |hits: &Array1<f64>| -> Vec<f64> {
            hits.iter()
                .zip(self.predicted.iter())
                .map(|(&h, &n)| if n == 0.0 { f64::NAN } else { h / n })
                .collect()
        };
        let relationship = per_class(&self.relationship_hits);
        let phrase = per_class(&self.phrase_hits);

        // both criteria share a denominator, so relationship NaNs mark absent classes
        let present_weight: f64 = relationship
            .iter()
            .zip(weights.as_slice())
            .filter(|(p, _)| !p.is_nan())
            .map(|(_, w)| w)
            .sum();
        let weighted = |precision: &[f64]| -> f64 {
            let total: f64 = precision
                .iter()
                .zip(weights.as_slice())
                .filter(|(p, _)| !p.is_nan())
                .map(|(p, w)| p * w)
                .sum();
            if present_weight == 0.0 {
                f64::NAN
            } else {
                total / present_weight
            }
        };

        PrecisionReport {
            relationship: weighted(&relationship),
            phrase: weighted(&phrase),
            predictions: self.predictions(),
            per_class_relationship: relationship,
            per_class_phrase: phrase,
        }
    }
}

/// Weighted mean precision over relation classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecisionReport {
    /// Both boxes matched
    pub relationship: f64,
    /// The union region matched
    pub phrase: f64,
    pub predictions: f64,
    pub per_class_relationship: Vec<f64>,
    pub per_class_phrase: Vec<f64>,
}
