//! Per-image ordering of sealed candidates.
//!
//! Candidates are ranked by descending confidence. The sort is stable, so
//! ties keep insertion order and rankings are reproducible. NaN confidences
//! rank last.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::category::Category;
use crate::geometry::BBox;
use crate::taxonomy::RelationId;
use crate::window::{Prediction, SealedWindow};

/// A ranked triplet as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedTriplet {
    pub subject: Category,
    pub relation: RelationId,
    pub object: Category,
    pub subject_box: BBox,
    pub object_box: BBox,
    pub confidence: f32,
}

impl From<&Prediction> for RankedTriplet {
    fn from(p: &Prediction) -> Self {
        Self {
            subject: p.subject,
            relation: p.relation,
            object: p.object,
            subject_box: p.subject_box,
            object_box: p.object_box,
            confidence: p.confidence,
        }
    }
}

/// The most confident triplets of one image, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageTriplets {
    pub image: usize,
    pub triplets: Vec<RankedTriplet>,
}

fn rank_key(confidence: f32) -> f32 {
    if confidence.is_nan() {
        f32::NEG_INFINITY
    } else {
        confidence
    }
}

/// Descending-confidence order.
fn by_confidence(a: &Prediction, b: &Prediction) -> Ordering {
    rank_key(b.confidence).total_cmp(&rank_key(a.confidence))
}

impl SealedWindow {
    /// Candidate indices per image, most confident first.
    pub fn rankings(&self) -> BTreeMap<usize, Vec<usize>> {
        let predictions = self.predictions();
        let mut by_image: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, p) in predictions.iter().enumerate() {
            by_image.entry(p.image).or_default().push(i);
        }
        for indices in by_image.values_mut() {
            indices.sort_by(|&a, &b| by_confidence(&predictions[a], &predictions[b]));
        }
        by_image
    }

    /// Ground-truth indices per image, in insertion order.
    pub fn targets_by_image(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut by_image: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, t) in self.targets().iter().enumerate() {
            by_image.entry(t.image).or_default().push(i);
        }
        by_image
    }

    /// The `k` most confident triplets of every image.
    pub fn top_k(&self, k: usize) -> Vec<ImageTriplets> {
        let predictions = self.predictions();
        self.rankings()
            .into_iter()
            .map(|(image, ranked)| ImageTriplets {
                image,
                triplets: ranked
                    .iter()
                    .take(k)
                    .map(|&i| RankedTriplet::from(&predictions[i]))
                    .collect(),
            })
            .collect()
    }

    /// Like [`top_k`](Self::top_k), but an unordered pair of subject and
    /// object categories appears at most once per image.
    pub fn unique_top_k(&self, k: usize) -> Vec<ImageTriplets> {
        let predictions = self.predictions();
        self.rankings()
            .into_iter()
            .map(|(image, ranked)| {
                let mut seen: HashSet<(Category, Category)> = HashSet::new();
                let triplets = ranked
                    .iter()
                    .map(|&i| &predictions[i])
                    .filter(|p| {
                        let pair = (p.subject.min(p.object), p.subject.max(p.object));
                        seen.insert(pair)
                    })
                    .take(k)
                    .map(RankedTriplet::from)
                    .collect();
                ImageTriplets { image, triplets }
            })
            .collect()
    }
}
