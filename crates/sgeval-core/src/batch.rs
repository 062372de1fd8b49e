//! Typed input batches.
//!
//! An [`EdgeBatch`] carries one row per directed subject → object pair in
//! struct-of-arrays form. Every column must have the same number of rows;
//! [`EdgeBatch::validate`] checks that (and the score matrix shapes) before a
//! window commits anything from the batch.

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::{BatchError, BatchResult};
use crate::geometry::BBox;
use crate::taxonomy::{RelationId, RelationTaxonomy};

/// One free-standing ground-truth triplet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetTriplet {
    pub subject: Category,
    /// `None` when the pair carries no annotated relation.
    pub relation: Option<RelationId>,
    pub object: Category,
    pub subject_box: BBox,
    pub object_box: BBox,
}

/// Ground truth aligned row-for-row with an [`EdgeBatch`].
///
/// Used when the evaluated pairs are the annotated pairs themselves
/// (ground-truth boxes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeTargets {
    pub relation: Vec<Option<RelationId>>,
    pub subject: Vec<Category>,
    pub object: Vec<Category>,
    pub subject_box: Vec<BBox>,
    pub object_box: Vec<BBox>,
}

impl EdgeTargets {
    pub fn len(&self) -> usize {
        self.relation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relation.is_empty()
    }

    /// Target of row `row`. Callers must have validated the batch.
    pub(crate) fn row(&self, row: usize) -> TargetTriplet {
        TargetTriplet {
            subject: self.subject[row],
            relation: self.relation[row],
            object: self.object[row],
            subject_box: self.subject_box[row],
            object_box: self.object_box[row],
        }
    }
}

/// One batch of scored edges.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeBatch {
    /// Image index of each row
    pub image: Vec<usize>,
    /// Relation scores, `rows × num_relations` (raw or log scores)
    pub relation_scores: Array2<f32>,
    /// Super-category scores, `rows × 3`
    pub super_scores: Option<Array2<f32>>,
    /// Connectivity log-probability of each pair
    pub connectivity: Vec<f32>,
    pub subject: Vec<Category>,
    pub object: Vec<Category>,
    /// Log confidence of the predicted subject category (detection)
    pub subject_confidence: Option<Vec<f32>>,
    /// Log confidence of the predicted object category (detection)
    pub object_confidence: Option<Vec<f32>>,
    pub subject_box: Vec<BBox>,
    pub object_box: Vec<BBox>,
    /// Row-aligned ground truth
    pub targets: Option<EdgeTargets>,
    /// IoU pre-filter; rows marked `false` are dropped entirely
    pub keep: Option<Vec<bool>>,
}

fn check_len(column: &'static str, expected: usize, actual: usize) -> BatchResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(BatchError::LengthMismatch {
            column,
            expected,
            actual,
        })
    }
}

impl EdgeBatch {
    /// Build a batch from its required columns.
    pub fn new(
        image: Vec<usize>,
        relation_scores: Array2<f32>,
        connectivity: Vec<f32>,
        subject: Vec<Category>,
        object: Vec<Category>,
        subject_box: Vec<BBox>,
        object_box: Vec<BBox>,
    ) -> Self {
        Self {
            image,
            relation_scores,
            super_scores: None,
            connectivity,
            subject,
            object,
            subject_confidence: None,
            object_confidence: None,
            subject_box,
            object_box,
            targets: None,
            keep: None,
        }
    }

    pub fn with_super_scores(mut self, super_scores: Array2<f32>) -> Self {
        self.super_scores = Some(super_scores);
        self
    }

    pub fn with_category_confidence(mut self, subject: Vec<f32>, object: Vec<f32>) -> Self {
        self.subject_confidence = Some(subject);
        self.object_confidence = Some(object);
        self
    }

    pub fn with_targets(mut self, targets: EdgeTargets) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_keep(mut self, keep: Vec<bool>) -> Self {
        self.keep = Some(keep);
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Check column lengths, score shapes and target relation ids.
    pub fn validate(&self, taxonomy: &RelationTaxonomy) -> BatchResult<()> {
        let rows = self.len();
        let (score_rows, score_cols) = self.relation_scores.dim();
        check_len("relation_scores", rows, score_rows)?;
        if rows > 0 && score_cols != taxonomy.num_relations() {
            return Err(BatchError::ScoreWidth {
                expected: taxonomy.num_relations(),
                actual: score_cols,
            });
        }
        if let Some(super_scores) = &self.super_scores {
            let (r, c) = super_scores.dim();
            check_len("super_scores", rows, r)?;
            if rows > 0 && c != 3 {
                return Err(BatchError::SuperScoreWidth { actual: c });
            }
        }
        check_len("connectivity", rows, self.connectivity.len())?;
        check_len("subject", rows, self.subject.len())?;
        check_len("object", rows, self.object.len())?;
        check_len("subject_box", rows, self.subject_box.len())?;
        check_len("object_box", rows, self.object_box.len())?;
        if let Some(c) = &self.subject_confidence {
            check_len("subject_confidence", rows, c.len())?;
        }
        if let Some(c) = &self.object_confidence {
            check_len("object_confidence", rows, c.len())?;
        }
        if let Some(keep) = &self.keep {
            check_len("keep", rows, keep.len())?;
        }
        if let Some(targets) = &self.targets {
            check_len("target_relation", rows, targets.relation.len())?;
            check_len("target_subject", rows, targets.subject.len())?;
            check_len("target_object", rows, targets.object.len())?;
            check_len("target_subject_box", rows, targets.subject_box.len())?;
            check_len("target_object_box", rows, targets.object_box.len())?;
            for relation in targets.relation.iter().flatten() {
                check_relation(*relation, taxonomy)?;
            }
        }
        Ok(())
    }

    /// Indices of rows that pass the IoU pre-filter.
    pub fn kept_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&i| self.keep.as_ref().map_or(true, |k| k[i]))
    }

    pub(crate) fn scores(&self, row: usize) -> ArrayView1<'_, f32> {
        self.relation_scores.row(row)
    }

    /// Connectivity plus category log-confidences, when present.
    pub(crate) fn prior(&self, row: usize) -> f32 {
        let subject = self.subject_confidence.as_ref().map_or(0.0, |c| c[row]);
        let object = self.object_confidence.as_ref().map_or(0.0, |c| c[row]);
        self.connectivity[row] + subject + object
    }
}

pub(crate) fn check_relation(relation: RelationId, taxonomy: &RelationTaxonomy) -> BatchResult<()> {
    if relation < taxonomy.num_relations() {
        Ok(())
    } else {
        Err(BatchError::RelationOutOfRange {
            relation,
            num_relations: taxonomy.num_relations(),
        })
    }
}
