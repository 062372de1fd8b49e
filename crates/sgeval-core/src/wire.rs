//! JSON Lines wire form of input batches.
//!
//! Each line is one [`BatchRecord`], tagged by `kind`:
//!
//! ```json
//! {"kind": "edges", "image": [0], "relation_scores": [[0.1, 0.9]], ...}
//! {"kind": "targets", "image": 0, "triplets": [...]}
//! {"kind": "window_end"}
//! ```
//!
//! Relation targets use `-1` for "no relation annotated".

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::batch::{EdgeBatch, EdgeTargets, TargetTriplet};
use crate::category::Category;
use crate::error::{BatchError, BatchResult};
use crate::geometry::BBox;
use crate::taxonomy::RelationId;

/// One line of a batch stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchRecord {
    /// Scored edges, optionally with row-aligned targets
    Edges(EdgeRecord),
    /// Free-standing ground truth for one image
    Targets(TargetsRecord),
    /// Close the current evaluation window
    WindowEnd,
}

/// Wire form of an [`EdgeBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub image: Vec<usize>,
    pub relation_scores: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_scores: Option<Vec<Vec<f32>>>,
    pub connectivity: Vec<f32>,
    pub subject: Vec<Category>,
    pub object: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_confidence: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_confidence: Option<Vec<f32>>,
    pub subject_box: Vec<BBox>,
    pub object_box: Vec<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<EdgeTargetsRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<Vec<bool>>,
}

/// Wire form of [`EdgeTargets`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTargetsRecord {
    pub relation: Vec<i64>,
    pub subject: Vec<Category>,
    pub object: Vec<Category>,
    pub subject_box: Vec<BBox>,
    pub object_box: Vec<BBox>,
}

/// Ground truth for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsRecord {
    pub image: usize,
    pub triplets: Vec<TripletRecord>,
}

/// Wire form of a [`TargetTriplet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripletRecord {
    pub subject: Category,
    pub relation: i64,
    pub object: Category,
    pub subject_box: BBox,
    pub object_box: BBox,
}

/// Decode a wire relation id; `-1` is the "not annotated" sentinel.
pub fn relation_from_wire(value: i64) -> BatchResult<Option<RelationId>> {
    match value {
        -1 => Ok(None),
        v => RelationId::try_from(v)
            .map(Some)
            .map_err(|_| BatchError::InvalidRelation(v)),
    }
}

/// Encode an optional relation id with the `-1` sentinel.
pub fn relation_to_wire(relation: Option<RelationId>) -> i64 {
    relation.map_or(-1, |r| r as i64)
}

fn to_matrix(rows: Vec<Vec<f32>>) -> BatchResult<Array2<f32>> {
    let width = rows.first().map_or(0, Vec::len);
    let height = rows.len();
    let mut flat = Vec::with_capacity(height * width);
    for (row, values) in rows.into_iter().enumerate() {
        if values.len() != width {
            return Err(BatchError::RaggedScores {
                row,
                expected: width,
                actual: values.len(),
            });
        }
        flat.extend(values);
    }
    Array2::from_shape_vec((height, width), flat).map_err(|_| BatchError::RaggedScores {
        row: 0,
        expected: width,
        actual: 0,
    })
}

impl TryFrom<EdgeTargetsRecord> for EdgeTargets {
    type Error = BatchError;

    fn try_from(record: EdgeTargetsRecord) -> BatchResult<Self> {
        let relation = record
            .relation
            .into_iter()
            .map(relation_from_wire)
            .collect::<BatchResult<Vec<_>>>()?;
        Ok(EdgeTargets {
            relation,
            subject: record.subject,
            object: record.object,
            subject_box: record.subject_box,
            object_box: record.object_box,
        })
    }
}

impl TryFrom<EdgeRecord> for EdgeBatch {
    type Error = BatchError;

    fn try_from(record: EdgeRecord) -> BatchResult<Self> {
        let mut batch = EdgeBatch::new(
            record.image,
            to_matrix(record.relation_scores)?,
            record.connectivity,
            record.subject,
            record.object,
            record.subject_box,
            record.object_box,
        );
        if let Some(super_scores) = record.super_scores {
            batch = batch.with_super_scores(to_matrix(super_scores)?);
        }
        batch.subject_confidence = record.subject_confidence;
        batch.object_confidence = record.object_confidence;
        if let Some(targets) = record.targets {
            batch = batch.with_targets(targets.try_into()?);
        }
        batch.keep = record.keep;
        Ok(batch)
    }
}

impl TryFrom<TripletRecord> for TargetTriplet {
    type Error = BatchError;

    fn try_from(record: TripletRecord) -> BatchResult<Self> {
        Ok(TargetTriplet {
            subject: record.subject,
            relation: relation_from_wire(record.relation)?,
            object: record.object,
            subject_box: record.subject_box,
            object_box: record.object_box,
        })
    }
}

impl From<TargetTriplet> for TripletRecord {
    fn from(triplet: TargetTriplet) -> Self {
        TripletRecord {
            subject: triplet.subject,
            relation: relation_to_wire(triplet.relation),
            object: triplet.object,
            subject_box: triplet.subject_box,
            object_box: triplet.object_box,
        }
    }
}

impl TargetsRecord {
    /// Decode every triplet of the record.
    pub fn triplets(&self) -> BatchResult<Vec<TargetTriplet>> {
        self.triplets.iter().map(|t| TargetTriplet::try_from(*t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edges_record() {
        let line = r#"{"kind":"edges","image":[0,0],
            "relation_scores":[[0.1,0.9],[0.8,0.2]],
            "connectivity":[0.0,-0.5],
            "subject":[1,2],"object":[3,4],
            "subject_box":[[0,10,0,10],[0,5,0,5]],
            "object_box":[[10,20,10,20],[5,10,5,10]],
            "targets":{"relation":[1,-1],"subject":[1,2],"object":[3,4],
                       "subject_box":[[0,10,0,10],[0,5,0,5]],
                       "object_box":[[10,20,10,20],[5,10,5,10]]}}"#;
        let record: BatchRecord = serde_json::from_str(line).unwrap();
        let BatchRecord::Edges(edges) = record else {
            panic!("expected edges record");
        };
        let batch = EdgeBatch::try_from(edges).unwrap();
        assert_eq!(batch.relation_scores.dim(), (2, 2));
        assert_eq!(batch.subject_box[0], BBox::new(0, 10, 0, 10));
        let targets = batch.targets.unwrap();
        assert_eq!(targets.relation, vec![Some(1), None]);
        assert!(batch.keep.is_none());
    }

    #[test]
    fn test_parse_window_end() {
        let record: BatchRecord = serde_json::from_str(r#"{"kind":"window_end"}"#).unwrap();
        assert_eq!(record, BatchRecord::WindowEnd);
    }

    #[test]
    fn test_parse_targets_record() {
        let line = r#"{"kind":"targets","image":3,"triplets":[
            {"subject":5,"relation":2,"object":9,
             "subject_box":[0,10,0,10],"object_box":[10,20,10,20]}]}"#;
        let BatchRecord::Targets(record) = serde_json::from_str::<BatchRecord>(line).unwrap() else {
            panic!("expected targets record");
        };
        assert_eq!(record.image, 3);
        let triplets = record.triplets().unwrap();
        assert_eq!(triplets[0].relation, Some(2));
    }

    #[test]
    fn test_ragged_scores_rejected() {
        let err = to_matrix(vec![vec![0.1, 0.2], vec![0.3]]).unwrap_err();
        assert_eq!(
            err,
            BatchError::RaggedScores {
                row: 1,
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_negative_relation_other_than_sentinel_rejected() {
        assert_eq!(relation_from_wire(-1), Ok(None));
        assert_eq!(relation_from_wire(-2), Err(BatchError::InvalidRelation(-2)));
        assert_eq!(relation_from_wire(7), Ok(Some(7)));
    }

    #[test]
    fn test_triplet_sentinel_round_trip() {
        let triplet = TargetTriplet {
            subject: 1,
            relation: None,
            object: 2,
            subject_box: BBox::new(0, 1, 0, 1),
            object_box: BBox::new(1, 2, 1, 2),
        };
        let record = TripletRecord::from(triplet);
        assert_eq!(record.relation, -1);
        assert_eq!(TargetTriplet::try_from(record).unwrap(), triplet);
    }
}
