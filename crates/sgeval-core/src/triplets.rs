//! Triplet signature tables and per-class weights.
//!
//! Both are produced by dataset preprocessing and read from JSON:
//! triplet tables are arrays of `"subject_relation_object"` strings, class
//! weights are arrays of numbers indexed by relation id.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::{EvalError, Result};
use crate::taxonomy::RelationId;

/// `(subject, relation, object)` signature, written `s_r_o`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripletKey {
    pub subject: Category,
    pub relation: RelationId,
    pub object: Category,
}

impl TripletKey {
    pub const fn new(subject: Category, relation: RelationId, object: Category) -> Self {
        Self {
            subject,
            relation,
            object,
        }
    }
}

impl fmt::Display for TripletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.subject, self.relation, self.object)
    }
}

impl FromStr for TripletKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split('_');
        let mut next = |what: &str| {
            parts
                .next()
                .ok_or_else(|| format!("missing {what} in triplet `{s}`"))
                .and_then(|p| {
                    p.trim()
                        .parse::<u64>()
                        .map_err(|e| format!("bad {what} in triplet `{s}`: {e}"))
                })
        };
        let subject = next("subject")?;
        let relation = next("relation")?;
        let object = next("object")?;
        if parts.next().is_some() {
            return Err(format!("trailing fields in triplet `{s}`"));
        }
        let narrow = |what: &str, e: std::num::TryFromIntError| {
            format!("{what} out of range in triplet `{s}`: {e}")
        };
        let subject = Category::try_from(subject).map_err(|e| narrow("subject", e))?;
        let relation = RelationId::try_from(relation).map_err(|e| narrow("relation", e))?;
        let object = Category::try_from(object).map_err(|e| narrow("object", e))?;
        Ok(Self::new(subject, relation, object))
    }
}

fn table_error(path: &Path, message: impl Into<String>) -> EvalError {
    EvalError::Table {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Read a JSON array of `s_r_o` strings into a set.
fn load_key_set(path: &Path) -> Result<HashSet<TripletKey>> {
    let content = std::fs::read_to_string(path)?;
    let raw: Vec<String> = serde_json::from_str(&content)?;
    raw.iter()
        .map(|s| s.parse().map_err(|e: String| table_error(path, e)))
        .collect()
}

/// Training and zero-shot triplet signatures.
#[derive(Debug, Clone, Default)]
pub struct TripletTable {
    train: HashSet<TripletKey>,
    zero_shot: HashSet<TripletKey>,
}

impl TripletTable {
    /// Build from in-memory sets.
    ///
    /// A zero-shot triplet must never occur in training; any key present in
    /// both sets is dropped from the zero-shot set.
    pub fn new(
        train: impl IntoIterator<Item = TripletKey>,
        zero_shot: impl IntoIterator<Item = TripletKey>,
    ) -> Self {
        let train: HashSet<_> = train.into_iter().collect();
        let mut zero_shot: HashSet<_> = zero_shot.into_iter().collect();
        let before = zero_shot.len();
        zero_shot.retain(|k| !train.contains(k));
        if zero_shot.len() != before {
            tracing::warn!(
                "Dropped {} zero-shot triplets that also occur in training",
                before - zero_shot.len()
            );
        }
        Self { train, zero_shot }
    }

    /// Load the zero-shot table, optionally checked against the training table.
    pub fn load(train_path: Option<&Path>, zero_shot_path: &Path) -> Result<Self> {
        let train = match train_path {
            Some(p) => load_key_set(p)?,
            None => HashSet::new(),
        };
        let zero_shot = load_key_set(zero_shot_path)?;
        tracing::debug!(
            "Loaded {} zero-shot triplets ({} training triplets)",
            zero_shot.len(),
            train.len()
        );
        Ok(Self::new(train, zero_shot))
    }

    pub fn is_zero_shot(&self, key: &TripletKey) -> bool {
        self.zero_shot.contains(key)
    }

    #[cfg(test)]
    pub(crate) fn is_train(&self, key: &TripletKey) -> bool {
        self.train.contains(key)
    }

    pub fn zero_shot_len(&self) -> usize {
        self.zero_shot.len()
    }
}

/// Per-relation weights for the weighted mean precision.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights(Vec<f64>);

impl ClassWeights {
    pub fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Every class weighted equally.
    pub fn uniform(num_relations: usize) -> Self {
        Self(vec![1.0; num_relations])
    }

    /// Load a JSON array of weights; its length must be `num_relations`.
    pub fn load(path: &Path, num_relations: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let weights: Vec<f64> = serde_json::from_str(&content)?;
        if weights.len() != num_relations {
            return Err(table_error(
                path,
                format!(
                    "expected {} class weights, found {}",
                    num_relations,
                    weights.len()
                ),
            ));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(table_error(path, "class weights must be finite and >= 0"));
        }
        Ok(Self(weights))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_parse() {
        let key = TripletKey::new(5, 2, 9);
        assert_eq!(key.to_string(), "5_2_9");
        assert_eq!("5_2_9".parse::<TripletKey>().unwrap(), key);
    }

    #[test]
    fn test_key_parse_errors() {
        assert!("5_2".parse::<TripletKey>().is_err());
        assert!("5_x_9".parse::<TripletKey>().is_err());
        assert!("5_2_9_1".parse::<TripletKey>().is_err());
    }

    #[test]
    fn test_key_parse_rejects_out_of_range_ids() {
        let err = "4294967296_2_9".parse::<TripletKey>().unwrap_err();
        assert!(err.contains("subject out of range"));
        let err = "5_2_4294967296".parse::<TripletKey>().unwrap_err();
        assert!(err.contains("object out of range"));
        let err = "5_18446744073709551616_9".parse::<TripletKey>().unwrap_err();
        assert!(err.contains("bad relation"));
    }

    #[test]
    fn test_overlap_dropped_from_zero_shot() {
        let table = TripletTable::new(
            [TripletKey::new(1, 2, 3)],
            [TripletKey::new(1, 2, 3), TripletKey::new(4, 5, 6)],
        );
        assert!(!table.is_zero_shot(&TripletKey::new(1, 2, 3)));
        assert!(table.is_zero_shot(&TripletKey::new(4, 5, 6)));
        assert!(table.is_train(&TripletKey::new(1, 2, 3)));
        assert_eq!(table.zero_shot_len(), 1);
    }

    #[test]
    fn test_load_tables_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train.json");
        let zs = dir.path().join("zs.json");
        std::fs::write(&train, r#"["1_2_3", "7_0_7"]"#).unwrap();
        std::fs::write(&zs, r#"["4_5_6"]"#).unwrap();

        let table = TripletTable::load(Some(&train), &zs).unwrap();
        assert!(table.is_zero_shot(&TripletKey::new(4, 5, 6)));
        assert!(table.is_train(&TripletKey::new(7, 0, 7)));
    }

    #[test]
    fn test_load_rejects_malformed_key() {
        let dir = tempfile::tempdir().unwrap();
        let zs = dir.path().join("zs.json");
        std::fs::write(&zs, r#"["4_five_6"]"#).unwrap();
        let err = TripletTable::load(None, &zs).unwrap_err();
        assert!(err.to_string().contains("zs.json"));
    }

    #[test]
    fn test_class_weights_length_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.json");
        std::fs::write(&path, "[0.5, 0.25, 0.25]").unwrap();
        assert_eq!(ClassWeights::load(&path, 3).unwrap().len(), 3);
        let err = ClassWeights::load(&path, 4).unwrap_err();
        assert!(err.to_string().contains("expected 4"));
    }
}
