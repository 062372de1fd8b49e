//! Relation id layout: flat, or split into three super-categories.
//!
//! A hierarchical taxonomy partitions `[0, num_relations)` into three
//! contiguous, disjoint ranges. Each range is scored by its own head, so
//! per-head argmaxes are taken within the range and offset back into the
//! global id space.

use std::ops::Range;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::config::TaxonomyConfig;
use crate::error::ConfigError;

/// Relation id in the global (flat) id space.
pub type RelationId = usize;

/// The three disjoint relation super-categories, in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuperCategory {
    Geometric,
    Possessive,
    Semantic,
}

impl SuperCategory {
    pub const ALL: [SuperCategory; 3] = [
        SuperCategory::Geometric,
        SuperCategory::Possessive,
        SuperCategory::Semantic,
    ];

    pub fn index(self) -> usize {
        match self {
            SuperCategory::Geometric => 0,
            SuperCategory::Possessive => 1,
            SuperCategory::Semantic => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for SuperCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuperCategory::Geometric => write!(f, "geometric"),
            SuperCategory::Possessive => write!(f, "possessive"),
            SuperCategory::Semantic => write!(f, "semantic"),
        }
    }
}

/// Best relation proposed by one super-category head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadVote {
    pub category: SuperCategory,
    pub relation: RelationId,
    pub score: f32,
}

/// Layout of the relation id space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTaxonomy {
    num_relations: usize,
    /// Widths of the geometric, possessive and semantic ranges.
    split: Option<[usize; 3]>,
}

impl RelationTaxonomy {
    pub fn flat(num_relations: usize) -> Self {
        Self {
            num_relations,
            split: None,
        }
    }

    pub fn hierarchical(num_geometric: usize, num_possessive: usize, num_semantic: usize) -> Self {
        Self {
            num_relations: num_geometric + num_possessive + num_semantic,
            split: Some([num_geometric, num_possessive, num_semantic]),
        }
    }

    /// Build from the `[taxonomy]` config section.
    pub fn from_config(config: &TaxonomyConfig) -> Result<Self, ConfigError> {
        if !config.hierarchical {
            return Ok(Self::flat(config.num_relations));
        }
        let taxonomy = Self::hierarchical(
            config.num_geometric,
            config.num_possessive,
            config.num_semantic,
        );
        if taxonomy.num_relations != config.num_relations {
            return Err(ConfigError::ValidationError(format!(
                "taxonomy.num_geometric + num_possessive + num_semantic = {} but taxonomy.num_relations = {}",
                taxonomy.num_relations, config.num_relations
            )));
        }
        Ok(taxonomy)
    }

    pub fn num_relations(&self) -> usize {
        self.num_relations
    }

    pub fn is_hierarchical(&self) -> bool {
        self.split.is_some()
    }

    /// Id range of one super-category, or `None` for a flat taxonomy.
    pub fn range(&self, category: SuperCategory) -> Option<Range<RelationId>> {
        let [g, p, _] = self.split?;
        Some(match category {
            SuperCategory::Geometric => 0..g,
            SuperCategory::Possessive => g..g + p,
            SuperCategory::Semantic => g + p..self.num_relations,
        })
    }

    /// Super-category containing `relation`, if the taxonomy is hierarchical.
    pub fn super_category_of(&self, relation: RelationId) -> Option<SuperCategory> {
        SuperCategory::ALL
            .into_iter()
            .find(|&c| self.range(c).is_some_and(|r| r.contains(&relation)))
    }

    /// Argmax of `scores` restricted to `range`, as a global relation id.
    ///
    /// The first maximum wins on ties. An empty range yields `None`.
    pub fn best_in(
        scores: ArrayView1<'_, f32>,
        range: Range<RelationId>,
    ) -> Option<(RelationId, f32)> {
        let start = range.start;
        scores
            .slice(ndarray::s![range])
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                Some((_, b)) if v <= b || v.is_nan() => best,
                _ => Some((start + i, v)),
            })
    }

    /// Argmax over the full score row.
    pub fn best(&self, scores: ArrayView1<'_, f32>) -> Option<(RelationId, f32)> {
        Self::best_in(scores, 0..self.num_relations)
    }

    /// One vote per super-category head, in geometric/possessive/semantic order.
    ///
    /// Returns `None` for a flat taxonomy or when a head range is empty.
    pub fn head_votes(&self, scores: ArrayView1<'_, f32>) -> Option<[HeadVote; 3]> {
        let mut votes = Vec::with_capacity(3);
        for category in SuperCategory::ALL {
            let (relation, score) = Self::best_in(scores, self.range(category)?)?;
            votes.push(HeadVote {
                category,
                relation,
                score,
            });
        }
        votes.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn vg() -> RelationTaxonomy {
        RelationTaxonomy::hierarchical(15, 11, 24)
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let t = vg();
        assert_eq!(t.num_relations(), 50);
        assert_eq!(t.range(SuperCategory::Geometric), Some(0..15));
        assert_eq!(t.range(SuperCategory::Possessive), Some(15..26));
        assert_eq!(t.range(SuperCategory::Semantic), Some(26..50));
    }

    #[test]
    fn test_flat_has_no_ranges() {
        let t = RelationTaxonomy::flat(50);
        assert!(!t.is_hierarchical());
        assert_eq!(t.range(SuperCategory::Semantic), None);
        assert_eq!(t.super_category_of(3), None);
    }

    #[test]
    fn test_super_category_of() {
        let t = vg();
        assert_eq!(t.super_category_of(0), Some(SuperCategory::Geometric));
        assert_eq!(t.super_category_of(15), Some(SuperCategory::Possessive));
        assert_eq!(t.super_category_of(49), Some(SuperCategory::Semantic));
        assert_eq!(t.super_category_of(50), None);
    }

    #[test]
    fn test_head_votes_are_offset() {
        let t = vg();
        let mut scores = Array1::<f32>::zeros(50);
        scores[3] = 0.9;
        scores[15 + 4] = 0.5;
        scores[26 + 7] = 0.7;
        let votes = t.head_votes(scores.view()).unwrap();
        assert_eq!(votes[0].relation, 3);
        assert_eq!(votes[1].relation, 19);
        assert_eq!(votes[2].relation, 33);
        assert_eq!(votes[2].category, SuperCategory::Semantic);
        assert!((votes[1].score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_best_in_first_max_wins() {
        let scores = Array1::from(vec![0.1, 0.8, 0.8, 0.2]);
        assert_eq!(
            RelationTaxonomy::best_in(scores.view(), 0..4),
            Some((1, 0.8))
        );
    }

    #[test]
    fn test_best_in_empty_range() {
        let scores = Array1::from(vec![0.1, 0.8]);
        assert_eq!(RelationTaxonomy::best_in(scores.view(), 1..1), None);
    }

    #[test]
    fn test_from_config_rejects_bad_split() {
        let config = TaxonomyConfig {
            num_relations: 51,
            ..TaxonomyConfig::default()
        };
        let err = RelationTaxonomy::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("num_relations"));
    }
}
