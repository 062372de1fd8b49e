//! Configuration validation with range checks.

use std::collections::HashMap;

use crate::error::ConfigError;

use super::{Config, EvalMode};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let eval = &self.evaluation;
        let taxonomy = &self.taxonomy;

        if eval.feature_size == 0 {
            return Err(invalid("evaluation.feature_size must be > 0"));
        }
        if !(0.0..=1.0).contains(&eval.iou_thresh) {
            return Err(invalid("evaluation.iou_thresh must be between 0.0 and 1.0"));
        }
        if eval.top_k.is_empty() {
            return Err(invalid("evaluation.top_k must not be empty"));
        }
        if eval.top_k[0] == 0 || eval.top_k.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid(
                "evaluation.top_k must be positive and strictly increasing",
            ));
        }
        if !(eval.keep_fraction > 0.0 && eval.keep_fraction <= 1.0) {
            return Err(invalid(
                "evaluation.keep_fraction must be in (0.0, 1.0]",
            ));
        }
        if eval.precision_top_k == 0 {
            return Err(invalid("evaluation.precision_top_k must be > 0"));
        }
        if taxonomy.num_relations == 0 {
            return Err(invalid("taxonomy.num_relations must be > 0"));
        }
        if taxonomy.hierarchical {
            let sum = taxonomy.num_geometric + taxonomy.num_possessive + taxonomy.num_semantic;
            if sum != taxonomy.num_relations {
                return Err(invalid(format!(
                    "taxonomy.num_relations ({}) must equal num_geometric + num_possessive + num_semantic ({})",
                    taxonomy.num_relations, sum
                )));
            }
            if taxonomy.num_geometric == 0
                || taxonomy.num_possessive == 0
                || taxonomy.num_semantic == 0
            {
                return Err(invalid(
                    "taxonomy: every super-category range must be non-empty",
                ));
            }
        } else if eval.mode == EvalMode::Top3 {
            return Err(invalid(
                "evaluation.mode = \"top3\" requires taxonomy.hierarchical = true",
            ));
        }

        let mut seen: HashMap<u32, usize> = HashMap::new();
        for (group_id, group) in self.equivalence.groups.iter().enumerate() {
            for &category in group {
                if let Some(&other) = seen.get(&category) {
                    if other != group_id {
                        return Err(invalid(format!(
                            "equivalence.groups: category {} appears in groups {} and {}",
                            category, other, group_id
                        )));
                    }
                }
                seen.insert(category, group_id);
            }
        }
        Ok(())
    }
}
