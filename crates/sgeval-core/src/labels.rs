//! Display names for object categories and relations.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::Result;
use crate::ranking::RankedTriplet;
use crate::taxonomy::RelationId;

/// Object and relation names, indexed by id.
///
/// Loaded from `{ "objects": [...], "relations": [...] }`. Ids without a
/// name render as `#<id>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelNames {
    pub objects: Vec<String>,
    pub relations: Vec<String>,
}

impl LabelNames {
    pub fn new(objects: Vec<String>, relations: Vec<String>) -> Self {
        Self { objects, relations }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let labels: LabelNames = serde_json::from_str(&content)?;
        tracing::debug!(
            "Loaded {} object and {} relation names from {:?}",
            labels.objects.len(),
            labels.relations.len(),
            path
        );
        Ok(labels)
    }

    pub fn object(&self, id: Category) -> String {
        lookup(&self.objects, id as usize)
    }

    pub fn relation(&self, id: RelationId) -> String {
        lookup(&self.relations, id)
    }

    /// `"man on horse"`.
    pub fn describe(&self, triplet: &RankedTriplet) -> String {
        format!(
            "{} {} {}",
            self.object(triplet.subject),
            self.relation(triplet.relation),
            self.object(triplet.object)
        )
    }
}

fn lookup(names: &[String], id: usize) -> String {
    names
        .get(id)
        .cloned()
        .unwrap_or_else(|| format!("#{id}"))
}
