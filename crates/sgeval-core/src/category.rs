//! Object category matching.
//!
//! Ground-truth-label protocols compare categories for equality. Detection
//! compares a predicted label against the annotation, which is noisy for
//! near-synonyms ("man" vs "person") and for generic labels ("vehicle" vs
//! "car"), so it consults two lookup tables:
//!
//! - symmetric groups: any two members are interchangeable;
//! - umbrella groups: the umbrella label matches each member in either
//!   direction, but members do not match each other through it.

use std::collections::{HashMap, HashSet};

use crate::config::EquivalenceConfig;

/// Object category id.
pub type Category = u32;

/// Decides whether a predicted category satisfies a target category.
#[derive(Debug, Clone, Default)]
pub struct CategoryMatcher {
    /// Category → canonical symmetric group id.
    group_of: HashMap<Category, usize>,
    /// Umbrella category → member categories.
    umbrellas: HashMap<Category, HashSet<Category>>,
}

impl CategoryMatcher {
    /// Plain equality.
    pub fn exact() -> Self {
        Self::default()
    }

    /// Equality widened by the given equivalence tables.
    ///
    /// Groups are expected to be disjoint (enforced by config validation);
    /// if a category is listed twice, its last group wins.
    pub fn from_tables(tables: &EquivalenceConfig) -> Self {
        let group_of = tables
            .groups
            .iter()
            .enumerate()
            .flat_map(|(id, group)| group.iter().map(move |&c| (c, id)))
            .collect();
        let umbrellas = tables
            .umbrellas
            .iter()
            .map(|u| (u.umbrella, u.members.iter().copied().collect()))
            .collect();
        Self {
            group_of,
            umbrellas,
        }
    }

    /// True when the matcher is plain equality.
    #[cfg(test)]
    pub(crate) fn is_exact(&self) -> bool {
        self.group_of.is_empty() && self.umbrellas.is_empty()
    }

    fn covers(&self, umbrella: Category, member: Category) -> bool {
        self.umbrellas
            .get(&umbrella)
            .is_some_and(|members| members.contains(&member))
    }

    /// Whether `predicted` counts as a hit for `target`.
    pub fn matches(&self, predicted: Category, target: Category) -> bool {
        if predicted == target {
            return true;
        }
        if let (Some(a), Some(b)) = (self.group_of.get(&predicted), self.group_of.get(&target)) {
            if a == b {
                return true;
            }
        }
        self.covers(predicted, target) || self.covers(target, predicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Visual Genome ids used by the default tables.
    const MAN: Category = 1;
    const PERSON: Category = 5;
    const TREE: Category = 0;
    const PLANT: Category = 50;
    const VEHICLE: Category = 123;
    const CAR: Category = 14;
    const BUS: Category = 63;

    fn vg() -> CategoryMatcher {
        CategoryMatcher::from_tables(&EquivalenceConfig::default())
    }

    #[test]
    fn test_exact_only_matches_equal() {
        let m = CategoryMatcher::exact();
        assert!(m.is_exact());
        assert!(m.matches(MAN, MAN));
        assert!(!m.matches(MAN, PERSON));
    }

    #[test]
    fn test_symmetric_group() {
        let m = vg();
        assert!(m.matches(MAN, PERSON));
        assert!(m.matches(PERSON, MAN));
        assert!(m.matches(TREE, PLANT));
        assert!(!m.matches(MAN, TREE));
    }

    #[test]
    fn test_umbrella_matches_members_both_ways() {
        let m = vg();
        assert!(m.matches(VEHICLE, CAR));
        assert!(m.matches(CAR, VEHICLE));
    }

    #[test]
    fn test_umbrella_members_do_not_match_each_other() {
        let m = vg();
        assert!(!m.matches(CAR, BUS));
        assert!(!m.matches(BUS, CAR));
    }

    #[test]
    fn test_unlisted_categories_fall_back_to_equality() {
        let m = vg();
        assert!(m.matches(7, 7));
        assert!(!m.matches(7, 8));
    }
}
