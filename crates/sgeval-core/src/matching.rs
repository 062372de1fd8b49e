//! Matching ranked candidates against ground truth.
//!
//! [`RecallEngine`] walks each image's ground truth and looks for the first
//! qualifying candidate among the image's top-ranked predictions.
//! [`PrecisionEngine`] turns the loops around: each top-ranked candidate
//! looks for a ground truth that confirms it.
//!
//! Both engines only read a [`SealedWindow`], so scoring the same window any
//! number of times gives the same result.

use std::collections::HashMap;

use crate::category::CategoryMatcher;
use crate::config::EvaluationConfig;
use crate::geometry::{union_iou, BoxMask};
use crate::metrics::{PrecisionTally, RecallTally, ScoreCard};
use crate::taxonomy::RelationId;
use crate::triplets::TripletTable;
use crate::window::{GroundTruth, Prediction, RankingMode, SealedWindow};

/// Geometry and cutoff settings shared by the engines.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub feature_size: usize,
    pub iou_thresh: f32,
    /// Recall cutoffs, strictly increasing
    pub top_k: Vec<usize>,
    /// Candidates per image considered by precision
    pub precision_top_k: usize,
}

impl MatchSettings {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            feature_size: config.feature_size,
            iou_thresh: config.iou_thresh,
            top_k: config.top_k.clone(),
            precision_top_k: config.precision_top_k,
        }
    }

    fn max_k(&self) -> usize {
        self.top_k.iter().copied().max().unwrap_or(0)
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from_config(&EvaluationConfig::default())
    }
}

/// Rasterized subject and object boxes of candidates, built on first use.
struct MaskCache<'w> {
    feature_size: usize,
    predictions: &'w [Prediction],
    masks: HashMap<usize, (BoxMask, BoxMask)>,
}

impl<'w> MaskCache<'w> {
    fn new(predictions: &'w [Prediction], feature_size: usize) -> Self {
        Self {
            feature_size,
            predictions,
            masks: HashMap::new(),
        }
    }

    fn get(&mut self, index: usize) -> &(BoxMask, BoxMask) {
        let (predictions, fs) = (self.predictions, self.feature_size);
        self.masks.entry(index).or_insert_with(|| {
            let p = &predictions[index];
            (
                BoxMask::from_box(&p.subject_box, fs),
                BoxMask::from_box(&p.object_box, fs),
            )
        })
    }
}

/// Whether `p` proposes `relation` (any head, in Top-3 mode).
fn proposes(p: &Prediction, relation: RelationId) -> bool {
    p.top3
        .map_or(p.relation == relation, |heads| heads.any(relation))
}

/// Whether the head chosen by the super-category classifier proposes `relation`.
fn proposes_top1(p: &Prediction, relation: RelationId) -> bool {
    p.top3
        .map_or(p.relation == relation, |heads| heads.chosen_relation() == relation)
}

/// Recall@K scoring of sealed windows.
#[derive(Debug, Clone)]
pub struct RecallEngine<'a> {
    settings: &'a MatchSettings,
    matcher: &'a CategoryMatcher,
    triplets: Option<&'a TripletTable>,
    label_agnostic: bool,
}

impl<'a> RecallEngine<'a> {
    pub fn new(
        settings: &'a MatchSettings,
        matcher: &'a CategoryMatcher,
        triplets: Option<&'a TripletTable>,
    ) -> Self {
        Self {
            settings,
            matcher,
            triplets,
            label_agnostic: false,
        }
    }

    /// Also tally matches that ignore object categories.
    pub fn with_label_agnostic(mut self, enabled: bool) -> Self {
        self.label_agnostic = enabled;
        self
    }

    fn categories_match(&self, p: &Prediction, gt: &GroundTruth) -> bool {
        self.matcher.matches(p.subject, gt.subject) && self.matcher.matches(p.object, gt.object)
    }

    /// Score every image of `window` that has ground truth.
    ///
    /// Images without candidates still count their targets.
    pub fn score(&self, window: &SealedWindow) -> ScoreCard {
        let num_relations = window.taxonomy().num_relations();
        let top_k = &self.settings.top_k;
        let top3 = window.mode() == RankingMode::Top3;

        let mut card = ScoreCard::new(top_k, num_relations);
        if self.triplets.is_some() {
            card.zero_shot = Some(RecallTally::new(top_k, num_relations));
        }
        if top3 {
            card.top1 = Some(RecallTally::new(top_k, num_relations));
        }
        if self.label_agnostic {
            card.label_agnostic = Some(RecallTally::new(top_k, num_relations));
        }

        let predictions = window.predictions();
        let rankings = window.rankings();
        let mut masks = MaskCache::new(predictions, self.settings.feature_size);
        let no_candidates = Vec::new();

        for (image, target_ids) in window.targets_by_image() {
            let ranked = rankings.get(&image).unwrap_or(&no_candidates);
            let this_k = self.settings.max_k().min(ranked.len());
            let candidates = &ranked[..this_k];
            // Top-3 does not penalize images with more targets than the cutoff
            let floor = if top3 { target_ids.len() } else { 0 };

            for &ti in &target_ids {
                let gt = &window.targets()[ti];
                self.score_target(gt, candidates, floor, &mut masks, &mut card);
            }
        }

        tracing::debug!(
            "Scored {} targets against {} candidates ({})",
            card.recall.targets(),
            predictions.len(),
            window.mode()
        );
        card
    }

    fn score_target(
        &self,
        gt: &GroundTruth,
        candidates: &[usize],
        floor: usize,
        masks: &mut MaskCache<'_>,
        card: &mut ScoreCard,
    ) {
        let relation = gt.relation;
        let zero_shot = self
            .triplets
            .is_some_and(|t| t.is_zero_shot(&gt.key()));

        card.recall.record_target(relation);
        if zero_shot {
            if let Some(zs) = card.zero_shot.as_mut() {
                zs.record_target(relation);
            }
        }
        if let Some(top1) = card.top1.as_mut() {
            top1.record_target(relation);
        }
        if let Some(la) = card.label_agnostic.as_mut() {
            la.record_target(relation);
        }

        let fs = self.settings.feature_size;
        let thresh = self.settings.iou_thresh;
        let subject_mask = BoxMask::from_box(&gt.subject_box, fs);
        let object_mask = BoxMask::from_box(&gt.object_box, fs);

        let mut found = false;
        let mut found_top1 = card.top1.is_none();
        let mut found_label_agnostic = card.label_agnostic.is_none();

        for (rank, &index) in candidates.iter().enumerate() {
            if found && found_top1 && found_label_agnostic {
                break;
            }
            let p = masks.predictions[index];
            if !proposes(&p, relation) {
                continue;
            }
            let (ps, po) = masks.get(index);
            if ps.iou(&subject_mask) < thresh || po.iou(&object_mask) < thresh {
                continue;
            }
            if !found_label_agnostic {
                if let Some(la) = card.label_agnostic.as_mut() {
                    la.record_hit(relation, rank, floor);
                }
                found_label_agnostic = true;
            }
            if !self.categories_match(&p, gt) {
                continue;
            }
            if !found {
                card.recall.record_hit(relation, rank, floor);
                if zero_shot {
                    if let Some(zs) = card.zero_shot.as_mut() {
                        zs.record_hit(relation, rank, floor);
                    }
                }
                found = true;
            }
            if !found_top1 && proposes_top1(&p, relation) {
                if let Some(top1) = card.top1.as_mut() {
                    top1.record_hit(relation, rank, floor);
                }
                found_top1 = true;
            }
        }
    }
}

/// Per-class precision of the most confident candidates.
#[derive(Debug, Clone)]
pub struct PrecisionEngine<'a> {
    settings: &'a MatchSettings,
    matcher: &'a CategoryMatcher,
}

impl<'a> PrecisionEngine<'a> {
    pub fn new(settings: &'a MatchSettings, matcher: &'a CategoryMatcher) -> Self {
        Self { settings, matcher }
    }

    /// Each of an image's `precision_top_k` best candidates is credited at
    /// most once per criterion; every one of them counts toward its class.
    pub fn score(&self, window: &SealedWindow) -> PrecisionTally {
        let mut tally = PrecisionTally::new(window.taxonomy().num_relations());
        let predictions = window.predictions();
        let targets = window.targets();
        let targets_by_image = window.targets_by_image();
        let fs = self.settings.feature_size;
        let thresh = self.settings.iou_thresh;
        let no_targets = Vec::new();

        for (image, ranked) in window.rankings() {
            let image_targets = targets_by_image.get(&image).unwrap_or(&no_targets);
            let kept = &ranked[..self.settings.precision_top_k.min(ranked.len())];

            for &pi in kept {
                let p = &predictions[pi];
                let mut found = false;
                let mut found_phrase = false;
                let mut masks: Option<(BoxMask, BoxMask)> = None;

                for &ti in image_targets {
                    let gt = &targets[ti];
                    if gt.relation != p.relation
                        || !self.matcher.matches(p.subject, gt.subject)
                        || !self.matcher.matches(p.object, gt.object)
                    {
                        continue;
                    }
                    if !found {
                        let (ps, po) = masks.get_or_insert_with(|| {
                            (
                                BoxMask::from_box(&p.subject_box, fs),
                                BoxMask::from_box(&p.object_box, fs),
                            )
                        });
                        if ps.iou(&BoxMask::from_box(&gt.subject_box, fs)) >= thresh
                            && po.iou(&BoxMask::from_box(&gt.object_box, fs)) >= thresh
                        {
                            tally.record_relationship_hit(p.relation);
                            found = true;
                        }
                    }
                    if !found_phrase
                        && union_iou(
                            &p.subject_box,
                            &p.object_box,
                            &gt.subject_box,
                            &gt.object_box,
                            fs,
                        ) >= thresh
                    {
                        tally.record_phrase_hit(p.relation);
                        found_phrase = true;
                    }
                    if found && found_phrase {
                        break;
                    }
                }
                tally.record_prediction(p.relation);
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{EdgeBatch, EdgeTargets, TargetTriplet};
    use crate::category::Category;
    use crate::config::EquivalenceConfig;
    use crate::geometry::BBox;
    use crate::taxonomy::RelationTaxonomy;
    use crate::triplets::TripletKey;
    use crate::window::Window;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const BOX_S: BBox = BBox::new(0, 10, 0, 10);
    const BOX_O: BBox = BBox::new(10, 20, 10, 20);
    const FAR: BBox = BBox::new(40, 50, 40, 50);

    /// One flat-taxonomy edge: image, subject, relation, object, score, subject box.
    #[derive(Clone, Copy)]
    struct Edge {
        image: usize,
        subject: Category,
        relation: RelationId,
        object: Category,
        score: f32,
        subject_box: BBox,
    }

    fn edge(image: usize, subject: Category, relation: RelationId, object: Category, score: f32) -> Edge {
        Edge {
            image,
            subject,
            relation,
            object,
            score,
            subject_box: BOX_S,
        }
    }

    fn edge_batch(edges: &[Edge], num_relations: usize) -> EdgeBatch {
        let mut scores = Array2::from_elem((edges.len(), num_relations), -10.0f32);
        for (i, e) in edges.iter().enumerate() {
            scores[[i, e.relation]] = e.score;
        }
        EdgeBatch::new(
            edges.iter().map(|e| e.image).collect(),
            scores,
            vec![0.0; edges.len()],
            edges.iter().map(|e| e.subject).collect(),
            edges.iter().map(|e| e.object).collect(),
            edges.iter().map(|e| e.subject_box).collect(),
            vec![BOX_O; edges.len()],
        )
    }

    fn target(subject: Category, relation: Option<RelationId>, object: Category) -> TargetTriplet {
        TargetTriplet {
            subject,
            relation,
            object,
            subject_box: BOX_S,
            object_box: BOX_O,
        }
    }

    fn window(edges: &[Edge], targets: &[(usize, TargetTriplet)], num_relations: usize) -> SealedWindow {
        let mut w = Window::new(RankingMode::GraphConstrained, RelationTaxonomy::flat(num_relations)).unwrap();
        if !edges.is_empty() {
            w.append_edges(&edge_batch(edges, num_relations)).unwrap();
        }
        for (image, t) in targets {
            w.append_targets(*image, &[*t]).unwrap();
        }
        w.seal()
    }

    fn exact_score(w: &SealedWindow, settings: &MatchSettings) -> ScoreCard {
        let matcher = CategoryMatcher::exact();
        RecallEngine::new(settings, &matcher, None).score(w)
    }

    #[test]
    fn test_identical_prediction_is_recalled() {
        let w = window(&[edge(0, 5, 2, 9, 0.9)], &[(0, target(5, Some(2), 9))], 10);
        let settings = MatchSettings::default();
        let card = exact_score(&w, &settings);
        let report = card.recall.report(false);
        assert_eq!(report.recall, vec![1.0, 1.0, 1.0]);
        assert_eq!(card.recall.hits(20), Some(1.0));
    }

    #[test]
    fn test_category_mismatch_is_missed_but_counted() {
        let w = window(&[edge(0, 5, 2, 12, 0.9)], &[(0, target(5, Some(2), 9))], 10);
        let card = exact_score(&w, &MatchSettings::default());
        assert_eq!(card.recall.report(false).recall, vec![0.0, 0.0, 0.0]);
        assert_eq!(card.recall.targets(), 1.0);
    }

    #[test]
    fn test_unannotated_target_contributes_nothing() {
        let w = window(&[edge(0, 5, 2, 9, 0.9)], &[(0, target(5, None, 9))], 10);
        let card = exact_score(&w, &MatchSettings::default());
        assert_eq!(card.recall.targets(), 0.0);
        assert_eq!(card.recall.hits(100), Some(0.0));
    }

    #[test]
    fn test_hierarchical_row_offsets() {
        let taxonomy = RelationTaxonomy::hierarchical(15, 11, 24);
        let mut w = Window::new(RankingMode::GraphConstrained, taxonomy).unwrap();
        let mut scores = Array2::<f32>::zeros((1, 50));
        scores[[0, 7]] = 0.5;
        scores[[0, 20]] = 0.4;
        scores[[0, 49]] = 0.3;
        let batch = EdgeBatch::new(vec![0], scores, vec![0.0], vec![5], vec![9], vec![BOX_S], vec![BOX_O]);
        assert_eq!(w.append_edges(&batch).unwrap(), 3);
        let sealed = w.seal();
        let relations: Vec<_> = sealed.predictions().iter().map(|p| p.relation).collect();
        assert_eq!(relations, vec![7, 20, 49]);
    }

    #[test]
    fn test_box_below_threshold_is_missed() {
        let mut e = edge(0, 5, 2, 9, 0.9);
        e.subject_box = FAR;
        let w = window(&[e], &[(0, target(5, Some(2), 9))], 10);
        let card = exact_score(&w, &MatchSettings::default());
        assert_eq!(card.recall.hits(100), Some(0.0));
    }

    #[test]
    fn test_first_match_wins() {
        // qualifying predictions at ranks 3 and 7
        let mut edges = Vec::new();
        for rank in 0..10 {
            let score = 1.0 - rank as f32 * 0.05;
            let relation = if rank == 3 || rank == 7 { 2 } else { 1 };
            edges.push(edge(0, 5, relation, 9, score));
        }
        let w = window(&edges, &[(0, target(5, Some(2), 9))], 10);
        let settings = MatchSettings {
            top_k: vec![3, 4, 8],
            ..MatchSettings::default()
        };
        let card = exact_score(&w, &settings);
        assert_eq!(card.recall.hits(3), Some(0.0));
        assert_eq!(card.recall.hits(4), Some(1.0));
        assert_eq!(card.recall.hits(8), Some(1.0));
    }

    #[test]
    fn test_image_without_predictions_counts_targets() {
        let w = window(
            &[edge(0, 5, 2, 9, 0.9)],
            &[(0, target(5, Some(2), 9)), (1, target(1, Some(3), 2))],
            10,
        );
        let card = exact_score(&w, &MatchSettings::default());
        let report = card.recall.report(false);
        assert_eq!(report.targets, 2.0);
        assert!((report.recall[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cutoff_limits_scan_to_top_candidates() {
        let mut edges: Vec<Edge> = (0..5).map(|i| edge(0, 5, 1, 9, 1.0 - i as f32 * 0.1)).collect();
        edges.push(edge(0, 5, 2, 9, 0.0));
        let w = window(&edges, &[(0, target(5, Some(2), 9))], 10);
        let settings = MatchSettings {
            top_k: vec![2, 5],
            ..MatchSettings::default()
        };
        let card = exact_score(&w, &settings);
        assert_eq!(card.recall.hits(5), Some(0.0));
    }

    #[test]
    fn test_scoring_is_repeatable() {
        let w = window(&[edge(0, 5, 2, 9, 0.9)], &[(0, target(5, Some(2), 9))], 10);
        let settings = MatchSettings::default();
        assert_eq!(exact_score(&w, &settings), exact_score(&w, &settings));
    }

    #[test]
    fn test_zero_shot_tally_mirrors_zero_shot_targets() {
        let table = TripletTable::new([], [TripletKey::new(5, 2, 9)]);
        let w = window(
            &[edge(0, 5, 2, 9, 0.9)],
            &[(0, target(5, Some(2), 9)), (0, target(1, Some(3), 2))],
            10,
        );
        let settings = MatchSettings::default();
        let matcher = CategoryMatcher::exact();
        let card = RecallEngine::new(&settings, &matcher, Some(&table)).score(&w);
        let zs = card.zero_shot.unwrap();
        assert_eq!(zs.targets(), 1.0);
        assert_eq!(zs.hits(20), Some(1.0));
        assert_eq!(card.recall.targets(), 2.0);
    }

    #[test]
    fn test_equivalent_categories_match_in_detection() {
        // predicted "person" for annotated "man"
        let w = window(&[edge(0, 5, 2, 9, 0.9)], &[(0, target(1, Some(2), 9))], 10);
        let settings = MatchSettings::default();
        let matcher = CategoryMatcher::from_tables(&EquivalenceConfig::default());
        let card = RecallEngine::new(&settings, &matcher, None).score(&w);
        assert_eq!(card.recall.hits(20), Some(1.0));
        assert_eq!(exact_score(&w, &settings).recall.hits(20), Some(0.0));
    }

    #[test]
    fn test_label_agnostic_ignores_categories() {
        let w = window(&[edge(0, 7, 2, 8, 0.9)], &[(0, target(5, Some(2), 9))], 10);
        let settings = MatchSettings::default();
        let matcher = CategoryMatcher::exact();
        let card = RecallEngine::new(&settings, &matcher, None)
            .with_label_agnostic(true)
            .score(&w);
        assert_eq!(card.recall.hits(20), Some(0.0));
        assert_eq!(card.label_agnostic.unwrap().hits(20), Some(1.0));
    }

    fn top3_window(rows: &[([f32; 6], [f32; 3])], targets: &[TargetTriplet]) -> SealedWindow {
        let taxonomy = RelationTaxonomy::hierarchical(2, 2, 2);
        let mut w = Window::new(RankingMode::Top3, taxonomy).unwrap();
        let n = rows.len();
        let scores = Array2::from_shape_vec((n, 6), rows.iter().flat_map(|r| r.0).collect()).unwrap();
        let supers = Array2::from_shape_vec((n, 3), rows.iter().flat_map(|r| r.1).collect()).unwrap();
        let batch = EdgeBatch::new(
            vec![0; n],
            scores,
            vec![0.0; n],
            vec![5; n],
            vec![9; n],
            vec![BOX_S; n],
            vec![BOX_O; n],
        )
        .with_super_scores(supers);
        w.append_edges(&batch).unwrap();
        w.append_targets(0, targets).unwrap();
        w.seal()
    }

    #[test]
    fn test_top3_any_head_and_strict_head() {
        // heads: 0, 3, 5; classifier picks geometric (0)
        let w = top3_window(
            &[([0.9, 0.1, 0.2, 0.3, 0.4, 0.6], [0.8, 0.1, 0.1])],
            &[target(5, Some(3), 9)],
        );
        let settings = MatchSettings::default();
        let card = exact_score(&w, &settings);
        assert_eq!(card.recall.hits(20), Some(1.0));
        assert_eq!(card.top1.unwrap().hits(20), Some(0.0));
    }

    #[test]
    fn test_top3_strict_flag_found_at_later_rank() {
        let w = top3_window(
            &[
                // rank 0: any-head hit on 3, classifier picks geometric
                ([0.9, 0.1, 0.2, 0.3, 0.4, 0.6], [0.8, 0.1, 0.1]),
                // rank 1: classifier picks possessive, head proposes 3
                ([0.1, 0.1, 0.2, 0.5, 0.4, 0.3], [0.1, 0.8, 0.1]),
            ],
            &[target(5, Some(3), 9)],
        );
        let settings = MatchSettings {
            top_k: vec![1, 2],
            ..MatchSettings::default()
        };
        let card = exact_score(&w, &settings);
        assert_eq!(card.recall.hits(1), Some(1.0));
        let top1 = card.top1.unwrap();
        assert_eq!(top1.hits(1), Some(0.0));
        assert_eq!(top1.hits(2), Some(1.0));
    }

    #[test]
    fn test_top3_cutoff_floor_is_target_count() {
        // two targets in the image: a match at rank 1 counts even for k = 1
        let w = top3_window(
            &[
                ([0.9, 0.1, 0.2, 0.3, 0.4, 0.6], [0.8, 0.1, 0.1]),
                ([0.1, 0.1, 0.2, 0.5, 0.4, 0.3], [0.1, 0.8, 0.1]),
            ],
            &[target(5, Some(3), 9), target(5, Some(1), 9)],
        );
        let settings = MatchSettings {
            top_k: vec![1, 2],
            ..MatchSettings::default()
        };
        let card = exact_score(&w, &settings);
        let top1 = card.top1.unwrap();
        assert_eq!(top1.hits(1), Some(1.0));
    }

    #[test]
    fn test_top3_detection_tracks_top1_and_label_agnostic() {
        // heads 0, 3, 5 (classifier: geometric), then 0, 3, 4 (classifier: possessive)
        let w = top3_window(
            &[
                ([0.9, 0.1, 0.2, 0.3, 0.4, 0.6], [0.8, 0.1, 0.1]),
                ([0.1, 0.1, 0.2, 0.5, 0.4, 0.3], [0.1, 0.8, 0.1]),
            ],
            // "man" matches predicted "person"; category 12 matches nothing
            &[target(1, Some(3), 9), target(12, Some(5), 9)],
        );
        let settings = MatchSettings {
            top_k: vec![1, 2],
            ..MatchSettings::default()
        };
        let matcher = CategoryMatcher::from_tables(&EquivalenceConfig::default());
        let card = RecallEngine::new(&settings, &matcher, None)
            .with_label_agnostic(true)
            .score(&w);

        assert_eq!(card.recall.targets(), 2.0);
        assert_eq!(card.recall.hits(1), Some(1.0));
        let top1 = card.top1.unwrap();
        assert_eq!(top1.targets(), 2.0);
        assert_eq!(top1.hits(1), Some(1.0));
        let la = card.label_agnostic.unwrap();
        assert_eq!(la.targets(), 2.0);
        assert_eq!(la.hits(1), Some(2.0));
    }

    /// Unconstrained window over one image; every row is subject 5, object 9.
    fn unconstrained_window(
        rows: &[Vec<(RelationId, f32)>],
        keep_fraction: f32,
        targets: &[TargetTriplet],
    ) -> SealedWindow {
        let num_relations = 10;
        let n = rows.len();
        let mut scores = Array2::<f32>::zeros((n, num_relations));
        for (i, row) in rows.iter().enumerate() {
            for &(relation, score) in row {
                scores[[i, relation]] = score;
            }
        }
        let batch = EdgeBatch::new(
            vec![0; n],
            scores,
            vec![0.0; n],
            vec![5; n],
            vec![9; n],
            vec![BOX_S; n],
            vec![BOX_O; n],
        );
        let mode = RankingMode::Unconstrained { keep_fraction };
        let mut w = Window::new(mode, RelationTaxonomy::flat(num_relations)).unwrap();
        w.append_edges(&batch).unwrap();
        w.append_targets(0, targets).unwrap();
        w.seal()
    }

    #[test]
    fn test_unconstrained_edge_recalls_several_relations() {
        let w = unconstrained_window(
            &[vec![(2, 0.9), (4, 0.8)]],
            0.25,
            &[target(5, Some(2), 9), target(5, Some(4), 9)],
        );
        assert_eq!(w.predictions().len(), 2);
        let card = exact_score(&w, &MatchSettings::default());
        assert_eq!(card.recall.targets(), 2.0);
        assert_eq!(card.recall.hits(20), Some(2.0));
        assert_eq!(card.recall.report(false).recall, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unconstrained_relation_below_floor_is_missed() {
        // 20 scores, keep_fraction 0.1: floor is the third highest (0.5)
        let w = unconstrained_window(
            &[vec![(2, 0.9), (4, 0.8)], vec![(6, 0.5)]],
            0.1,
            &[target(5, Some(2), 9), target(5, Some(4), 9), target(5, Some(6), 9)],
        );
        assert!(w.predictions().iter().all(|p| p.relation != 6));
        let card = exact_score(&w, &MatchSettings::default());
        assert_eq!(card.recall.targets(), 3.0);
        assert_eq!(card.recall.hits(100), Some(2.0));
        assert_eq!(card.recall.targets_per_class()[6], 1.0);
    }

    fn random_window(seed: u64) -> SealedWindow {
        let mut rng = StdRng::seed_from_u64(seed);
        let num_relations = 6;
        let mut edges = Vec::new();
        let mut targets = Vec::new();
        for image in 0..8 {
            for _ in 0..rng.gen_range(0..40) {
                let mut e = edge(
                    image,
                    rng.gen_range(0..4),
                    rng.gen_range(0..num_relations),
                    rng.gen_range(0..4),
                    rng.gen::<f32>(),
                );
                if rng.gen_bool(0.3) {
                    e.subject_box = FAR;
                }
                edges.push(e);
            }
            for _ in 0..rng.gen_range(0..6) {
                let relation = if rng.gen_bool(0.2) {
                    None
                } else {
                    Some(rng.gen_range(0..num_relations))
                };
                targets.push((image, target(rng.gen_range(0..4), relation, rng.gen_range(0..4))));
            }
        }
        window(&edges, &targets, num_relations)
    }

    #[test]
    fn test_recall_is_monotonic_in_k() {
        let settings = MatchSettings {
            top_k: vec![1, 5, 10, 20, 50],
            ..MatchSettings::default()
        };
        for seed in 0..20 {
            let report = exact_score(&random_window(seed), &settings).recall.report(true);
            for pair in report.recall.windows(2) {
                assert!(pair[1] >= pair[0], "seed {seed}: {:?}", report.recall);
            }
            for pair in report.mean_recall.windows(2) {
                if !pair[0].is_nan() {
                    assert!(pair[1] >= pair[0]);
                }
            }
        }
    }

    #[test]
    fn test_target_count_matches_annotated_triplets() {
        let settings = MatchSettings::default();
        for seed in 0..20 {
            let w = random_window(seed);
            let card = exact_score(&w, &settings);
            let annotated = w.targets().len() as f64;
            assert_eq!(card.recall.targets(), annotated);
            assert_eq!(card.recall.targets_per_class().sum(), annotated);
        }
    }

    #[test]
    fn test_precision_credits_each_candidate_once() {
        // two identical candidates and two identical targets
        let w = window(
            &[edge(0, 5, 2, 9, 0.9), edge(0, 5, 2, 9, 0.8), edge(0, 5, 1, 9, 0.7)],
            &[(0, target(5, Some(2), 9)), (0, target(5, Some(2), 9))],
            4,
        );
        let settings = MatchSettings::default();
        let matcher = CategoryMatcher::exact();
        let tally = PrecisionEngine::new(&settings, &matcher).score(&w);
        let report = tally.report(&crate::triplets::ClassWeights::uniform(4));
        assert_eq!(report.predictions, 3.0);
        assert!((report.per_class_relationship[2] - 1.0).abs() < 1e-12);
        assert!((report.per_class_relationship[1] - 0.0).abs() < 1e-12);
        assert!((report.relationship - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_precision_phrase_criterion_uses_union_region() {
        // subject box shifted: relationship fails, union region still overlaps enough
        let mut e = edge(0, 5, 2, 9, 0.9);
        e.subject_box = BBox::new(2, 12, 2, 12);
        let w = window(&[e], &[(0, target(5, Some(2), 9))], 4);
        let settings = MatchSettings::default();
        let matcher = CategoryMatcher::exact();
        let report = PrecisionEngine::new(&settings, &matcher)
            .score(&w)
            .report(&crate::triplets::ClassWeights::uniform(4));
        assert!((report.per_class_relationship[2] - 0.0).abs() < 1e-12);
        assert!((report.per_class_phrase[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_precision_top_k_limits_candidates() {
        let edges: Vec<Edge> = (0..5).map(|i| edge(0, 5, 2, 9, 1.0 - i as f32 * 0.1)).collect();
        let w = window(&edges, &[(0, target(5, Some(2), 9))], 4);
        let settings = MatchSettings {
            precision_top_k: 2,
            ..MatchSettings::default()
        };
        let matcher = CategoryMatcher::exact();
        let tally = PrecisionEngine::new(&settings, &matcher).score(&w);
        assert_eq!(tally.predictions(), 2.0);
    }

    #[test]
    fn test_row_aligned_targets_score_like_free_targets() {
        let batch = edge_batch(&[edge(0, 5, 2, 9, 0.9)], 10).with_targets(EdgeTargets {
            relation: vec![Some(2)],
            subject: vec![5],
            object: vec![9],
            subject_box: vec![BOX_S],
            object_box: vec![BOX_O],
        });
        let mut w = Window::new(RankingMode::GraphConstrained, RelationTaxonomy::flat(10)).unwrap();
        w.append_edges(&batch).unwrap();
        let card = exact_score(&w.seal(), &MatchSettings::default());
        assert_eq!(card.recall.hits(20), Some(1.0));
    }
}
