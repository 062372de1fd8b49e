//! Evaluation windows.
//!
//! A [`Window`] collects ranked candidates and ground truth for one
//! evaluation window. Scored edges are turned into candidates according to
//! the window's [`RankingMode`]; each candidate keeps its relation score and
//! its prior (connectivity plus category confidences) apart until
//! [`Window::seal`] fuses them into the final confidence. Sealing consumes
//! the window, so the fusion happens exactly once and everything downstream
//! reads an immutable [`SealedWindow`].

use serde::{Deserialize, Serialize};

use crate::batch::{check_relation, EdgeBatch, TargetTriplet};
use crate::category::Category;
use crate::config::{EvalMode, EvaluationConfig};
use crate::error::{BatchError, BatchResult};
use crate::geometry::BBox;
use crate::taxonomy::{HeadVote, RelationId, RelationTaxonomy, SuperCategory};
use crate::triplets::TripletKey;

/// How candidates are produced from each scored edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RankingMode {
    /// The argmax relation per edge; one per head for a hierarchical taxonomy
    GraphConstrained,
    /// One candidate per edge carrying all three head argmaxes
    Top3,
    /// Every relation class of every edge scoring above a per-batch floor
    Unconstrained { keep_fraction: f32 },
}

impl RankingMode {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self::from_eval_mode(config.mode, config.keep_fraction)
    }

    pub fn from_eval_mode(mode: EvalMode, keep_fraction: f32) -> Self {
        match mode {
            EvalMode::GraphConstrained => RankingMode::GraphConstrained,
            EvalMode::Top3 => RankingMode::Top3,
            EvalMode::NoGraphConstraint => RankingMode::Unconstrained { keep_fraction },
        }
    }

    pub fn eval_mode(&self) -> EvalMode {
        match self {
            RankingMode::GraphConstrained => EvalMode::GraphConstrained,
            RankingMode::Top3 => EvalMode::Top3,
            RankingMode::Unconstrained { .. } => EvalMode::NoGraphConstraint,
        }
    }
}

impl std::fmt::Display for RankingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.eval_mode())
    }
}

/// Per-head argmaxes of a Top-3 candidate and the head picked by the
/// super-category classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Top3Heads {
    /// Geometric, possessive and semantic argmax, in that order
    pub heads: [RelationId; 3],
    pub chosen: SuperCategory,
}

impl Top3Heads {
    /// Whether any of the three heads proposes `relation`.
    pub fn any(&self, relation: RelationId) -> bool {
        self.heads.contains(&relation)
    }

    /// The relation proposed by the chosen head.
    pub fn chosen_relation(&self) -> RelationId {
        self.heads[self.chosen.index()]
    }
}

/// One ranked candidate triplet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub image: usize,
    pub subject: Category,
    pub object: Category,
    pub subject_box: BBox,
    pub object_box: BBox,
    pub relation: RelationId,
    /// Relation score before sealing, fused confidence after
    pub confidence: f32,
    pub top3: Option<Top3Heads>,
}

/// One annotated ground-truth triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroundTruth {
    pub image: usize,
    pub subject: Category,
    pub relation: RelationId,
    pub object: Category,
    pub subject_box: BBox,
    pub object_box: BBox,
}

impl GroundTruth {
    /// Annotated targets only; `None` for pairs without a relation.
    fn from_triplet(image: usize, t: &TargetTriplet) -> Option<Self> {
        Some(Self {
            image,
            subject: t.subject,
            relation: t.relation?,
            object: t.object,
            subject_box: t.subject_box,
            object_box: t.object_box,
        })
    }

    pub fn key(&self) -> TripletKey {
        TripletKey::new(self.subject, self.relation, self.object)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    prediction: Prediction,
    prior: f32,
}

/// Accumulator for one evaluation window.
#[derive(Debug, Clone)]
pub struct Window {
    mode: RankingMode,
    taxonomy: RelationTaxonomy,
    candidates: Vec<Candidate>,
    targets: Vec<GroundTruth>,
    batches: usize,
}

impl Window {
    /// Create an empty window. Top-3 ranking needs a hierarchical taxonomy.
    pub fn new(mode: RankingMode, taxonomy: RelationTaxonomy) -> BatchResult<Self> {
        if mode == RankingMode::Top3 && !taxonomy.is_hierarchical() {
            return Err(BatchError::FlatTaxonomy);
        }
        Ok(Self {
            mode,
            taxonomy,
            candidates: Vec::new(),
            targets: Vec::new(),
            batches: 0,
        })
    }

    pub fn mode(&self) -> RankingMode {
        self.mode
    }

    pub fn taxonomy(&self) -> &RelationTaxonomy {
        &self.taxonomy
    }

    /// Append one batch of scored edges.
    ///
    /// The batch is validated first and committed as a whole; on error the
    /// window is left unchanged. Returns the number of candidates added.
    pub fn append_edges(&mut self, batch: &EdgeBatch) -> BatchResult<usize> {
        batch.validate(&self.taxonomy)?;

        let mut candidates = Vec::new();
        let mut targets = Vec::new();
        match self.mode {
            RankingMode::GraphConstrained => {
                for row in batch.kept_rows() {
                    self.push_constrained(batch, row, &mut candidates);
                }
            }
            RankingMode::Top3 => {
                for row in batch.kept_rows() {
                    candidates.push(self.top3_candidate(batch, row)?);
                }
            }
            RankingMode::Unconstrained { keep_fraction } => {
                self.push_unconstrained(batch, keep_fraction, &mut candidates);
            }
        }
        if let Some(edge_targets) = &batch.targets {
            targets.extend(
                batch
                    .kept_rows()
                    .filter_map(|row| GroundTruth::from_triplet(batch.image[row], &edge_targets.row(row))),
            );
        }

        let added = candidates.len();
        tracing::debug!(
            "Window ({}): {} rows -> {} candidates, {} targets",
            self.mode,
            batch.len(),
            added,
            targets.len()
        );
        self.candidates.extend(candidates);
        self.targets.extend(targets);
        self.batches += 1;
        Ok(added)
    }

    /// Append free-standing ground truth for one image.
    ///
    /// Triplets without a relation are skipped. Returns the number of
    /// targets added.
    pub fn append_targets(&mut self, image: usize, triplets: &[TargetTriplet]) -> BatchResult<usize> {
        for relation in triplets.iter().filter_map(|t| t.relation) {
            check_relation(relation, &self.taxonomy)?;
        }
        let before = self.targets.len();
        self.targets
            .extend(triplets.iter().filter_map(|t| GroundTruth::from_triplet(image, t)));
        Ok(self.targets.len() - before)
    }

    fn candidate(batch: &EdgeBatch, row: usize, relation: RelationId, score: f32) -> Candidate {
        Candidate {
            prediction: Prediction {
                image: batch.image[row],
                subject: batch.subject[row],
                object: batch.object[row],
                subject_box: batch.subject_box[row],
                object_box: batch.object_box[row],
                relation,
                confidence: score,
                top3: None,
            },
            prior: batch.prior(row),
        }
    }

    fn push_constrained(&self, batch: &EdgeBatch, row: usize, out: &mut Vec<Candidate>) {
        let scores = batch.scores(row);
        match self.taxonomy.head_votes(scores) {
            Some(votes) => {
                out.extend(
                    votes
                        .iter()
                        .map(|v| Self::candidate(batch, row, v.relation, v.score)),
                );
            }
            None => {
                if let Some((relation, score)) = self.taxonomy.best(scores) {
                    out.push(Self::candidate(batch, row, relation, score));
                }
            }
        }
    }

    fn top3_candidate(&self, batch: &EdgeBatch, row: usize) -> BatchResult<Candidate> {
        let votes = self
            .taxonomy
            .head_votes(batch.scores(row))
            .ok_or(BatchError::FlatTaxonomy)?;
        let chosen = batch
            .super_scores
            .as_ref()
            .and_then(|s| RelationTaxonomy::best_in(s.row(row), 0..3))
            .and_then(|(i, _)| SuperCategory::from_index(i))
            .unwrap_or_else(|| strongest(&votes).category);
        let best = strongest(&votes);

        let mut candidate = Self::candidate(batch, row, votes[chosen.index()].relation, best.score);
        candidate.prediction.top3 = Some(Top3Heads {
            heads: [votes[0].relation, votes[1].relation, votes[2].relation],
            chosen,
        });
        Ok(candidate)
    }

    /// The score floor is taken over every row of the batch, kept or not;
    /// only kept rows contribute candidates.
    fn push_unconstrained(&self, batch: &EdgeBatch, keep_fraction: f32, out: &mut Vec<Candidate>) {
        let mut values: Vec<f32> = batch.relation_scores.iter().copied().collect();
        if values.is_empty() {
            return;
        }
        values.sort_by(|a, b| b.total_cmp(a));
        let index = (keep_fraction * values.len() as f32) as usize;
        let floor = values.get(index).copied();

        for row in batch.kept_rows() {
            for (relation, &score) in batch.scores(row).iter().enumerate() {
                if floor.map_or(true, |f| score > f) {
                    out.push(Self::candidate(batch, row, relation, score));
                }
            }
        }
    }

    /// Number of candidates collected so far.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of edge batches appended.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Fuse each candidate's prior into its confidence and freeze the window.
    pub fn seal(self) -> SealedWindow {
        let predictions = self
            .candidates
            .into_iter()
            .map(|c| {
                let mut p = c.prediction;
                p.confidence += c.prior;
                p
            })
            .collect();
        SealedWindow {
            mode: self.mode,
            taxonomy: self.taxonomy,
            predictions,
            targets: self.targets,
            batches: self.batches,
        }
    }
}

/// First head with the highest score.
fn strongest(votes: &[HeadVote; 3]) -> HeadVote {
    votes
        .iter()
        .copied()
        .fold(votes[0], |best, v| if v.score > best.score { v } else { best })
}

/// Immutable contents of a window, ready to score.
#[derive(Debug, Clone)]
pub struct SealedWindow {
    mode: RankingMode,
    taxonomy: RelationTaxonomy,
    predictions: Vec<Prediction>,
    targets: Vec<GroundTruth>,
    batches: usize,
}

impl SealedWindow {
    pub fn mode(&self) -> RankingMode {
        self.mode
    }

    pub fn taxonomy(&self) -> &RelationTaxonomy {
        &self.taxonomy
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn targets(&self) -> &[GroundTruth] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}
