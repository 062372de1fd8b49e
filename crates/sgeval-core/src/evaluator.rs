//! Running evaluation across windows.
//!
//! The [`Evaluator`] owns everything that outlives a single window: the
//! taxonomy, the category matcher, the dataset side tables and the running
//! totals per ranking protocol. Windows are opened, filled and sealed by the
//! caller, then handed back to [`Evaluator::absorb`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::category::CategoryMatcher;
use crate::config::{Config, DatasetName, EvalMode};
use crate::error::{BatchResult, ConfigError, Result};
use crate::matching::{MatchSettings, PrecisionEngine, RecallEngine};
use crate::metrics::{PrecisionReport, PrecisionTally, RecallSummary, ScoreCard};
use crate::taxonomy::RelationTaxonomy;
use crate::triplets::{ClassWeights, TripletTable};
use crate::window::{RankingMode, SealedWindow, Window};

/// Recall (and, for Open Images, precision) metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    #[serde(flatten)]
    pub recall: RecallSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<PrecisionReport>,
}

/// Result of absorbing one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub mode: EvalMode,
    /// 1-based index of the window within its protocol
    pub window: usize,
    pub predictions: usize,
    pub targets: usize,
    /// Metrics of this window alone
    pub metrics: Metrics,
    /// Metrics of every window absorbed since the last reset
    pub running: Metrics,
}

/// Running metrics of one protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolSummary {
    pub mode: EvalMode,
    pub windows: usize,
    #[serde(flatten)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone)]
struct Running {
    card: ScoreCard,
    precision: Option<PrecisionTally>,
    windows: usize,
}

/// Scores sealed windows and keeps running totals.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: Config,
    taxonomy: RelationTaxonomy,
    settings: MatchSettings,
    matcher: CategoryMatcher,
    triplets: Option<TripletTable>,
    weights: Option<ClassWeights>,
    running: BTreeMap<EvalMode, Running>,
}

impl Evaluator {
    /// Build an evaluator, loading the side tables named in `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let taxonomy = RelationTaxonomy::from_config(&config.taxonomy)?;
        let num_relations = taxonomy.num_relations();

        let matcher = if config.evaluation.task.uses_equivalence() {
            CategoryMatcher::from_tables(&config.equivalence)
        } else {
            CategoryMatcher::exact()
        };

        let triplets = match (config.dataset.name, config.zero_shot_triplets_path()) {
            (DatasetName::Vg, Some(path)) => Some(TripletTable::load(
                config.train_triplets_path().as_deref(),
                &path,
            )?),
            _ => None,
        };

        let weights = match config.dataset.name {
            DatasetName::Oiv6 => Some(match config.class_weights_path() {
                Some(path) => ClassWeights::load(&path, num_relations)?,
                None => {
                    tracing::warn!(
                        "No dataset.class_weights configured, weighting all {} relations equally",
                        num_relations
                    );
                    ClassWeights::uniform(num_relations)
                }
            }),
            DatasetName::Vg => None,
        };

        tracing::debug!(
            "Evaluator: task={}, mode={}, relations={}, hierarchical={}, zero_shot={}",
            config.evaluation.task,
            config.evaluation.mode,
            num_relations,
            taxonomy.is_hierarchical(),
            triplets.as_ref().map_or(0, TripletTable::zero_shot_len)
        );

        Ok(Self {
            settings: MatchSettings::from_config(&config.evaluation),
            config,
            taxonomy,
            matcher,
            triplets,
            weights,
            running: BTreeMap::new(),
        })
    }

    /// Use an in-memory zero-shot table.
    pub fn with_triplets(mut self, triplets: TripletTable) -> Self {
        self.triplets = Some(triplets);
        self
    }

    /// Enable precision scoring with the given class weights.
    ///
    /// Fails unless there is exactly one weight per relation class.
    pub fn with_class_weights(mut self, weights: ClassWeights) -> Result<Self> {
        let expected = self.taxonomy.num_relations();
        if weights.len() != expected {
            return Err(ConfigError::ValidationError(format!(
                "expected {} class weights, found {}",
                expected,
                weights.len()
            ))
            .into());
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn taxonomy(&self) -> &RelationTaxonomy {
        &self.taxonomy
    }

    /// The configured ranking mode.
    pub fn primary_mode(&self) -> RankingMode {
        RankingMode::from_config(&self.config.evaluation)
    }

    /// Ranking modes to evaluate: the primary one, plus Top-3 when tracked.
    pub fn protocols(&self) -> Vec<RankingMode> {
        let primary = self.primary_mode();
        let mut modes = vec![primary];
        if self.config.evaluation.track_top3
            && self.taxonomy.is_hierarchical()
            && primary != RankingMode::Top3
        {
            modes.push(RankingMode::Top3);
        }
        modes
    }

    /// Start a new, empty window.
    pub fn open_window(&self, mode: RankingMode) -> BatchResult<Window> {
        Window::new(mode, self.taxonomy.clone())
    }

    /// Score `window`, fold it into the running totals and report both.
    pub fn absorb(&mut self, window: &SealedWindow) -> WindowReport {
        let per_class = self.config.evaluation.per_class;
        let mode = window.mode().eval_mode();

        let card = RecallEngine::new(&self.settings, &self.matcher, self.triplets.as_ref())
            .with_label_agnostic(self.config.evaluation.task.uses_equivalence())
            .score(window);
        let precision = self
            .weights
            .as_ref()
            .map(|_| PrecisionEngine::new(&self.settings, &self.matcher).score(window));

        let running = self.running.entry(mode).or_insert_with(|| Running {
            card: ScoreCard::new(&self.settings.top_k, self.taxonomy.num_relations()),
            precision: None,
            windows: 0,
        });
        running.card.merge(&card);
        if let Some(p) = &precision {
            match running.precision.as_mut() {
                Some(total) => total.merge(p),
                None => running.precision = Some(p.clone()),
            }
        }
        running.windows += 1;

        let weights = self.weights.as_ref();
        let metrics = Metrics {
            recall: card.report(per_class),
            precision: precision.as_ref().zip(weights).map(|(p, w)| p.report(w)),
        };
        let total = Metrics {
            recall: running.card.report(per_class),
            precision: running.precision.as_ref().zip(weights).map(|(p, w)| p.report(w)),
        };
        let report = WindowReport {
            mode,
            window: running.windows,
            predictions: window.len(),
            targets: window.targets().len(),
            metrics,
            running: total,
        };
        log_window(&report);
        report
    }

    /// Running metrics of every protocol absorbed so far.
    pub fn summary(&self, per_class: bool) -> Vec<ProtocolSummary> {
        let weights = self.weights.as_ref();
        self.running
            .iter()
            .map(|(&mode, running)| ProtocolSummary {
                mode,
                windows: running.windows,
                metrics: Metrics {
                    recall: running.card.report(per_class),
                    precision: running.precision.as_ref().zip(weights).map(|(p, w)| p.report(w)),
                },
            })
            .collect()
    }

    /// Clear the running totals.
    pub fn reset(&mut self) {
        self.running.clear();
    }
}

fn log_window(report: &WindowReport) {
    let recall = &report.running.recall.recall;
    let line: Vec<String> = recall
        .top_k
        .iter()
        .zip(recall.recall.iter().zip(&recall.mean_recall))
        .map(|(k, (r, m))| format!("R@{k}={r:.4} mR@{k}={m:.4}"))
        .collect();
    tracing::info!(
        "Window {} ({}): {} predictions, {} targets | {}",
        report.window,
        report.mode,
        report.predictions,
        report.targets,
        line.join(" ")
    );
    if let Some(zs) = &report.running.recall.zero_shot {
        if let (Some(k), Some(r)) = (zs.top_k.last(), zs.recall.last()) {
            tracing::info!("  zero-shot R@{k}={r:.4}");
        }
    }
    if let Some(p) = &report.running.precision {
        tracing::info!(
            "  wmAP rel={:.4} phrase={:.4}",
            p.relationship,
            p.phrase
        );
    }
}
