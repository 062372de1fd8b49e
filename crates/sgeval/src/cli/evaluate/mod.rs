//! The `sgeval evaluate` command.
//!
//! Reads a JSONL stream of [`BatchRecord`]s. Every record is fed to one
//! window per active protocol; `window_end` (or end of input with pending
//! data) seals the windows, scores them and emits one report per protocol.

mod reader;
pub mod types;

pub use types::{ModeArg, OutputFormat, TaskArg};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use sgeval_core::output::NamedImage;
use sgeval_core::{
    BatchRecord, Config, EdgeBatch, Evaluator, LabelNames, OutputFormat as CoreOutputFormat,
    OutputRecord, OutputWriter, Window,
};

use reader::RecordReader;

/// Arguments for the `evaluate` command.
#[derive(Args, Debug, Default)]
pub struct EvaluateArgs {
    /// JSONL file of batch records
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format (defaults to `[output].format`)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Ranking mode
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Evaluation protocol
    #[arg(short, long, value_enum)]
    pub task: Option<TaskArg>,

    /// Recall cutoffs, e.g. 20,50,100
    #[arg(short = 'k', long, value_delimiter = ',')]
    pub top_k: Option<Vec<usize>>,

    /// Minimum IoU for a box match
    #[arg(long)]
    pub iou_thresh: Option<f32>,

    /// Omit per-class recall vectors from reports
    #[arg(long)]
    pub no_per_class: bool,

    /// Also emit the N most confident triplets per image
    #[arg(long, value_name = "N")]
    pub dump_top_k: Option<usize>,

    /// Keep one triplet per unordered subject/object pair in top-K dumps
    #[arg(long)]
    pub dump_unique: bool,

    /// Object and relation names for top-K dumps
    #[arg(long)]
    pub labels: Option<PathBuf>,
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(args: &EvaluateArgs, config: &mut Config) {
    let eval = &mut config.evaluation;
    if let Some(mode) = args.mode {
        eval.mode = mode.into();
    }
    if let Some(task) = args.task {
        eval.task = task.into();
    }
    if let Some(top_k) = &args.top_k {
        eval.top_k = top_k.clone();
    }
    if let Some(iou_thresh) = args.iou_thresh {
        eval.iou_thresh = iou_thresh;
    }
    if args.no_per_class {
        eval.per_class = false;
    }
    if let Some(n) = args.dump_top_k {
        config.output.top_k_dump = n;
    }
    if args.dump_unique {
        config.output.dump_unique = true;
    }
    if let Some(path) = &args.labels {
        config.dataset.labels = Some(path.to_string_lossy().into_owned());
    }
}

/// Totals of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub records: usize,
    pub windows: usize,
}

/// Open windows, one per protocol, and the evaluator that scores them.
struct Session {
    evaluator: Evaluator,
    windows: Vec<Window>,
    labels: LabelNames,
    dump_top_k: usize,
    dump_unique: bool,
}

impl Session {
    fn new(evaluator: Evaluator, labels: LabelNames) -> anyhow::Result<Self> {
        let windows = evaluator
            .protocols()
            .into_iter()
            .map(|mode| evaluator.open_window(mode))
            .collect::<Result<Vec<_>, _>>()?;
        for window in &windows {
            tracing::debug!("Tracking protocol: {}", window.mode());
        }
        Ok(Self {
            dump_top_k: evaluator.config().output.top_k_dump,
            dump_unique: evaluator.config().output.dump_unique,
            evaluator,
            windows,
            labels,
        })
    }

    fn has_pending(&self) -> bool {
        self.windows
            .iter()
            .any(|w| !w.is_empty() || w.num_targets() > 0)
    }

    fn feed(&mut self, record: BatchRecord) -> anyhow::Result<Vec<OutputRecord>> {
        match record {
            BatchRecord::Edges(edges) => {
                let batch = EdgeBatch::try_from(edges)?;
                for window in &mut self.windows {
                    window.append_edges(&batch)?;
                }
                Ok(Vec::new())
            }
            BatchRecord::Targets(targets) => {
                let triplets = targets.triplets()?;
                for window in &mut self.windows {
                    window.append_targets(targets.image, &triplets)?;
                }
                Ok(Vec::new())
            }
            BatchRecord::WindowEnd => self.close(),
        }
    }

    /// Seal and score every open window, replacing it with an empty one.
    fn close(&mut self) -> anyhow::Result<Vec<OutputRecord>> {
        let mut records = Vec::new();
        for window in &mut self.windows {
            let fresh = self.evaluator.open_window(window.mode())?;
            let sealed = std::mem::replace(window, fresh).seal();
            let report = self.evaluator.absorb(&sealed);

            let dump = (self.dump_top_k > 0).then(|| {
                let images = if self.dump_unique {
                    sealed.unique_top_k(self.dump_top_k)
                } else {
                    sealed.top_k(self.dump_top_k)
                };
                OutputRecord::TopK {
                    mode: report.mode,
                    window: report.window,
                    images: images
                        .iter()
                        .map(|image| NamedImage::describe(image, &self.labels))
                        .collect(),
                }
            });
            records.push(OutputRecord::Window(report));
            records.extend(dump);
        }
        Ok(records)
    }

    fn summary(&self) -> OutputRecord {
        OutputRecord::Summary {
            protocols: self
                .evaluator
                .summary(self.evaluator.config().evaluation.per_class),
        }
    }
}

/// Emit records immediately for JSONL; collect them for a single JSON array.
fn emit<W: Write>(
    writer: &mut OutputWriter<W>,
    pending: &mut Vec<OutputRecord>,
    records: Vec<OutputRecord>,
) -> std::io::Result<()> {
    match writer.format() {
        CoreOutputFormat::JsonLines => {
            for record in &records {
                writer.write(record)?;
            }
            writer.flush()
        }
        CoreOutputFormat::Json => {
            pending.extend(records);
            Ok(())
        }
    }
}

/// Stream `records` through a session and write every report to `writer`.
fn run<I, W>(
    records: I,
    evaluator: Evaluator,
    labels: LabelNames,
    writer: &mut OutputWriter<W>,
    progress: &ProgressBar,
) -> anyhow::Result<RunStats>
where
    I: IntoIterator<Item = anyhow::Result<(usize, BatchRecord)>>,
    W: Write,
{
    let mut session = Session::new(evaluator, labels)?;
    let mut stats = RunStats::default();
    let mut pending = Vec::new();

    for item in records {
        let (line, record) = item?;
        let closes = record == BatchRecord::WindowEnd;
        let out = session
            .feed(record)
            .with_context(|| format!("Rejected batch record on line {line}"))?;
        stats.records += 1;
        progress.inc(1);
        if closes {
            stats.windows += 1;
            progress.set_message(format!("{} window(s)", stats.windows));
        }
        emit(writer, &mut pending, out)?;
    }

    if session.has_pending() {
        tracing::debug!("Input ended with an open window, closing it");
        let out = session.close()?;
        stats.windows += 1;
        emit(writer, &mut pending, out)?;
    }

    let summary = session.summary();
    emit(writer, &mut pending, vec![summary])?;
    if !pending.is_empty() {
        writer.write_all(&pending)?;
    }
    writer.flush()?;
    Ok(stats)
}

/// Execute the evaluate command.
pub fn execute(args: EvaluateArgs, mut config: Config) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!(
            "Input file does not exist: {:?}\n\n  Hint: Check the file path and try again.",
            args.input
        );
    }
    apply_overrides(&args, &mut config);

    let format = match args.format {
        Some(format) => format.into(),
        None => CoreOutputFormat::parse(&config.output.format).with_context(|| {
            format!("Unknown output format in config: {:?}", config.output.format)
        })?,
    };
    let labels = match config.labels_path() {
        Some(path) => LabelNames::load(&path)
            .with_context(|| format!("Failed to load label names from {}", path.display()))?,
        None => LabelNames::default(),
    };
    let pretty = config.output.pretty;

    let evaluator = Evaluator::new(config)?;
    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let records = RecordReader::new(BufReader::new(input));

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = OutputWriter::new(BufWriter::new(sink), format, pretty);

    let progress = create_spinner();
    let start_time = std::time::Instant::now();
    let result = run(records, evaluator, labels, &mut writer, &progress);
    progress.finish_and_clear();
    let stats = result?;

    tracing::info!(
        "Evaluated {} record(s) in {} window(s), wrote {} report(s) in {:.1}s",
        stats.records,
        stats.windows,
        writer.items_written(),
        start_time.elapsed().as_secs_f64()
    );
    if let Some(path) = &args.output {
        tracing::info!("Reports written to {}", path.display());
    }
    Ok(())
}

/// Spinner over records read.
fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} records {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}
