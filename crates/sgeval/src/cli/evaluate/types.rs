//! CLI enum types for the evaluate command: output format, ranking mode, task.

use clap::ValueEnum;
use sgeval_core::{EvalMode, OutputFormat as CoreOutputFormat, Task};

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON array of records
    Json,
    /// One JSON record per line (streamed)
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Ranking mode.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// One candidate per edge and head
    GraphConstrained,
    /// One candidate per edge carrying all three head predictions
    Top3,
    /// Every relation of every edge above the score floor
    NoGraphConstraint,
}

impl From<ModeArg> for EvalMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::GraphConstrained => EvalMode::GraphConstrained,
            ModeArg::Top3 => EvalMode::Top3,
            ModeArg::NoGraphConstraint => EvalMode::NoGraphConstraint,
        }
    }
}

/// Evaluation protocol.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TaskArg {
    Predcls,
    Sgcls,
    Sgdet,
}

impl From<TaskArg> for Task {
    fn from(task: TaskArg) -> Self {
        match task {
            TaskArg::Predcls => Task::PredCls,
            TaskArg::Sgcls => Task::SgCls,
            TaskArg::Sgdet => Task::SgDet,
        }
    }
}
