//! Report serialization to JSON and JSONL.
//!
//! [`OutputWriter`] writes any serializable item. [`OutputRecord`] is the
//! tagged envelope the CLI emits: one record per absorbed window, optional
//! top-K dumps, and a final summary. NaN metrics serialize as `null`.

use serde::Serialize;
use std::io::{self, Write};

use crate::config::EvalMode;
use crate::evaluator::{ProtocolSummary, WindowReport};
use crate::labels::LabelNames;
use crate::ranking::{ImageTriplets, RankedTriplet};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single JSON document (records collected into an array)
    Json,
    /// One JSON object per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// A ranked triplet with its human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedTriplet {
    #[serde(flatten)]
    pub triplet: RankedTriplet,
    pub description: String,
}

/// Top-K triplets of one image, with names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedImage {
    pub image: usize,
    pub triplets: Vec<NamedTriplet>,
}

impl NamedImage {
    pub fn describe(image: &ImageTriplets, labels: &LabelNames) -> Self {
        Self {
            image: image.image,
            triplets: image
                .triplets
                .iter()
                .map(|t| NamedTriplet {
                    triplet: *t,
                    description: labels.describe(t),
                })
                .collect(),
        }
    }
}

/// One line of evaluation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputRecord {
    Window(WindowReport),
    TopK {
        mode: EvalMode,
        window: usize,
        images: Vec<NamedImage>,
    },
    Summary {
        protocols: Vec<ProtocolSummary>,
    },
}

/// A writer that serializes items to JSON or JSONL format.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a new output writer.
    ///
    /// `pretty` only affects the JSON format.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            items_written: 0,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write a single item.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json if self.pretty => {
                serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
            }
            // JSONL is never pretty-printed
            _ => serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?,
        }
        writeln!(self.writer)?;
        self.items_written += 1;
        Ok(())
    }

    /// Write multiple items.
    ///
    /// For JSON format, writes one array. For JSONL, one object per line.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, items)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, items).map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
                self.items_written += items.len();
            }
            OutputFormat::JsonLines => {
                for item in items {
                    self.write(item)?;
                }
            }
        }
        Ok(())
    }

    pub fn items_written(&self) -> usize {
        self.items_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Serialize an item to a JSON string.
pub fn to_json<T: Serialize>(item: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(item)
    } else {
        serde_json::to_string(item)
    }
}

/// Serialize items to JSONL.
pub fn to_jsonl<T: Serialize>(items: &[T]) -> Result<String, serde_json::Error> {
    let mut output = String::new();
    for item in items {
        output.push_str(&serde_json::to_string(item)?);
        output.push('\n');
    }
    Ok(output)
}
