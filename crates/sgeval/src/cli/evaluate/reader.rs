//! Line-numbered reader over a JSONL stream of batch records.

use std::io::BufRead;

use anyhow::Context;
use sgeval_core::BatchRecord;

/// Yields `(line_number, record)` pairs, skipping blank lines.
///
/// Malformed lines are reported with their 1-based line number.
pub struct RecordReader<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = anyhow::Result<(usize, BatchRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = self.lines.next()?;
            self.line += 1;
            let line = self.line;
            let text = match text.with_context(|| format!("Failed to read line {line}")) {
                Ok(text) => text,
                Err(e) => return Some(Err(e)),
            };
            if text.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&text)
                    .map(|record| (line, record))
                    .with_context(|| format!("Malformed batch record on line {line}")),
            );
        }
    }
}
