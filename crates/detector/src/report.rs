//! Buffered CSV reporting for fix evaluation.
//!
//! One row per snapshot, columns sorted lexicographically and fixed for
//! the whole report, header emitted exactly once globally. Rows are
//! buffered per replay attempt and only flushed on success, so a crashed
//! replay leaves no partial rows behind and a retried one cannot
//! duplicate them.

use crate::error::{DetectorError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

pub(crate) struct CsvReporter {
    header_emitted: bool,
    columns: Option<Vec<String>>,
    buffer: Vec<String>,
    buffer_has_header: bool,
}

impl CsvReporter {
    /// `header_already_written` suppresses the header, for resumed runs
    /// appending to an existing report.
    pub fn new(header_already_written: bool) -> Self {
        Self {
            header_emitted: header_already_written,
            columns: None,
            buffer: Vec::new(),
            buffer_has_header: false,
        }
    }

    /// Drop whatever the previous attempt buffered and start clean.
    pub fn begin_attempt(&mut self) {
        self.buffer.clear();
        self.buffer_has_header = false;
    }

    /// Buffer one data row. The first row ever seen fixes the column set;
    /// later rows must carry exactly the same keys.
    pub fn push_row(&mut self, row: &BTreeMap<String, Value>) -> Result<()> {
        let columns = self
            .columns
            .get_or_insert_with(|| row.keys().cloned().collect());
        if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
            return Err(DetectorError::InvalidState(format!(
                "CSV row keys diverge from established columns {columns:?}"
            )));
        }

        if !self.header_emitted && self.buffer.is_empty() {
            self.buffer.push(columns.join(","));
            self.buffer_has_header = true;
        }
        let line = columns
            .iter()
            .map(|c| csv_field(&row[c]))
            .collect::<Vec<_>>()
            .join(",");
        self.buffer.push(line);
        Ok(())
    }

    /// Discard the current attempt's rows (crash path).
    pub fn abort(&mut self) {
        self.buffer.clear();
        self.buffer_has_header = false;
    }

    /// Flush the current attempt's rows to the caller's line sink. The
    /// sink appends the newline.
    pub fn commit(&mut self, log: &mut dyn FnMut(&str)) {
        for line in &self.buffer {
            log(line);
        }
        if self.buffer_has_header {
            self.header_emitted = true;
        }
        self.buffer.clear();
        self.buffer_has_header = false;
    }
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if s.contains(',') || s.contains('"') || s.contains('\n') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}
