//! Result writers: JSON lines and CSV
//!
//! CSV columns are `ID`, `URL`, then one column per captured field (query
//! order), per count reference, per relation and staff position, and the
//! episode and tag columns when the query has such conditions.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{FilterError, Result};
use crate::model::annex::LIST_SEPARATOR;
use crate::query::{Columns, ResultEntry};

/// One `ResultEntry` per line
pub struct JsonlWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        JsonlWriter { out }
    }

    pub fn write(&mut self, entry: &ResultEntry) -> Result<()> {
        serde_json::to_writer(&mut self.out, entry)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Quote a field if it holds a separator, quote or line break
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter().map(u64::to_string).collect::<Vec<_>>().join(LIST_SEPARATOR)
}

pub fn csv_header(columns: &Columns) -> Vec<String> {
    let mut header = vec!["ID".to_string(), "URL".to_string()];
    header.extend(columns.fields.iter().cloned());
    header.extend(columns.counts.iter().map(|c| format!("count:{}", c)));
    header.extend(columns.relations.iter().cloned());
    header.extend(columns.staff.iter().map(|s| format!("staff:{}", s)));
    if columns.episodes {
        header.push("ep".to_string());
    }
    if columns.tags {
        header.push("tag".to_string());
    }
    if columns.meta_tags {
        header.push("meta_tag".to_string());
    }
    header
}

pub fn csv_row(columns: &Columns, entry: &ResultEntry) -> Vec<String> {
    let capture = &entry.capture;
    let mut row = vec![entry.id.to_string(), entry.url.clone()];
    row.extend(columns.fields.iter().map(|f| capture.fields.get(f).cloned().unwrap_or_default()));
    row.extend(
        columns
            .counts
            .iter()
            .map(|c| capture.counts.get(c).map(usize::to_string).unwrap_or_default()),
    );
    row.extend(
        columns
            .relations
            .iter()
            .map(|r| capture.relations.get(r).map(|ids| join_ids(ids)).unwrap_or_default()),
    );
    row.extend(
        columns
            .staff
            .iter()
            .map(|s| capture.staff.get(s).map(|ids| join_ids(ids)).unwrap_or_default()),
    );
    if columns.episodes {
        row.push(join_ids(&capture.episodes));
    }
    if columns.tags {
        row.push(capture.tags.join(LIST_SEPARATOR));
    }
    if columns.meta_tags {
        row.push(capture.meta_tags.join(LIST_SEPARATOR));
    }
    row
}

/// RFC 4180 CSV with a header derived from the query
pub struct CsvWriter<W: Write> {
    out: W,
    columns: Columns,
}

impl<W: Write> CsvWriter<W> {
    /// Writes the header immediately
    pub fn new(out: W, columns: Columns) -> Result<Self> {
        let mut writer = CsvWriter { out, columns };
        let header = csv_header(&writer.columns);
        writer.write_record(&header)?;
        Ok(writer)
    }

    pub fn write(&mut self, entry: &ResultEntry) -> Result<()> {
        let row = csv_row(&self.columns, entry);
        self.write_record(&row)
    }

    fn write_record(&mut self, fields: &[String]) -> Result<()> {
        let line: Vec<Cow<'_, str>> = fields.iter().map(|f| escape(f)).collect();
        self.out.write_all(line.join(",").as_bytes())?;
        self.out.write_all(b"\r\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// The `.jsonlines` and `.csv` output pair
pub struct ReportFiles {
    jsonl: JsonlWriter<BufWriter<File>>,
    csv: CsvWriter<BufWriter<File>>,
    paths: (PathBuf, PathBuf),
    written: usize,
}

fn open_output(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

impl ReportFiles {
    /// Create both files. Existing files are only replaced with `force`.
    pub fn create(jsonl_path: &Path, csv_path: &Path, columns: Columns, force: bool) -> Result<Self> {
        if !force {
            for path in [jsonl_path, csv_path] {
                if path.exists() {
                    return Err(FilterError::OutputExists(path.display().to_string()));
                }
            }
        }
        Ok(ReportFiles {
            jsonl: JsonlWriter::new(open_output(jsonl_path)?),
            csv: CsvWriter::new(open_output(csv_path)?, columns)?,
            paths: (jsonl_path.to_path_buf(), csv_path.to_path_buf()),
            written: 0,
        })
    }

    pub fn write(&mut self, entry: &ResultEntry) -> Result<()> {
        self.jsonl.write(entry)?;
        self.csv.write(entry)?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<usize> {
        self.jsonl.finish()?;
        self.csv.finish()?;
        info!(
            entries = self.written,
            "results written to {} and {}",
            self.paths.0.display(),
            self.paths.1.display()
        );
        Ok(self.written)
    }
}
