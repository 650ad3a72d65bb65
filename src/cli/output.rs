//! Output formatting for CLI commands.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TesseraArgs};
use crate::error::Result;
use crate::index::check::CheckReport;

/// A result that knows how to print itself for people.
pub trait HumanOutput {
    fn write_human(&self, out: &mut dyn Write) -> Result<()>;
}

/// One segment of a segment listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub name: String,
    pub codec: String,
    pub max_doc: u32,
    pub size_bytes: u64,
    pub files: Vec<String>,
}

/// Result of the `segments` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentListing {
    pub generation: Option<u64>,
    pub total_docs: u64,
    pub segments: Vec<SegmentSummary>,
}

/// One registered codec.
#[derive(Debug, Serialize, Deserialize)]
pub struct CodecSummary {
    pub name: String,
    pub read_only: bool,
    pub postings: String,
    pub doc_values: String,
    pub norms: String,
}

/// Result of the `codecs` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CodecListing {
    pub codecs: Vec<CodecSummary>,
    pub postings_formats: Vec<String>,
    pub doc_values_formats: Vec<String>,
}

/// Result of the `add` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddResult {
    pub segment: Option<String>,
    pub documents_added: u32,
    pub generation: u64,
    pub duration_ms: u64,
}

/// Result of the `search` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub total_hits: usize,
    pub docs: Vec<u64>,
    pub duration_ms: u64,
}

/// Output a result in the requested format.
pub fn output_result<T>(message: &str, result: &T, args: &TesseraArgs) -> Result<()>
where
    T: Serialize + HumanOutput,
{
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 1 {
                writeln!(out, "{message}")?;
                writeln!(out)?;
            }
            result.write_human(&mut out)
        }
        OutputFormat::Json => write_json(result, args.pretty, &mut out),
    }
}

fn write_json<T: Serialize>(result: &T, pretty: bool, out: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    writeln!(out, "{json}")?;
    Ok(())
}

impl HumanOutput for CheckReport {
    fn write_human(&self, out: &mut dyn Write) -> Result<()> {
        let Some(commit_file) = &self.commit_file else {
            writeln!(out, "No commit found: index is empty")?;
            return Ok(());
        };
        if let Some(error) = &self.commit_error {
            writeln!(out, "{commit_file}: BROKEN")?;
            writeln!(out, "  {error}")?;
            return Ok(());
        }
        writeln!(out, "{commit_file}: {} segments", self.segments.len())?;
        for segment in &self.segments {
            let state = if segment.ok { "OK" } else { "BROKEN" };
            writeln!(
                out,
                "  {} [{}] {} docs: {state}",
                segment.name, segment.codec, segment.max_doc
            )?;
            for file in &segment.files {
                if let Some(error) = &file.error {
                    writeln!(out, "    {}: {error}", file.name)?;
                }
            }
            if let Some(error) = &segment.error
                && segment.files.iter().all(|f| f.error.is_none())
            {
                writeln!(out, "    {error}")?;
            }
        }
        let broken = self.broken_segments().count();
        if broken == 0 {
            writeln!(out, "No problems found ({} docs)", self.total_docs)?;
        } else {
            writeln!(out, "{broken} broken segment(s)")?;
        }
        Ok(())
    }
}

impl HumanOutput for SegmentListing {
    fn write_human(&self, out: &mut dyn Write) -> Result<()> {
        let Some(generation) = self.generation else {
            writeln!(out, "No commit found: index is empty")?;
            return Ok(());
        };
        writeln!(
            out,
            "Generation {generation}: {} segments, {} docs",
            self.segments.len(),
            self.total_docs
        )?;
        for segment in &self.segments {
            writeln!(
                out,
                "  {:<8} {:<12} {:>10} docs {:>10}",
                segment.name,
                segment.codec,
                segment.max_doc,
                format_bytes(segment.size_bytes)
            )?;
            for file in &segment.files {
                writeln!(out, "      {file}")?;
            }
        }
        Ok(())
    }
}

impl HumanOutput for CodecListing {
    fn write_human(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Codecs:")?;
        for codec in &self.codecs {
            let read_only = if codec.read_only { " (read-only)" } else { "" };
            writeln!(out, "  {}{read_only}", codec.name)?;
            writeln!(out, "    postings:   {}", codec.postings)?;
            writeln!(out, "    doc values: {}", codec.doc_values)?;
            writeln!(out, "    norms:      {}", codec.norms)?;
        }
        writeln!(out, "Postings formats: {}", self.postings_formats.join(", "))?;
        writeln!(
            out,
            "Doc values formats: {}",
            self.doc_values_formats.join(", ")
        )?;
        Ok(())
    }
}

impl HumanOutput for AddResult {
    fn write_human(&self, out: &mut dyn Write) -> Result<()> {
        match &self.segment {
            Some(segment) => writeln!(
                out,
                "Added {} documents as segment {segment} (generation {}) in {}ms",
                self.documents_added, self.generation, self.duration_ms
            )?,
            None => writeln!(out, "No documents to add")?,
        }
        Ok(())
    }
}

impl HumanOutput for SearchResults {
    fn write_human(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Query: {}", self.query)?;
        let docs: Vec<String> = self.docs.iter().map(u64::to_string).collect();
        writeln!(out, "Documents: {}", docs.join(" "))?;
        writeln!(
            out,
            "Total hits: {} ({}ms)",
            self.total_hits, self.duration_ms
        )?;
        Ok(())
    }
}

/// Format bytes in human-readable format.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::check::{FileStatus, SegmentStatus};

    fn render<T: HumanOutput>(value: &T) -> String {
        let mut out = Vec::new();
        value.write_human(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
    }

    #[test]
    fn test_check_report_human() {
        let report = CheckReport {
            generation: Some(2),
            commit_file: Some("segments_2".to_string()),
            commit_error: None,
            segments: vec![SegmentStatus {
                name: "_1".to_string(),
                codec: "Tessera10".to_string(),
                max_doc: 4,
                files: vec![FileStatus {
                    name: "_1.doc".to_string(),
                    checksum: None,
                    error: Some("file is missing".to_string()),
                }],
                ok: false,
                error: Some("_1.doc: file is missing".to_string()),
            }],
            total_docs: 0,
        };
        let text = render(&report);
        assert!(text.contains("_1 [Tessera10] 4 docs: BROKEN"));
        assert!(text.contains("_1.doc: file is missing"));
        assert!(text.ends_with("1 broken segment(s)\n"));
    }

    #[test]
    fn test_empty_listing() {
        let listing = SegmentListing {
            generation: None,
            total_docs: 0,
            segments: Vec::new(),
        };
        assert_eq!(render(&listing), "No commit found: index is empty\n");
    }

    #[test]
    fn test_json_output() {
        let result = SearchResults {
            query: "body:fox".to_string(),
            total_hits: 2,
            docs: vec![1, 5],
            duration_ms: 0,
        };
        let mut out = Vec::new();
        write_json(&result, false, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["docs"], serde_json::json!([1, 5]));
        assert_eq!(value["total_hits"], 2);
    }
}
