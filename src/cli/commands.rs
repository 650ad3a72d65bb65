//! Command implementations for the Tessera CLI.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::codec::registry::CodecRegistry;
use crate::codec::segment::SegmentInfo;
use crate::error::{Result, TesseraError};
use crate::index::check::check_index;
use crate::index::commit::CommitPoint;
use crate::index::document::Document;
use crate::index::reader::IndexReader;
use crate::index::writer::{SegmentWriter, SegmentWriterConfig};
use crate::search::evaluator::{Evaluator, PhraseEvaluator, TermEvaluator};
use crate::storage::Storage;
use crate::storage::file::{FileStorage, FileStorageConfig};

/// Execute a CLI command.
pub fn execute_command(args: TesseraArgs) -> Result<()> {
    let registry = CodecRegistry::default();
    match &args.command {
        Command::Check(path) => check(path, &registry, &args),
        Command::Segments(path) => list_segments(path, &args),
        Command::Codecs => list_codecs(&registry, &args),
        Command::Add(add_args) => add_documents(add_args, registry, &args),
        Command::Search(search_args) => search(search_args, &registry, &args),
    }
}

fn open_storage(path: &Path) -> Result<Arc<dyn Storage>> {
    if !path.is_dir() {
        return Err(TesseraError::invalid_argument(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(Arc::new(FileStorage::new(FileStorageConfig::new(path))?))
}

/// Verify an index.
fn check(path: &IndexPathArgs, registry: &CodecRegistry, cli_args: &TesseraArgs) -> Result<()> {
    let storage = open_storage(&path.index_path)?;
    let report = check_index(storage, registry)?;
    output_result("Index check", &report, cli_args)?;
    if report.is_clean() {
        Ok(())
    } else {
        Err(TesseraError::corrupt(
            path.index_path.display().to_string(),
            "index check found problems",
        ))
    }
}

/// List the segments of the latest commit.
fn list_segments(path: &IndexPathArgs, cli_args: &TesseraArgs) -> Result<()> {
    let storage = open_storage(&path.index_path)?;
    let Some(commit) = CommitPoint::read_latest(storage.as_ref())? else {
        let listing = SegmentListing {
            generation: None,
            total_docs: 0,
            segments: Vec::new(),
        };
        return output_result("Segments", &listing, cli_args);
    };

    let mut segments = Vec::with_capacity(commit.segments.len());
    for segment in &commit.segments {
        let info = SegmentInfo::read(storage.as_ref(), &segment.name, &segment.id)?;
        let mut size_bytes = 0;
        for file in &info.files {
            size_bytes += storage.file_size(file)?;
        }
        segments.push(SegmentSummary {
            name: info.name,
            codec: info.codec,
            max_doc: info.max_doc,
            size_bytes,
            files: info.files.into_iter().collect(),
        });
    }

    let listing = SegmentListing {
        generation: Some(commit.generation),
        total_docs: commit.max_doc(),
        segments,
    };
    output_result("Segments", &listing, cli_args)
}

/// List registered codecs.
fn list_codecs(registry: &CodecRegistry, cli_args: &TesseraArgs) -> Result<()> {
    let mut codecs = Vec::new();
    for name in registry.available() {
        let codec = registry.for_name(&name)?;
        codecs.push(CodecSummary {
            name,
            read_only: codec.is_read_only(),
            postings: codec.postings_format().name().to_string(),
            doc_values: codec.doc_values_format().name().to_string(),
            norms: codec.norms_format().name().to_string(),
        });
    }
    let listing = CodecListing {
        codecs,
        postings_formats: registry.formats().postings_format_names(),
        doc_values_formats: registry.formats().doc_values_format_names(),
    };
    output_result("Codecs", &listing, cli_args)
}

/// Add documents from a JSON Lines file as one new segment.
fn add_documents(args: &AddArgs, registry: CodecRegistry, cli_args: &TesseraArgs) -> Result<()> {
    let start_time = Instant::now();
    fs::create_dir_all(&args.index_path)?;
    let storage = open_storage(&args.index_path)?;
    let config = SegmentWriterConfig {
        codec: args.codec.clone(),
        packed_page_size: args.packed_page_size,
        ..SegmentWriterConfig::default()
    };
    let mut writer = SegmentWriter::open(storage, Arc::new(registry), config)?;

    let reader = BufReader::new(File::open(&args.document_file)?);
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line).map_err(|e| {
            TesseraError::invalid_argument(format!(
                "{} line {}: {e}",
                args.document_file.display(),
                line_num + 1
            ))
        })?;
        if let Err(e) = writer.add_document(doc) {
            writer.rollback()?;
            return Err(e);
        }
    }

    let documents_added = writer.pending_docs();
    let segment = writer.commit()?.map(|info| info.name);
    let generation = writer.commit_point().generation;
    writer.close()?;
    info!("added {documents_added} documents to {}", args.index_path.display());

    let result = AddResult {
        segment,
        documents_added,
        generation,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    output_result("Documents added", &result, cli_args)
}

/// Search for a term, or for a phrase when several terms are given.
fn search(args: &SearchArgs, registry: &CodecRegistry, cli_args: &TesseraArgs) -> Result<()> {
    let start_time = Instant::now();
    let storage = open_storage(&args.index_path)?;
    let reader = IndexReader::open(storage, registry)?;

    let evaluator: Box<dyn Evaluator> = match args.terms.as_slice() {
        [term] => Box::new(TermEvaluator::new(args.field.as_str(), term.as_str())),
        terms => Box::new(PhraseEvaluator::new(
            args.field.as_str(),
            terms.iter().map(String::as_str),
        )),
    };
    debug!("evaluating {}", evaluator.description());

    let docs = reader.search(evaluator.as_ref())?;
    let result = SearchResults {
        query: evaluator.description(),
        total_hits: docs.len(),
        docs: docs.into_iter().take(args.limit).collect(),
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    output_result("Search results", &result, cli_args)
}
