//! Name-based lookup of codecs and formats.
//!
//! Segments record the name of the codec that wrote them, the postings
//! format `Inline10` delegated to, and for per-field doc values the name of
//! each field's format. Opening a segment resolves those names here; a name
//! with no registration fails the open instead of guessing a format.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;

use crate::codec::block::Block10PostingsFormat;
use crate::codec::inline::Inline10PostingsFormat;
use crate::codec::packed_dv::{Packed10DocValuesFormat, Packed10NormsFormat};
use crate::codec::per_field::PerFieldDocValuesFormat;
use crate::codec::simple_text::{
    SimpleTextDocValuesFormat, SimpleTextNormsFormat, SimpleTextPostingsFormat,
};
use crate::codec::{Codec, DocValuesFormat, PostingsFormat};
use crate::error::{Result, TesseraError};

/// Name of the default, writable codec.
pub const TESSERA10: &str = "Tessera10";

/// Name of the previous codec, kept for reading old segments.
pub const TESSERA09: &str = "Tessera09";

/// Name of the human-readable codec.
pub const SIMPLE_TEXT: &str = "SimpleText";

/// Postings and doc values formats that can be resolved by name.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    postings: RwLock<AHashMap<String, Arc<dyn PostingsFormat>>>,
    doc_values: RwLock<AHashMap<String, Arc<dyn DocValuesFormat>>>,
}

impl FormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format.
    ///
    /// Registers `Block10`, `Inline10` over `Block10` and `SimpleText`
    /// postings, and `Packed10` and `SimpleText` doc values.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let block: Arc<dyn PostingsFormat> = Arc::new(Block10PostingsFormat::new());
        registry.register_postings(Arc::new(Inline10PostingsFormat::new(Arc::clone(&block))));
        registry.register_postings(block);
        registry.register_postings(Arc::new(SimpleTextPostingsFormat::new()));
        registry.register_doc_values(Arc::new(Packed10DocValuesFormat::new()));
        registry.register_doc_values(Arc::new(SimpleTextDocValuesFormat::new()));
        registry
    }

    /// Register a postings format under its own name, replacing any
    /// previous registration.
    pub fn register_postings(&self, format: Arc<dyn PostingsFormat>) {
        self.postings
            .write()
            .insert(format.name().to_string(), format);
    }

    /// Register a doc values format under its own name.
    pub fn register_doc_values(&self, format: Arc<dyn DocValuesFormat>) {
        self.doc_values
            .write()
            .insert(format.name().to_string(), format);
    }

    /// Look up a postings format.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownFormat`] if nothing is registered under `name`.
    pub fn postings_format(&self, name: &str) -> Result<Arc<dyn PostingsFormat>> {
        self.postings
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::unknown_format(format!("postings format {name}")))
    }

    /// Look up a doc values format.
    pub fn doc_values_format(&self, name: &str) -> Result<Arc<dyn DocValuesFormat>> {
        self.doc_values
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::unknown_format(format!("doc values format {name}")))
    }

    /// Registered postings format names, sorted.
    pub fn postings_format_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.postings.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered doc values format names, sorted.
    pub fn doc_values_format_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.doc_values.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Codecs resolvable by name.
#[derive(Debug)]
pub struct CodecRegistry {
    codecs: RwLock<AHashMap<String, Codec>>,
    formats: Arc<FormatRegistry>,
}

impl CodecRegistry {
    /// Create a registry with no codecs over the given formats.
    pub fn new(formats: Arc<FormatRegistry>) -> Self {
        CodecRegistry {
            codecs: RwLock::new(AHashMap::new()),
            formats,
        }
    }

    /// Register a codec, replacing any codec with the same name.
    ///
    /// # Arguments
    ///
    /// * `codec` - The codec; its name is the lookup key
    pub fn register(&self, codec: Codec) {
        debug!("registering codec {codec:?}");
        self.codecs.write().insert(codec.name().to_string(), codec);
    }

    /// Resolve a codec for reading.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedCodec`] if `name` is not registered.
    pub fn for_name(&self, name: &str) -> Result<Codec> {
        self.codecs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TesseraError::unsupported_codec(name))
    }

    /// Resolve a codec for writing new segments.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedCodec`] if `name` is not registered, and
    /// [`TesseraError::InvalidOperation`] if the codec is read-only.
    pub fn for_write(&self, name: &str) -> Result<Codec> {
        let codec = self.for_name(name)?;
        if codec.is_read_only() {
            return Err(TesseraError::invalid_operation(format!(
                "codec {name} can only read existing segments"
            )));
        }
        Ok(codec)
    }

    /// Registered codec names, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.codecs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The formats that per-field doc values resolve against.
    pub fn formats(&self) -> &Arc<FormatRegistry> {
        &self.formats
    }
}

impl Default for CodecRegistry {
    /// The built-in formats and the `Tessera10`, `Tessera09` and
    /// `SimpleText` codecs.
    fn default() -> Self {
        let formats = Arc::new(FormatRegistry::with_defaults());
        let registry = CodecRegistry::new(Arc::clone(&formats));
        registry.register(tessera10_codec(formats));
        registry.register(tessera09_codec());
        registry.register(simple_text_codec());
        registry
    }
}

/// `Inline10(Block10)` postings, per-field doc values defaulting to
/// `Packed10`, and `Packed10` norms. The postings delegate and per-field doc
/// values formats of a segment are resolved through `formats`.
pub fn tessera10_codec(formats: Arc<FormatRegistry>) -> Codec {
    let default_doc_values: Arc<dyn DocValuesFormat> = Arc::new(Packed10DocValuesFormat::new());
    Codec::new(
        TESSERA10,
        Arc::new(Inline10PostingsFormat::with_formats(
            Arc::new(Block10PostingsFormat::new()),
            Arc::clone(&formats),
        )),
        Arc::new(PerFieldDocValuesFormat::new(default_doc_values, formats)),
        Arc::new(Packed10NormsFormat::new()),
    )
}

/// The read-only predecessor of `Tessera10`: no inlining and a single doc
/// values format for every field.
pub fn tessera09_codec() -> Codec {
    Codec::new(
        TESSERA09,
        Arc::new(Block10PostingsFormat::new()),
        Arc::new(Packed10DocValuesFormat::new()),
        Arc::new(Packed10NormsFormat::new()),
    )
    .into_read_only()
}

/// Human-readable files for debugging.
pub fn simple_text_codec() -> Codec {
    Codec::new(
        SIMPLE_TEXT,
        Arc::new(SimpleTextPostingsFormat::new()),
        Arc::new(SimpleTextDocValuesFormat::new()),
        Arc::new(SimpleTextNormsFormat::new()),
    )
}
