//! Snapshot files for backing up and moving configuration data.
//!
//! A snapshot holds whole aggregates (templates with every version and config
//! tree, tenants and compilations with their overrides) rather than raw
//! table rows, so it can be reviewed and diffed as plain JSON.

use crate::types::{Compilation, Customer, Environment, ProjectTemplate};
use anyhow::Result;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Schema version of the current database.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Export format version (semver).
pub const EXPORT_VERSION: &str = "1.0.0";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: i32,

    pub export_version: String,

    /// RFC 3339 timestamp of export
    pub exported_at: String,

    /// Tool name and version that created this export
    pub exported_by: String,

    #[serde(default)]
    pub templates: Vec<ProjectTemplate>,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub compilations: Vec<Compilation>,
}

impl Snapshot {
    /// Create a new empty snapshot with current metadata.
    pub fn new() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            export_version: EXPORT_VERSION.to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            exported_by: format!("deploy-config-mcp v{}", env!("CARGO_PKG_VERSION")),
            templates: Vec::new(),
            customers: Vec::new(),
            environments: Vec::new(),
            compilations: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a snapshot from a file (plain JSON or gzip).
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.starts_with(&GZIP_MAGIC) {
            let snapshot = serde_json::from_reader(GzDecoder::new(bytes.as_slice()))?;
            Ok(snapshot)
        } else {
            let snapshot = serde_json::from_slice(&bytes)?;
            Ok(snapshot)
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON to `path`, gzip-compressed when `gzip` is set.
    pub fn write_to_file(&self, path: &Path, gzip: bool) -> Result<()> {
        let json = self.to_json_pretty()?;
        let mut writer = BufWriter::new(File::create(path)?);
        if gzip {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            encoder.write_all(json.as_bytes())?;
            encoder.finish()?.flush()?;
        } else {
            writer.write_all(json.as_bytes())?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn is_schema_compatible(&self) -> bool {
        self.schema_version == CURRENT_SCHEMA_VERSION
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
            && self.customers.is_empty()
            && self.environments.is_empty()
            && self.compilations.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a target path asks for gzip output.
pub fn wants_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}
