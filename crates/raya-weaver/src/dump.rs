//! Call-shape dump
//!
//! Types selected for dumping get their observed methods appended to a TOML
//! file, one section per type, shaped like a configuration entry so it can be
//! edited into a weaving configuration.

use crate::ancestors::AncestorSet;
use crate::matcher::RuleKind;
use crate::names::{MethodSig, TypeName};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends call shapes to the dump file
#[derive(Debug)]
pub struct DumpSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl DumpSink {
    /// Open `path` for appending, creating it if needed
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(path = %path.display(), "call-shape dump opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Dump file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the section for `ty`
    ///
    /// The section is written with a single locked write, so sections of
    /// concurrently woven types never interleave.
    pub fn record(&self, ty: &TypeName, ancestors: &AncestorSet, methods: &[MethodSig]) -> io::Result<()> {
        let section = render(ty, ancestors, methods)?;
        let mut writer = self.writer.lock();
        writer.write_all(section.as_bytes())?;
        writer.flush()
    }
}

fn render(ty: &TypeName, ancestors: &AncestorSet, methods: &[MethodSig]) -> io::Result<String> {
    let mut by_name = toml::Table::new();
    for sig in methods {
        let entry = by_name
            .entry(sig.name.clone())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(descriptors) = entry {
            descriptors.insert(
                sig.descriptor.clone(),
                toml::Value::String(RuleKind::Timer.literal().to_string()),
            );
        }
    }
    let mut root = toml::Table::new();
    root.insert(ty.as_str().to_string(), toml::Value::Table(by_name));
    let body = toml::to_string(&root).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut out = String::new();
    if !ancestors.is_empty() {
        let names: Vec<&str> = ancestors.names().map(TypeName::as_str).collect();
        out.push_str(&format!("# ancestors: {}\n", names.join(", ")));
    }
    out.push_str(&body);
    out.push('\n');
    Ok(out)
}
