use std::path::{Path, PathBuf};

use aptsrc_config::config::{Config, DefaultFormat};

use crate::{
    delegate::{FileKeyStore, KeyStore, PrivilegedWriter, Unprivileged},
    error::Result,
    source::SourceFormat,
};

/// Everything file and registry operations need from the outside world.
pub struct SourcesContext {
    sources_dir: PathBuf,
    system_ident: String,
    default_format: SourceFormat,
    default_suite: String,
    keys: Box<dyn KeyStore>,
    writer: Box<dyn PrivilegedWriter>,
}

impl SourcesContext {
    pub fn new<P: Into<PathBuf>>(sources_dir: P) -> Self {
        let sources_dir = sources_dir.into();
        let keys_dir = sources_dir.join("keyrings");
        Self {
            sources_dir,
            system_ident: aptsrc_config::config::DEFAULT_SYSTEM_SOURCE.to_string(),
            default_format: SourceFormat::Structured,
            default_suite: aptsrc_config::release::FALLBACK_SUITE.to_string(),
            keys: Box::new(FileKeyStore::new(keys_dir)),
            writer: Box::new(Unprivileged),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let default_format = match config.default_format() {
            DefaultFormat::Sources => SourceFormat::Structured,
            DefaultFormat::List => SourceFormat::Legacy,
        };

        Ok(Self {
            sources_dir: config.get_sources_dir()?,
            system_ident: config.system_source().to_string(),
            default_format,
            default_suite: config.default_suite(),
            keys: Box::new(FileKeyStore::new(config.get_keys_dir()?)),
            writer: Box::new(Unprivileged),
        })
    }

    pub fn with_key_store<K: KeyStore + 'static>(mut self, keys: K) -> Self {
        self.keys = Box::new(keys);
        self
    }

    pub fn with_writer<W: PrivilegedWriter + 'static>(mut self, writer: W) -> Self {
        self.writer = Box::new(writer);
        self
    }

    pub fn with_system_ident(mut self, ident: &str) -> Self {
        self.system_ident = ident.to_string();
        self
    }

    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }

    pub fn system_ident(&self) -> &str {
        &self.system_ident
    }

    pub fn default_format(&self) -> SourceFormat {
        self.default_format
    }

    pub fn default_suite(&self) -> &str {
        &self.default_suite
    }

    pub fn keys(&self) -> &dyn KeyStore {
        self.keys.as_ref()
    }

    pub fn writer(&self) -> &dyn PrivilegedWriter {
        self.writer.as_ref()
    }
}
