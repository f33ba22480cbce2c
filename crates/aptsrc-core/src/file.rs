//! A source file on disk: an ordered mix of sources and free text.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use aptsrc_utils::fs::{ensure_dir_exists, read_to_string, safe_remove, write_atomic};
use tracing::{debug, info};

use crate::{
    context::SourcesContext,
    error::{Result, SourceError},
    source::{
        clean_ident, is_field_line, is_legacy_line, FileRef, Origin, Source, SourceFormat,
        SourceType,
    },
};

/// One entry of a file, in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileItem {
    /// A comment or blank line kept verbatim.
    Text(String),
    /// A source, by its key in [`SourceFile::source`].
    Source(usize),
}

#[derive(Clone, Debug)]
pub struct SourceFile {
    ident: String,
    dir: PathBuf,
    format: Option<SourceFormat>,
    items: Vec<FileItem>,
    sources: BTreeMap<usize, Source>,
    next_key: usize,
}

impl SourceFile {
    /// Binds a file to `dir/ident`, detecting its format from what exists on disk.
    ///
    /// Nothing is read until [`SourceFile::load`].
    pub fn new<P: Into<PathBuf>>(dir: P, ident: &str) -> Self {
        let mut file = Self {
            ident: clean_ident(ident),
            dir: dir.into(),
            format: None,
            items: Vec::new(),
            sources: BTreeMap::new(),
            next_key: 0,
        };
        file.format = file.detect_format();
        file
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Renames the file in memory and re-detects its format.
    ///
    /// When no file exists under the new ident the current format is kept.
    pub fn set_ident(&mut self, ident: &str) {
        self.ident = clean_ident(ident);
        if let Some(format) = self.detect_format() {
            self.format = Some(format);
        }
        self.refresh_owner();
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> Option<SourceFormat> {
        self.format
    }

    pub fn set_format(&mut self, format: Option<SourceFormat>) {
        self.format = format;
        self.refresh_owner();
    }

    pub fn path_for(&self, format: SourceFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.ident, format.extension()))
    }

    /// Path under the current format, if it has one.
    pub fn path(&self) -> Option<PathBuf> {
        self.format.map(|format| self.path_for(format))
    }

    /// Which format exists on disk; `.sources` takes priority over `.list`.
    pub fn detect_format(&self) -> Option<SourceFormat> {
        [SourceFormat::Structured, SourceFormat::Legacy]
            .into_iter()
            .find(|format| self.path_for(*format).is_file())
    }

    pub fn items(&self) -> &[FileItem] {
        &self.items
    }

    /// Sources in file order with their keys.
    pub fn sources(&self) -> impl Iterator<Item = (usize, &Source)> {
        self.items.iter().filter_map(|item| {
            match item {
                FileItem::Source(key) => self.sources.get(key).map(|source| (*key, source)),
                FileItem::Text(_) => None,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn source(&self, key: usize) -> Option<&Source> {
        self.sources.get(&key)
    }

    pub fn source_mut(&mut self, key: usize) -> Option<&mut Source> {
        self.sources.get_mut(&key)
    }

    /// Key of the source with the given ident.
    pub fn find(&self, ident: &str) -> Option<usize> {
        self.sources
            .iter()
            .find(|(_, source)| source.ident() == ident)
            .map(|(key, _)| *key)
    }

    /// Reads the file from disk, replacing the current contents.
    ///
    /// # Errors
    ///
    /// * [`SourceError::FileNotFound`] if neither a `.sources` nor a `.list` file exists.
    /// * [`SourceError::FormatConflict`] if the file mixes both syntaxes.
    /// * Any parse error of an entry; a file is never partially loaded.
    pub fn load(&mut self) -> Result<()> {
        if let Some(format) = self.detect_format() {
            self.format = Some(format);
        }
        let format = self
            .format
            .ok_or_else(|| SourceError::FileNotFound(self.ident.clone()))?;
        let path = self.path_for(format);

        let text = read_to_string(&path).map_err(|err| {
            match err.io_kind() {
                Some(std::io::ErrorKind::NotFound) => SourceError::FileNotFound(self.ident.clone()),
                _ => err.into(),
            }
        })?;

        self.items.clear();
        self.sources.clear();
        self.next_key = 0;

        match format {
            SourceFormat::Legacy => self.parse_legacy(&text, &path)?,
            SourceFormat::Structured => self.parse_structured(&text, &path)?,
        }

        debug!(
            "loaded {} ({} sources, {} lines)",
            path.display(),
            self.sources.len(),
            self.items.len()
        );
        Ok(())
    }

    fn parse_legacy(&mut self, text: &str, path: &Path) -> Result<()> {
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();

            if is_legacy_line(trimmed) {
                match Source::from_legacy_line(trimmed) {
                    Ok(source) => {
                        self.insert(source);
                    }
                    Err(err) if trimmed.starts_with('#') => {
                        debug!("keeping unparseable commented line {}: {err}", idx + 1);
                        self.items.push(FileItem::Text(line.to_string()));
                    }
                    Err(err) => return Err(err),
                }
            } else if !trimmed.starts_with('#') && is_field_line(trimmed) {
                return Err(SourceError::FormatConflict {
                    path: path.to_path_buf(),
                    line_number: idx + 1,
                });
            } else {
                self.items.push(FileItem::Text(line.to_string()));
            }
        }
        Ok(())
    }

    fn parse_structured(&mut self, text: &str, path: &Path) -> Result<()> {
        let mut stanza: Vec<&str> = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            let active_legacy = !line.starts_with([' ', '\t'])
                && !trimmed.starts_with('#')
                && is_legacy_line(trimmed);

            if trimmed.is_empty() {
                self.finish_stanza(&mut stanza)?;
                self.items.push(FileItem::Text(line.to_string()));
            } else if active_legacy {
                return Err(SourceError::FormatConflict {
                    path: path.to_path_buf(),
                    line_number: idx + 1,
                });
            } else if !stanza.is_empty() || is_field_line(line) {
                stanza.push(line);
            } else {
                self.items.push(FileItem::Text(line.to_string()));
            }
        }
        self.finish_stanza(&mut stanza)
    }

    fn finish_stanza(&mut self, stanza: &mut Vec<&str>) -> Result<()> {
        if stanza.is_empty() {
            return Ok(());
        }
        let source = Source::from_structured_block(stanza.as_slice())?;
        stanza.clear();
        self.insert(source);
        Ok(())
    }

    /// Adds a source at the end of the file and returns its key.
    ///
    /// A source without an ident gets `{file ident}-{n}`; a duplicate ident gets
    /// a numeric suffix.
    pub fn add(&mut self, source: Source) -> usize {
        self.insert(source)
    }

    fn insert(&mut self, mut source: Source) -> usize {
        let key = self.next_key;
        self.next_key += 1;

        let base = if source.ident().is_empty() {
            format!("{}-{}", self.ident, key)
        } else {
            source.ident().to_string()
        };
        let mut ident = base.clone();
        let mut n = 0;
        while self.find(&ident).is_some() {
            n += 1;
            ident = format!("{base}-{n}");
        }
        source.set_ident(&ident);
        source.set_file(Some(self.file_ref()));

        self.sources.insert(key, source);
        self.items.push(FileItem::Source(key));
        key
    }

    /// Removes a source, deleting any signing keys installed for it.
    ///
    /// The keys go first; if that fails the file is left untouched.
    pub fn remove(&mut self, key: usize, ctx: &SourcesContext) -> Result<Source> {
        let not_found = || SourceError::SourceNotFound(key.to_string());
        let ident = self.sources.get(&key).ok_or_else(not_found)?.ident().to_string();
        ctx.keys().delete_key(&ident)?;

        let mut source = self.sources.remove(&key).ok_or_else(not_found)?;

        if let Some(pos) = self
            .items
            .iter()
            .position(|item| *item == FileItem::Source(key))
        {
            self.items.remove(pos);
            let blank_at = |items: &[FileItem], idx: usize| {
                matches!(items.get(idx), Some(FileItem::Text(text)) if text.trim().is_empty())
            };
            if blank_at(&self.items, pos) && (pos == 0 || blank_at(&self.items, pos - 1)) {
                self.items.remove(pos);
            }
        }

        source.set_file(None);
        Ok(source)
    }

    /// Renders the whole file in its current format.
    pub fn render(&self) -> Result<String> {
        let format = self
            .format
            .ok_or_else(|| SourceError::NoFormat(self.ident.clone()))?;

        let mut lines: Vec<String> = Vec::new();
        let mut previous_was_stanza = false;

        for item in &self.items {
            match item {
                FileItem::Text(text) => {
                    lines.push(text.clone());
                    previous_was_stanza = false;
                }
                FileItem::Source(key) => {
                    let Some(source) = self.sources.get(key) else {
                        continue;
                    };
                    match format {
                        SourceFormat::Legacy => lines.push(source.to_legacy_line()?),
                        SourceFormat::Structured => {
                            if previous_was_stanza {
                                lines.push(String::new());
                            }
                            lines.push(source.to_structured_block());
                            previous_was_stanza = true;
                        }
                    }
                }
            }
        }

        let mut output = lines.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        Ok(output)
    }

    /// Writes the file, installing keys for PPA sources first.
    ///
    /// Falls back to the context's privileged writer when the direct write is denied.
    pub fn save(&mut self, ctx: &SourcesContext) -> Result<()> {
        let format = self
            .format
            .ok_or_else(|| SourceError::NoFormat(self.ident.clone()))?;

        self.install_ppa_keys(ctx)?;
        let content = self.render()?;
        let path = self.path_for(format);

        write_file(&self.dir, &path, content.as_bytes(), ctx)?;
        info!("Saved {}", path.display());
        Ok(())
    }

    fn install_ppa_keys(&mut self, ctx: &SourcesContext) -> Result<()> {
        for source in self.sources.values_mut() {
            if !matches!(source.origin(), Origin::Ppa { .. }) || source.signed_by().is_some() {
                continue;
            }
            if let Some(material) = ctx.keys().fetch_key_material(source)? {
                let key_path = ctx.keys().install_key(source.ident(), &material)?;
                source.set_signed_by(Some(&key_path.to_string_lossy()));
            }
        }
        Ok(())
    }

    /// Deletes the file from disk under its current format.
    pub fn delete(&self, ctx: &SourcesContext) -> Result<()> {
        let Some(path) = self.path() else {
            return Ok(());
        };
        remove_file(&path, ctx)?;
        info!("Removed {}", path.display());
        Ok(())
    }

    /// Rewrites the file in the opposite format and removes the old file.
    ///
    /// Structured sources carrying both `deb` and `deb-src` become a binary line
    /// plus a `{ident}-src` twin; converting back folds such twins together.
    /// Every source is checked before anything touches the disk.
    pub fn convert_format(&mut self, ctx: &SourcesContext) -> Result<()> {
        let from = self
            .format
            .ok_or_else(|| SourceError::NoFormat(self.ident.clone()))?;
        let to = from.opposite();

        let mut converted = match to {
            SourceFormat::Legacy => self.to_legacy_layout()?,
            SourceFormat::Structured => self.to_structured_layout(),
        };
        converted.set_format(Some(to));
        converted.render()?;

        converted.save(ctx)?;
        remove_file(&self.path_for(from), ctx)?;
        debug!(
            "Converted {} from .{} to .{}",
            self.ident,
            from.extension(),
            to.extension()
        );

        *self = converted;
        Ok(())
    }

    fn empty_like(&self) -> SourceFile {
        SourceFile {
            ident: self.ident.clone(),
            dir: self.dir.clone(),
            format: self.format,
            items: Vec::new(),
            sources: BTreeMap::new(),
            next_key: 0,
        }
    }

    fn to_legacy_layout(&self) -> Result<SourceFile> {
        let mut converted = self.empty_like();
        converted.format = Some(SourceFormat::Legacy);

        for item in &self.items {
            let FileItem::Source(key) = item else {
                if let FileItem::Text(text) = item {
                    converted.items.push(FileItem::Text(text.clone()));
                }
                continue;
            };
            let Some(source) = self.sources.get(key) else {
                continue;
            };

            let conversion_error = |reason: String| {
                SourceError::FormatConversion {
                    ident: source.ident().to_string(),
                    reason,
                }
            };
            if source.uris().len() > 1 {
                return Err(conversion_error("it has more than one URI".into()));
            }
            if source.suites().len() > 1 {
                return Err(conversion_error("it has more than one suite".into()));
            }
            if !source.extra_fields().is_empty() {
                let fields: Vec<&str> = source
                    .extra_fields()
                    .iter()
                    .map(|(field, _)| field.as_str())
                    .collect();
                return Err(conversion_error(format!(
                    "fields not supported by .list files: {}",
                    fields.join(", ")
                )));
            }

            let mut parts = Vec::new();
            if source.types().len() > 1 {
                let mut binary = source.copy(false);
                binary.set_types([SourceType::Binary]);
                parts.push(binary);
                parts.push(source.source_code_twin());
            } else {
                parts.push(source.copy(false));
            }

            for part in parts {
                part.to_legacy_line().map_err(|err| conversion_error(err.to_string()))?;
                converted.insert(part);
            }
        }

        Ok(converted)
    }

    fn to_structured_layout(&self) -> SourceFile {
        let mut merged: BTreeMap<usize, Source> = self.sources.clone();
        let mut dropped: Vec<usize> = Vec::new();

        for (twin_key, twin) in &self.sources {
            if twin.types().len() != 1 || !twin.sourcecode_enabled() {
                continue;
            }
            // Anything the binary can't carry keeps its own `Types: deb-src` stanza.
            let binary = self.sources.iter().find(|(key, candidate)| {
                !dropped.contains(*key)
                    && candidate.types().len() == 1
                    && candidate.has_type(SourceType::Binary)
                    && candidate.is_folded_twin(twin)
                    && !merged.get(*key).is_some_and(Source::sourcecode_enabled)
            });
            let Some((binary_key, _)) = binary else {
                continue;
            };

            if let Some(target) = merged.get_mut(binary_key) {
                target.set_sourcecode_enabled(true);
            }
            debug!("folding {} into its binary source", twin.ident());
            dropped.push(*twin_key);
        }

        let mut converted = self.empty_like();
        converted.format = Some(SourceFormat::Structured);
        for item in &self.items {
            match item {
                FileItem::Text(text) => converted.items.push(FileItem::Text(text.clone())),
                FileItem::Source(key) if dropped.contains(key) => {}
                FileItem::Source(key) => {
                    if let Some(source) = merged.remove(key) {
                        converted.insert(source);
                    }
                }
            }
        }
        converted
    }

    /// Key of a separate `deb-src` entry matching the given binary source.
    pub fn find_twin(&self, key: usize) -> Option<usize> {
        let source = self.sources.get(&key)?;
        self.sources
            .iter()
            .find(|(other_key, other)| {
                **other_key != key
                    && other.types().len() == 1
                    && other.sourcecode_enabled()
                    && other.same_location(source)
            })
            .map(|(other_key, _)| *other_key)
    }

    fn file_ref(&self) -> FileRef {
        FileRef {
            ident: self.ident.clone(),
            format: self.format,
        }
    }

    fn refresh_owner(&mut self) {
        let file_ref = self.file_ref();
        for source in self.sources.values_mut() {
            source.set_file(Some(file_ref.clone()));
        }
    }

    pub(crate) fn mark_origin(&mut self, origin: Origin) {
        for source in self.sources.values_mut() {
            source.set_origin(origin.clone());
        }
    }
}

fn write_file(dir: &Path, path: &Path, content: &[u8], ctx: &SourcesContext) -> Result<()> {
    let result = ensure_dir_exists(dir).and_then(|_| write_atomic(path, content));
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_permission_denied() => {
            debug!("direct write of {} denied, delegating", path.display());
            ctx.writer().write(path, content)
        }
        Err(err) => Err(err.into()),
    }
}

fn remove_file(path: &Path, ctx: &SourcesContext) -> Result<()> {
    match safe_remove(path) {
        Ok(()) => Ok(()),
        Err(err) if err.is_permission_denied() => {
            debug!("direct removal of {} denied, delegating", path.display());
            ctx.writer().remove(path)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{delegate::KeyStore, error::ErrorKind, options::OptionKey};

    const STRUCTURED: &str = "\
# Managed by aptsrc

X-Repolib-Name: Example
X-Repolib-ID: example
Enabled: yes
Types: deb deb-src
URIs: http://archive.example/ubuntu
Suites: focal
Components: main

X-Repolib-ID: other
Enabled: no
Types: deb
URIs: http://other.example/debian
Suites: bookworm
Components: main contrib
";

    const LEGACY: &str = "\
# Third-party repositories
deb http://example.com/ubuntu focal main ## X-Repolib-Name: Example # X-Repolib-ID: example
# deb-src http://example.com/ubuntu focal main ## X-Repolib-Name: Example # X-Repolib-ID: example-src

deb [arch=amd64] http://other.example/debian bookworm main
";

    fn test_ctx(dir: &Path) -> SourcesContext {
        SourcesContext::new(dir)
    }

    #[test]
    fn test_detect_format_priority() {
        let dir = tempdir().unwrap();
        assert_eq!(SourceFile::new(dir.path(), "x").format(), None);

        fs::write(dir.path().join("x.list"), "").unwrap();
        assert_eq!(
            SourceFile::new(dir.path(), "x").format(),
            Some(SourceFormat::Legacy)
        );

        fs::write(dir.path().join("x.sources"), "").unwrap();
        assert_eq!(
            SourceFile::new(dir.path(), "x").format(),
            Some(SourceFormat::Structured)
        );
    }

    #[test]
    fn test_load_structured() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("example.sources"), STRUCTURED).unwrap();

        let mut file = SourceFile::new(dir.path(), "example");
        file.load().unwrap();
        assert_eq!(file.len(), 2);

        let (_, first) = file.sources().next().unwrap();
        assert_eq!(first.ident(), "example");
        assert!(first.has_type(SourceType::Binary));
        assert!(first.sourcecode_enabled());
        assert!(first.enabled());
        assert_eq!(
            first.file(),
            Some(&FileRef {
                ident: "example".into(),
                format: Some(SourceFormat::Structured)
            })
        );

        let other = file.source(file.find("other").unwrap()).unwrap();
        assert!(!other.enabled());
        assert_eq!(other.components(), ["main", "contrib"]);
    }

    #[test]
    fn test_structured_save_preserves_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("example.sources");
        fs::write(&path, STRUCTURED).unwrap();

        let mut file = SourceFile::new(dir.path(), "example");
        file.load().unwrap();
        file.save(&test_ctx(dir.path())).unwrap();

        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.starts_with("# Managed by aptsrc\n\nX-Repolib-Name: Example\n"));
        assert!(saved.contains("Components: main\n\nX-Repolib-Name: other.example-debian"));

        let mut reloaded = SourceFile::new(dir.path(), "example");
        reloaded.load().unwrap();
        let before: Vec<_> = file.sources().map(|(_, s)| s.clone()).collect();
        let after: Vec<_> = reloaded.sources().map(|(_, s)| s.clone()).collect();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.ident(), b.ident());
            assert_eq!(a.types(), b.types());
            assert_eq!(a.enabled(), b.enabled());
            assert_eq!(a.uris(), b.uris());
        }
    }

    #[test]
    fn test_load_legacy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("third.list"), LEGACY).unwrap();

        let mut file = SourceFile::new(dir.path(), "third");
        file.load().unwrap();
        assert_eq!(file.len(), 3);
        assert_eq!(file.items().len(), 5);

        let src = file.source(file.find("example-src").unwrap()).unwrap();
        assert!(!src.enabled());

        // no ident on the line: derived from the file ident and key
        let other = file.source(2).unwrap();
        assert_eq!(other.ident(), "third-2");
        assert_eq!(other.option(OptionKey::Architectures), "amd64");
    }

    #[test]
    fn test_legacy_file_rejects_stanza() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("bad.list"),
            "deb http://example.com focal main\nTypes: deb\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "bad");
        let err = file.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatConflict);
    }

    #[test]
    fn test_structured_file_rejects_legacy_line() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("bad.sources"),
            "Types: deb\nURIs: http://x\nSuites: focal\n\ndeb http://example.com focal main\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "bad");
        assert_eq!(file.load().unwrap_err().kind(), ErrorKind::FormatConflict);
    }

    #[test]
    fn test_structured_file_allows_commented_legacy_line() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("ok.sources"),
            "# deb http://example.com focal main\n\nTypes: deb\nURIs: http://x\nSuites: focal\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "ok");
        file.load().unwrap();
        assert_eq!(file.len(), 1);
        assert_eq!(
            file.items()[0],
            FileItem::Text("# deb http://example.com focal main".into())
        );
    }

    #[test]
    fn test_malformed_file_fails_whole_load() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("bad.list"),
            "deb http://good.example focal main\ndeb http://bad.example\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "bad");
        assert_eq!(file.load().unwrap_err().kind(), ErrorKind::MalformedLine);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let mut file = SourceFile::new(dir.path(), "missing");
        assert_eq!(file.load().unwrap_err().kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_add_assigns_idents() {
        let dir = tempdir().unwrap();
        let mut file = SourceFile::new(dir.path(), "mine");
        file.set_format(Some(SourceFormat::Legacy));

        let k0 = file.add(Source::new());
        let mut named = Source::new();
        named.set_ident("mine-0");
        let k1 = file.add(named);

        assert_eq!(file.source(k0).unwrap().ident(), "mine-0");
        assert_ne!(file.source(k1).unwrap().ident(), "mine-0");
        assert_eq!(file.source(k0).unwrap().file().unwrap().ident, "mine");
    }

    #[test]
    fn test_duplicate_ident_suffix() {
        let dir = tempdir().unwrap();
        let mut file = SourceFile::new(dir.path(), "many");
        file.set_format(Some(SourceFormat::Legacy));
        for _ in 0..5 {
            file.add(Source::new());
        }

        let mut first = Source::new();
        first.set_ident("x");
        let mut second = Source::new();
        second.set_ident("x");
        let mut third = Source::new();
        third.set_ident("x");
        file.add(first);
        let k = file.add(second);
        let k2 = file.add(third);

        assert_eq!(file.source(k).unwrap().ident(), "x-1");
        assert_eq!(file.source(k2).unwrap().ident(), "x-2");
    }

    #[test]
    fn test_save_without_format() {
        let dir = tempdir().unwrap();
        let mut file = SourceFile::new(dir.path(), "nothing");
        file.add(Source::new());
        assert_eq!(
            file.save(&test_ctx(dir.path())).unwrap_err().kind(),
            ErrorKind::NoFormat
        );
    }

    #[test]
    fn test_add_save_remove() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let mut file = SourceFile::new(dir.path(), "new");
        file.set_format(Some(SourceFormat::Structured));

        let mut first = Source::new();
        first.set_uris(["http://a.example"]);
        first.set_suites(["focal"]);
        let k0 = file.add(first);

        let mut second = Source::new();
        second.set_uris(["http://b.example"]);
        second.set_suites(["focal"]);
        file.add(second);
        file.save(&ctx).unwrap();

        let text = fs::read_to_string(dir.path().join("new.sources")).unwrap();
        assert!(text.contains("X-Repolib-ID: new-0\n"));
        assert!(text.contains("\n\nX-Repolib-Name: b.example\n"));

        let removed = file.remove(k0, &ctx).unwrap();
        assert_eq!(removed.ident(), "new-0");
        assert!(removed.file().is_none());
        assert_eq!(file.len(), 1);
        assert_eq!(
            file.remove(k0, &ctx).unwrap_err().kind(),
            ErrorKind::SourceNotFound
        );
    }

    #[test]
    fn test_remove_deletes_keys() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let keys_dir = dir.path().join("keyrings");
        fs::create_dir_all(&keys_dir).unwrap();
        fs::write(keys_dir.join("example.gpg"), b"key").unwrap();
        fs::write(dir.path().join("example.sources"), STRUCTURED).unwrap();

        let mut file = SourceFile::new(dir.path(), "example");
        file.load().unwrap();
        file.remove(file.find("example").unwrap(), &ctx).unwrap();
        assert!(!keys_dir.join("example.gpg").exists());
    }

    struct BrokenKeys;

    impl KeyStore for BrokenKeys {
        fn delete_key(&self, ident: &str) -> Result<()> {
            Err(SourceError::Io {
                action: format!("removing keys for {ident}"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }

        fn fetch_key_material(&self, _source: &Source) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn install_key(&self, ident: &str, _material: &[u8]) -> Result<PathBuf> {
            Ok(PathBuf::from(ident))
        }

        fn find_key(&self, _name: &str) -> Option<PathBuf> {
            None
        }

        fn delete_key_file(&self, _path: &Path) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_remove_keeps_source_when_key_removal_fails() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path()).with_key_store(BrokenKeys);
        fs::write(dir.path().join("example.sources"), STRUCTURED).unwrap();

        let mut file = SourceFile::new(dir.path(), "example");
        file.load().unwrap();
        let before = file.render().unwrap();

        let key = file.find("example").unwrap();
        assert_eq!(file.remove(key, &ctx).unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(file.len(), 2);
        assert!(file.source(key).is_some());
        assert_eq!(file.render().unwrap(), before);
    }

    #[test]
    fn test_set_ident_redetects_format() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.list"), "").unwrap();

        let mut file = SourceFile::new(dir.path(), "a");
        file.set_format(Some(SourceFormat::Structured));
        file.set_ident("b");
        assert_eq!(file.format(), Some(SourceFormat::Legacy));

        file.set_ident("c");
        assert_eq!(file.format(), Some(SourceFormat::Legacy));
    }

    #[test]
    fn test_convert_structured_to_legacy_and_back() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        fs::write(dir.path().join("example.sources"), STRUCTURED).unwrap();

        let mut file = SourceFile::new(dir.path(), "example");
        file.load().unwrap();
        let original: Vec<Source> = file.sources().map(|(_, s)| s.clone()).collect();

        file.convert_format(&ctx).unwrap();
        assert!(!dir.path().join("example.sources").exists());
        let legacy = fs::read_to_string(dir.path().join("example.list")).unwrap();
        assert!(legacy.contains("deb http://archive.example/ubuntu focal main"));
        assert!(legacy.contains("deb-src http://archive.example/ubuntu focal main"));
        assert!(legacy.contains("X-Repolib-ID: example-src"));
        assert!(legacy.contains("# deb http://other.example/debian bookworm main contrib"));

        let mut reloaded = SourceFile::new(dir.path(), "example");
        reloaded.load().unwrap();
        assert_eq!(reloaded.format(), Some(SourceFormat::Legacy));
        assert_eq!(reloaded.len(), 3);

        reloaded.convert_format(&ctx).unwrap();
        assert!(!dir.path().join("example.list").exists());

        let mut back = SourceFile::new(dir.path(), "example");
        back.load().unwrap();
        let restored: Vec<Source> = back.sources().map(|(_, s)| s.clone()).collect();

        assert_eq!(restored.len(), original.len());
        for (a, b) in original.iter().zip(&restored) {
            assert_eq!(a.ident(), b.ident());
            assert_eq!(a.name(), b.name());
            assert_eq!(a.enabled(), b.enabled());
            assert_eq!(a.types(), b.types());
            assert_eq!(a.uris(), b.uris());
            assert_eq!(a.suites(), b.suites());
            assert_eq!(a.components(), b.components());
            assert_eq!(a.options(), b.options());
        }
    }

    #[test]
    fn test_convert_rejects_multiple_uris() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        fs::write(
            dir.path().join("multi.sources"),
            "X-Repolib-ID: multi\nTypes: deb\nURIs: http://a http://b\nSuites: focal\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "multi");
        file.load().unwrap();
        let err = file.convert_format(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatConversion);
        assert!(dir.path().join("multi.sources").exists());
        assert!(!dir.path().join("multi.list").exists());
        assert_eq!(file.format(), Some(SourceFormat::Structured));
    }

    #[test]
    fn test_convert_rejects_extra_fields() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        fs::write(
            dir.path().join("mirror.sources"),
            "X-Repolib-ID: mirror\n\
             X-Repolib-Default-Mirror: http://mirror.example/ubuntu\n\
             X-Custom: kept\n\
             Types: deb\n\
             URIs: http://mirror.example/ubuntu\n\
             Suites: focal\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "mirror");
        file.load().unwrap();
        let err = file.convert_format(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatConversion);
        assert!(err.to_string().contains("X-Repolib-Default-Mirror"));
        assert!(err.to_string().contains("X-Custom"));

        assert!(!dir.path().join("mirror.list").exists());
        let text = fs::read_to_string(dir.path().join("mirror.sources")).unwrap();
        assert!(text.contains("X-Custom: kept"));
    }

    #[test]
    fn test_convert_keeps_disabled_twin_of_enabled_binary() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        fs::write(dir.path().join("example.list"), LEGACY).unwrap();

        let mut file = SourceFile::new(dir.path(), "example");
        file.load().unwrap();
        file.convert_format(&ctx).unwrap();

        assert_eq!(file.len(), 3);
        let example = file.source(file.find("example").unwrap()).unwrap();
        assert!(example.enabled());
        assert!(!example.sourcecode_enabled());

        let twin = file.source(file.find("example-src").unwrap()).unwrap();
        assert!(!twin.enabled());
        assert_eq!(twin.name(), "Example");
        assert!(twin.has_type(SourceType::SourceCode));

        let text = fs::read_to_string(dir.path().join("example.sources")).unwrap();
        assert!(text.contains("X-Repolib-ID: example-src\nEnabled: no\nTypes: deb-src\n"));
    }

    #[test]
    fn test_convert_keeps_twin_with_own_options() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        fs::write(
            dir.path().join("pinned.list"),
            "deb http://x.example focal main ## X-Repolib-Name: X # X-Repolib-ID: x\n\
             deb-src [arch=amd64] http://x.example focal main ## X-Repolib-Name: X Source Code # X-Repolib-ID: x-src\n",
        )
        .unwrap();

        let mut file = SourceFile::new(dir.path(), "pinned");
        file.load().unwrap();
        file.convert_format(&ctx).unwrap();

        assert_eq!(file.len(), 2);
        let twin = file.source(file.find("x-src").unwrap()).unwrap();
        assert_eq!(twin.option(OptionKey::Architectures), "amd64");
        assert!(!file.source(file.find("x").unwrap()).unwrap().sourcecode_enabled());
    }

    #[test]
    fn test_find_twin() {
        let dir = tempdir().unwrap();
        let mut file = SourceFile::new(dir.path(), "t");
        file.set_format(Some(SourceFormat::Legacy));

        let binary = Source::from_legacy_line("deb http://x.example focal main").unwrap();
        let twin = binary.copy(true);
        let b = file.add(binary);
        assert_eq!(file.find_twin(b), None);
        let t = file.add(twin);
        assert_eq!(file.find_twin(b), Some(t));
    }
}
