//! System-wide view over every source file.
//!
//! Nothing is cached: each call rescans the sources directory.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::PathBuf,
};

use fast_glob::glob_match;
use tracing::{debug, warn};

use crate::{
    context::SourcesContext,
    error::{ErrorContext, Result, SourceError},
    file::SourceFile,
    source::{Source, SourceFormat, SourceType},
    system::load_system_file,
};

const SOURCE_FILE_PATTERN: &str = "*.{list,sources}";

/// Files found on the system, plus the ones that failed to load.
#[derive(Debug, Default)]
pub struct FileListing {
    pub files: Vec<SourceFile>,
    pub errors: BTreeMap<PathBuf, SourceError>,
}

/// Sources found on the system, plus the files that failed to load.
#[derive(Debug, Default)]
pub struct SourceListing {
    pub sources: Vec<Source>,
    pub errors: BTreeMap<PathBuf, SourceError>,
}

/// Loads every `.list` and `.sources` file in the sources directory.
///
/// A file that fails to parse is recorded in [`FileListing::errors`] and the scan
/// goes on. The system file is skipped in the scan and, when `include_system`
/// is set, placed first.
pub fn list_all_files(ctx: &SourcesContext, include_system: bool) -> Result<FileListing> {
    let mut listing = FileListing::default();

    if include_system {
        let system = SourceFile::new(ctx.sources_dir(), ctx.system_ident());
        if system.format().is_some() {
            match load_system_file(ctx) {
                Ok(file) => listing.files.push(file),
                Err(err) => record_failure(&mut listing.errors, &system, err),
            }
        } else {
            debug!("no system source file in {}", ctx.sources_dir().display());
        }
    }

    for ident in scan_idents(ctx)? {
        if ident == ctx.system_ident() {
            continue;
        }

        let mut file = SourceFile::new(ctx.sources_dir(), &ident);
        match file.load() {
            Ok(()) => listing.files.push(file),
            Err(err) => record_failure(&mut listing.errors, &file, err),
        }
    }

    Ok(listing)
}

fn record_failure(errors: &mut BTreeMap<PathBuf, SourceError>, file: &SourceFile, err: SourceError) {
    let path = file
        .path()
        .unwrap_or_else(|| file.dir().join(file.ident()));
    warn!("skipping {}: {err}", path.display());
    errors.insert(path, err);
}

/// File stems in the sources directory with a recognised extension, sorted.
fn scan_idents(ctx: &SourcesContext) -> Result<BTreeSet<String>> {
    let dir = ctx.sources_dir();
    let mut idents = BTreeSet::new();

    if !dir.is_dir() {
        debug!("sources directory {} does not exist", dir.display());
        return Ok(idents);
    }

    let entries =
        fs::read_dir(dir).with_context(|| format!("reading sources directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();

        if !path.is_file() || !glob_match(SOURCE_FILE_PATTERN, &file_name) {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            let stem = stem.to_string_lossy().into_owned();
            if !idents.insert(stem.clone()) {
                warn!("{stem} exists as both .list and .sources; using .sources");
            }
        }
    }

    Ok(idents)
}

/// Every complete source on the system, in file order.
///
/// Entries missing a URI or a suite are left out.
pub fn list_all_sources(ctx: &SourcesContext, include_system: bool) -> Result<SourceListing> {
    let FileListing { files, errors } = list_all_files(ctx, include_system)?;

    let sources = files
        .iter()
        .flat_map(|file| file.sources().map(|(_, source)| source.clone()))
        .filter(|source| !source.uris().is_empty() && !source.suites().is_empty())
        .collect();

    Ok(SourceListing { sources, errors })
}

/// The file holding the source with `ident`, and the source's key in it.
///
/// The system file is searched first; the first match wins.
pub fn find_source(ctx: &SourcesContext, ident: &str) -> Result<(SourceFile, usize)> {
    let listing = list_all_files(ctx, true)?;
    listing
        .files
        .into_iter()
        .find_map(|file| file.find(ident).map(|key| (file, key)))
        .ok_or_else(|| SourceError::SourceNotFound(ident.to_string()))
}

/// Loads the file with the given ident.
pub fn find_file(ctx: &SourcesContext, ident: &str) -> Result<SourceFile> {
    let mut file = SourceFile::new(ctx.sources_dir(), ident);
    if file.format().is_none() {
        return Err(SourceError::FileNotFound(ident.to_string()));
    }
    if file.ident() == ctx.system_ident() {
        return load_system_file(ctx);
    }
    file.load()?;
    Ok(file)
}

/// The source providing source code for `source`, if any.
///
/// For structured files that is the source itself when it lists `deb-src`.
/// For legacy files it is a separate `deb-src` entry anywhere on the system with
/// the same URIs, suites and components.
pub fn find_source_code_counterpart(ctx: &SourcesContext, source: &Source) -> Result<Option<Source>> {
    let format = source.file().and_then(|file| file.format);

    if format == Some(SourceFormat::Structured) {
        return Ok(source.sourcecode_enabled().then(|| source.clone()));
    }

    let listing = list_all_sources(ctx, true)?;
    Ok(listing.sources.into_iter().find(|candidate| {
        candidate.types().len() == 1
            && candidate.has_type(SourceType::SourceCode)
            && candidate.same_location(source)
            && !(candidate.ident() == source.ident() && candidate.file() == source.file())
    }))
}

/// Turns source code on or off for a source in `file`.
///
/// Structured files toggle `deb-src` on the source itself. Legacy files use a
/// separate `deb-src` twin: first one in `file`, then one anywhere on the
/// system, and only when neither exists is a new `{ident}-src` added to `file`.
/// `file` is not saved; a twin living in another file is saved in place.
pub fn set_source_code_enabled(
    ctx: &SourcesContext,
    file: &mut SourceFile,
    key: usize,
    enabled: bool,
) -> Result<()> {
    let source = file
        .source(key)
        .cloned()
        .ok_or_else(|| SourceError::SourceNotFound(key.to_string()))?;

    if file.format() == Some(SourceFormat::Structured) {
        if let Some(source) = file.source_mut(key) {
            source.set_sourcecode_enabled(enabled);
        }
        return Ok(());
    }

    if let Some(twin_key) = file.find_twin(key) {
        if let Some(twin) = file.source_mut(twin_key) {
            twin.set_enabled(enabled);
        }
        return Ok(());
    }

    if let Some(counterpart) = find_source_code_counterpart(ctx, &source)? {
        if let Some(owner) = counterpart.file().filter(|owner| owner.ident != file.ident()) {
            let mut other = find_file(ctx, &owner.ident)?;
            let twin_key = other
                .find(counterpart.ident())
                .ok_or_else(|| SourceError::SourceNotFound(counterpart.ident().to_string()))?;
            if let Some(twin) = other.source_mut(twin_key) {
                twin.set_enabled(enabled);
            }
            debug!("toggling source code twin {} in {}", counterpart.ident(), owner.ident);
            return other.save(ctx);
        }
    }

    if enabled {
        let mut twin = source.source_code_twin();
        twin.set_enabled(true);
        debug!("adding source code twin {}", twin.ident());
        file.add(twin);
    }

    Ok(())
}
