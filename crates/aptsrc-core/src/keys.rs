//! Attaching, inspecting and detaching a source's signing key.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    context::SourcesContext,
    delegate::is_armored,
    error::{ErrorContext, Result, SourceError},
    file::SourceFile,
    registry::list_all_sources,
    source::Source,
};

/// Where a new key for a source comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySpec {
    /// A keyring file anywhere on disk; its contents are installed into the store.
    Path(PathBuf),
    /// An ASCII-armored public key block.
    Ascii(String),
    /// A keyring already in the store, used as-is.
    Name(String),
}

/// What is known about a source's key.
#[derive(Clone, Debug, Default, Serialize)]
pub struct KeyInfo {
    pub ident: String,
    pub signed_by: Option<String>,
    /// The key is embedded in the source instead of referenced by path.
    pub inline: bool,
    /// The key file lives in the key store.
    pub managed: bool,
    pub present: bool,
    pub armored: bool,
    pub size: usize,
    /// Other sources pointing at the same key file.
    pub shared_with: Vec<String>,
}

fn source_at(file: &SourceFile, key: usize) -> Result<&Source> {
    file.source(key)
        .ok_or_else(|| SourceError::SourceNotFound(key.to_string()))
}

/// Idents of sources other than `source` whose `Signed-By` is `path`.
fn key_users(ctx: &SourcesContext, path: &Path, source: &Source) -> Result<Vec<String>> {
    let listing = list_all_sources(ctx, true)?;
    Ok(listing
        .sources
        .iter()
        .filter(|other| other.signed_by().map(Path::new) == Some(path))
        .filter(|other| !(other.ident() == source.ident() && other.file() == source.file()))
        .map(|other| other.ident().to_string())
        .collect())
}

/// Points a source at a new signing key and saves its file.
///
/// Returns the path written to `Signed-By`.
pub fn set_source_key(
    ctx: &SourcesContext,
    file: &mut SourceFile,
    key: usize,
    spec: &KeySpec,
) -> Result<PathBuf> {
    let ident = source_at(file, key)?.ident().to_string();

    let path = match spec {
        KeySpec::Path(path) => {
            let material = fs::read(path)
                .with_context(|| format!("reading key {}", path.display()))?;
            if material.iter().all(u8::is_ascii_whitespace) {
                return Err(SourceError::InvalidKey(format!(
                    "{} is empty",
                    path.display()
                )));
            }
            ctx.keys().install_key(&ident, &material)?
        }
        KeySpec::Ascii(text) => {
            if !is_armored(text.as_bytes()) {
                return Err(SourceError::InvalidKey(
                    "text is not an ASCII-armored public key block".into(),
                ));
            }
            ctx.keys().install_key(&ident, text.as_bytes())?
        }
        KeySpec::Name(name) => ctx.keys().find_key(name).ok_or_else(|| {
            SourceError::InvalidKey(format!("no key named `{name}` in the key store"))
        })?,
    };

    if let Some(source) = file.source_mut(key) {
        source.set_signed_by(Some(&path.to_string_lossy()));
    }
    file.save(ctx)?;

    info!("{ident} is now signed by {}", path.display());
    Ok(path)
}

/// Clears a source's `Signed-By` and saves its file.
///
/// The key file itself is deleted only when it belongs to the key store and no
/// other source uses it. Returns the deleted path.
pub fn remove_source_key(
    ctx: &SourcesContext,
    file: &mut SourceFile,
    key: usize,
) -> Result<Option<PathBuf>> {
    let source = source_at(file, key)?.clone();
    let Some(signed_by) = source.signed_by() else {
        debug!("{} has no key to remove", source.ident());
        return Ok(None);
    };

    let path = (!signed_by.contains('\n')).then(|| PathBuf::from(signed_by));
    if let Some(source) = file.source_mut(key) {
        source.set_signed_by(None);
    }
    file.save(ctx)?;

    let Some(path) = path else {
        return Ok(None);
    };
    let users = key_users(ctx, &path, &source)?;
    if !users.is_empty() {
        debug!("keeping {}, still used by {}", path.display(), users.join(", "));
        return Ok(None);
    }

    Ok(ctx.keys().delete_key_file(&path)?.then_some(path))
}

pub fn key_info(ctx: &SourcesContext, source: &Source) -> Result<KeyInfo> {
    let mut info = KeyInfo {
        ident: source.ident().to_string(),
        signed_by: source.signed_by().map(str::to_string),
        ..KeyInfo::default()
    };

    if let Some(signed_by) = source.signed_by() {
        if signed_by.contains('\n') {
            info.inline = true;
            info.present = true;
            info.armored = is_armored(signed_by.as_bytes());
            info.size = signed_by.len();
            return Ok(info);
        }
        info.present = Path::new(signed_by).is_file();
        info.shared_with = key_users(ctx, Path::new(signed_by), source)?;
    }

    if let Some(material) = ctx.keys().fetch_key_material(source)? {
        info.managed = true;
        info.present = true;
        info.armored = is_armored(&material);
        info.size = material.len();
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{error::ErrorKind, registry::find_source};

    const ARMORED: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQINBF\n-----END PGP PUBLIC KEY BLOCK-----\n";

    fn setup() -> (tempfile::TempDir, SourcesContext) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("example.list"),
            "deb http://example.com/debian bookworm main ## X-Repolib-ID: example\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("other.sources"),
            "X-Repolib-ID: other\nTypes: deb\nURIs: http://other.example\nSuites: focal\n",
        )
        .unwrap();
        let ctx = SourcesContext::new(dir.path());
        (dir, ctx)
    }

    #[test]
    fn test_set_key_from_path() {
        let (dir, ctx) = setup();
        let keyring = dir.path().join("vendor.gpg");
        fs::write(&keyring, b"\x99\x01binary").unwrap();

        let (mut file, key) = find_source(&ctx, "example").unwrap();
        let path = set_source_key(&ctx, &mut file, key, &KeySpec::Path(keyring)).unwrap();

        assert_eq!(path, dir.path().join("keyrings").join("example.gpg"));
        assert_eq!(fs::read(&path).unwrap(), b"\x99\x01binary");
        let text = fs::read_to_string(dir.path().join("example.list")).unwrap();
        assert!(text.contains(&format!("[signed-by={}]", path.display())));
    }

    #[test]
    fn test_set_key_from_ascii() {
        let (dir, ctx) = setup();
        let (mut file, key) = find_source(&ctx, "other").unwrap();

        let err = set_source_key(&ctx, &mut file, key, &KeySpec::Ascii("nonsense".into()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let path = set_source_key(&ctx, &mut file, key, &KeySpec::Ascii(ARMORED.into())).unwrap();
        assert_eq!(path, dir.path().join("keyrings").join("other.asc"));
        let text = fs::read_to_string(dir.path().join("other.sources")).unwrap();
        assert!(text.contains(&format!("Signed-By: {}\n", path.display())));

        let info = key_info(&ctx, file.source(key).unwrap()).unwrap();
        assert!(info.managed);
        assert!(info.armored);
        assert_eq!(info.size, ARMORED.len());
    }

    #[test]
    fn test_set_key_by_name() {
        let (dir, ctx) = setup();
        let (mut file, key) = find_source(&ctx, "example").unwrap();

        let err = set_source_key(&ctx, &mut file, key, &KeySpec::Name("vendor".into()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let vendor = ctx.keys().install_key("vendor", b"key").unwrap();
        let path = set_source_key(&ctx, &mut file, key, &KeySpec::Name("vendor".into())).unwrap();
        assert_eq!(path, vendor);
        assert!(!dir.path().join("keyrings").join("example.gpg").exists());
    }

    #[test]
    fn test_remove_shared_key_keeps_file() {
        let (_dir, ctx) = setup();
        let vendor = ctx.keys().install_key("vendor", b"key").unwrap();

        let (mut example, example_key) = find_source(&ctx, "example").unwrap();
        set_source_key(&ctx, &mut example, example_key, &KeySpec::Name("vendor".into())).unwrap();
        let (mut other, other_key) = find_source(&ctx, "other").unwrap();
        set_source_key(&ctx, &mut other, other_key, &KeySpec::Name("vendor".into())).unwrap();

        let info = key_info(&ctx, example.source(example_key).unwrap()).unwrap();
        assert_eq!(info.shared_with, vec!["other"]);

        assert_eq!(remove_source_key(&ctx, &mut example, example_key).unwrap(), None);
        assert!(vendor.exists());
        assert!(example.source(example_key).unwrap().signed_by().is_none());

        assert_eq!(
            remove_source_key(&ctx, &mut other, other_key).unwrap(),
            Some(vendor.clone())
        );
        assert!(!vendor.exists());
        let text = fs::read_to_string(other.path().unwrap()).unwrap();
        assert!(!text.contains("Signed-By"));
    }

    #[test]
    fn test_remove_outside_key_is_left_alone() {
        let (dir, ctx) = setup();
        let outside = dir.path().join("system-key.gpg");
        fs::write(&outside, b"key").unwrap();

        let (mut file, key) = find_source(&ctx, "other").unwrap();
        if let Some(source) = file.source_mut(key) {
            source.set_signed_by(Some(&outside.to_string_lossy()));
        }
        file.save(&ctx).unwrap();

        let info = key_info(&ctx, file.source(key).unwrap()).unwrap();
        assert!(info.present);
        assert!(!info.managed);

        assert_eq!(remove_source_key(&ctx, &mut file, key).unwrap(), None);
        assert!(outside.exists());
        assert_eq!(remove_source_key(&ctx, &mut file, key).unwrap(), None);
    }
}
