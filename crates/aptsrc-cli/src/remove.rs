use aptsrc_core::{registry::find_source, Result, SourceError, SourcesContext};
use nu_ansi_term::Color::{Blue, Red};
use tracing::{debug, info};

use crate::utils::Colored;

/// Removes a source. A file left without sources is deleted.
///
/// Sources in the system file are refused.
pub fn remove_source(ctx: &SourcesContext, ident: &str) -> Result<()> {
    let (mut file, key) = find_source(ctx, ident)?;
    if file.ident() == ctx.system_ident() {
        return Err(SourceError::SystemSource(format!(
            "`{ident}` belongs to the system sources and cannot be removed"
        )));
    }
    let removed = file.remove(key, ctx)?;

    if file.is_empty() {
        debug!("{} has no sources left, deleting it", file.ident());
        file.delete(ctx)?;
    } else {
        file.save(ctx)?;
    }

    info!(
        "{} {}",
        Colored(Red, "Removed"),
        Colored(Blue, removed.ident())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use aptsrc_core::ErrorKind;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_remove_keeps_other_sources() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("multi.list");
        fs::write(
            &path,
            "deb http://a.example stable main ## X-Repolib-ID: a\n\
             deb http://b.example stable main ## X-Repolib-ID: b\n",
        )
        .unwrap();
        let ctx = SourcesContext::new(dir.path());

        remove_source(&ctx, "a").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("a.example"));
        assert!(text.contains("b.example"));

        remove_source(&ctx, "b").unwrap();
        assert!(!path.exists());

        assert_eq!(
            remove_source(&ctx, "b").unwrap_err().kind(),
            ErrorKind::SourceNotFound
        );
    }

    #[test]
    fn test_remove_refuses_system_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("system.sources");
        fs::write(
            &path,
            "X-Repolib-Name: System Sources\nX-Repolib-ID: system\nTypes: deb\n\
             URIs: http://archive.example/ubuntu\nSuites: focal\nComponents: main\n",
        )
        .unwrap();
        let ctx = SourcesContext::new(dir.path());
        let before = fs::read_to_string(&path).unwrap();

        let err = remove_source(&ctx, "system").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemSource);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }
}
