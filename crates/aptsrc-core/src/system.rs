//! Helpers for the distribution's own source file.

use tracing::debug;
use url::Url;

use crate::{
    context::SourcesContext,
    error::{Result, SourceError},
    file::SourceFile,
    source::{Origin, Source},
};

pub const DEFAULT_MIRROR_FIELD: &str = "X-Repolib-Default-Mirror";

/// Loads the system source file named by the context.
pub fn load_system_file(ctx: &SourcesContext) -> Result<SourceFile> {
    let mut file = SourceFile::new(ctx.sources_dir(), ctx.system_ident());
    file.load()?;
    file.mark_origin(Origin::System);
    debug!("loaded system sources from {}", ctx.system_ident());
    Ok(file)
}

fn is_main_candidate(source: &Source) -> bool {
    let name = source.name().to_ascii_lowercase();
    name.contains("system source") || source.extra_field(DEFAULT_MIRROR_FIELD).is_some()
}

fn validate_mirror(mirror: &str) -> Result<()> {
    let url = Url::parse(mirror)
        .map_err(|err| SourceError::SystemSource(format!("invalid mirror `{mirror}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::SystemSource(format!(
            "mirror `{mirror}` must use http or https"
        )));
    }
    Ok(())
}

impl SourceFile {
    /// Key of the main OS source in this file.
    ///
    /// The main source is named "System Source(s)" or carries a default mirror;
    /// anything but exactly one candidate is an error.
    pub fn main_os_source(&self) -> Result<usize> {
        let candidates: Vec<usize> = self
            .sources()
            .filter(|(_, source)| is_main_candidate(source))
            .map(|(key, _)| key)
            .collect();

        match candidates.as_slice() {
            [key] => Ok(*key),
            [] => Err(SourceError::SystemSource(format!(
                "no main OS source in `{}`",
                self.ident()
            ))),
            _ => Err(SourceError::SystemSource(format!(
                "{} candidate main OS sources in `{}`",
                candidates.len(),
                self.ident()
            ))),
        }
    }

    fn main_os_source_mut(&mut self) -> Result<&mut Source> {
        let key = self.main_os_source()?;
        self.source_mut(key)
            .ok_or_else(|| SourceError::SourceNotFound(key.to_string()))
    }

    /// Enables or disables a component of the main OS source.
    ///
    /// The last remaining component can't be disabled.
    pub fn set_component_enabled(&mut self, component: &str, enabled: bool) -> Result<()> {
        let source = self.main_os_source_mut()?;
        let mut components = source.components().to_vec();
        toggle(&mut components, component, enabled, "component")?;
        source.set_components(components);
        Ok(())
    }

    /// Enables or disables a suite of the main OS source.
    ///
    /// The last remaining suite can't be disabled.
    pub fn set_suite_enabled(&mut self, suite: &str, enabled: bool) -> Result<()> {
        let source = self.main_os_source_mut()?;
        let mut suites = source.suites().to_vec();
        toggle(&mut suites, suite, enabled, "suite")?;
        source.set_suites(suites);
        Ok(())
    }

    pub fn default_mirror(&self) -> Result<Option<String>> {
        let key = self.main_os_source()?;
        Ok(self
            .source(key)
            .and_then(|source| source.extra_field(DEFAULT_MIRROR_FIELD))
            .map(str::to_string))
    }

    pub fn set_default_mirror(&mut self, mirror: &str) -> Result<()> {
        validate_mirror(mirror)?;
        let source = self.main_os_source_mut()?;
        source.set_extra_field(DEFAULT_MIRROR_FIELD, mirror);
        Ok(())
    }

    /// Points the main OS source back at its default mirror.
    pub fn reset_to_default_mirror(&mut self) -> Result<()> {
        let mirror = self.default_mirror()?.ok_or_else(|| {
            SourceError::SystemSource(format!("no default mirror set in `{}`", self.ident()))
        })?;
        validate_mirror(&mirror)?;

        let source = self.main_os_source_mut()?;
        source.set_uris([mirror]);
        Ok(())
    }
}

fn toggle(values: &mut Vec<String>, value: &str, enabled: bool, what: &str) -> Result<()> {
    let present = values.iter().any(|v| v == value);
    match (enabled, present) {
        (true, false) => values.push(value.to_string()),
        (false, true) => {
            if values.len() == 1 {
                return Err(SourceError::SystemSource(format!(
                    "cannot disable the last {what} `{value}`"
                )));
            }
            values.retain(|v| v != value);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::error::ErrorKind;

    const SYSTEM: &str = "\
X-Repolib-Name: Pop_OS System Sources
Enabled: yes
Types: deb deb-src
URIs: http://us.archive.ubuntu.com/ubuntu/
Suites: jammy jammy-security jammy-updates
Components: main restricted universe
X-Repolib-ID: system
X-Repolib-Default-Mirror: http://us.archive.ubuntu.com/ubuntu/

X-Repolib-Name: Pop_OS Apps
Enabled: yes
Types: deb
URIs: http://apt.pop-os.org/proprietary
Suites: jammy
Components: main
X-Repolib-ID: pop-apps
";

    fn setup() -> (tempfile::TempDir, SourcesContext) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("system.sources"), SYSTEM).unwrap();
        let ctx = SourcesContext::new(dir.path());
        (dir, ctx)
    }

    #[test]
    fn test_main_os_source() {
        let (_dir, ctx) = setup();
        let file = load_system_file(&ctx).unwrap();
        let key = file.main_os_source().unwrap();
        assert_eq!(file.source(key).unwrap().ident(), "system");
        assert!(file
            .sources()
            .all(|(_, source)| source.origin() == &Origin::System));
    }

    #[test]
    fn test_main_os_source_ambiguous() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("system.sources"),
            "X-Repolib-Name: System Sources\nURIs: http://a\nSuites: a\n\n\
             X-Repolib-Name: More System Sources\nURIs: http://b\nSuites: b\n",
        )
        .unwrap();
        let file = load_system_file(&SourcesContext::new(dir.path())).unwrap();
        assert_eq!(
            file.main_os_source().unwrap_err().kind(),
            ErrorKind::SystemSource
        );
    }

    #[test]
    fn test_toggle_components_and_suites() {
        let (_dir, ctx) = setup();
        let mut file = load_system_file(&ctx).unwrap();

        file.set_component_enabled("multiverse", true).unwrap();
        file.set_component_enabled("restricted", false).unwrap();
        file.set_suite_enabled("jammy-backports", true).unwrap();
        file.set_suite_enabled("jammy-security", false).unwrap();

        let main = file.source(file.main_os_source().unwrap()).unwrap();
        assert_eq!(main.components(), ["main", "universe", "multiverse"]);
        assert_eq!(main.suites(), ["jammy", "jammy-updates", "jammy-backports"]);

        file.save(&ctx).unwrap();
        let reloaded = load_system_file(&ctx).unwrap();
        let main = reloaded.source(reloaded.main_os_source().unwrap()).unwrap();
        assert_eq!(main.components(), ["main", "universe", "multiverse"]);
    }

    #[test]
    fn test_cannot_disable_last_suite() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("system.sources"),
            "X-Repolib-Name: System Sources\nURIs: http://a\nSuites: jammy\nComponents: main\n",
        )
        .unwrap();
        let mut file = load_system_file(&SourcesContext::new(dir.path())).unwrap();
        assert_eq!(
            file.set_suite_enabled("jammy", false).unwrap_err().kind(),
            ErrorKind::SystemSource
        );
        assert_eq!(
            file.set_component_enabled("main", false).unwrap_err().kind(),
            ErrorKind::SystemSource
        );
    }

    #[test]
    fn test_default_mirror() {
        let (_dir, ctx) = setup();
        let mut file = load_system_file(&ctx).unwrap();
        assert_eq!(
            file.default_mirror().unwrap().as_deref(),
            Some("http://us.archive.ubuntu.com/ubuntu/")
        );

        assert_eq!(
            file.set_default_mirror("ftp://mirror.example").unwrap_err().kind(),
            ErrorKind::SystemSource
        );
        assert!(file.set_default_mirror("not a url").is_err());

        file.set_default_mirror("https://mirror.example/ubuntu").unwrap();
        file.reset_to_default_mirror().unwrap();
        let main = file.source(file.main_os_source().unwrap()).unwrap();
        assert_eq!(main.uris(), ["https://mirror.example/ubuntu"]);
    }
}
