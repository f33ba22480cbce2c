use tracing::debug;
use url::Url;

use super::{clean_ident, legacy::is_legacy_line, Origin, Source};
use crate::error::{Result, SourceError};

pub const PPA_BASE_URI: &str = "http://ppa.launchpadcontent.net";
pub const PPA_COMPONENT: &str = "main";

fn valid_ppa_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '+'))
}

impl Source {
    /// Builds a source from a `ppa:owner/name` shortcut.
    ///
    /// No network access happens here; the signing key is installed later
    /// through the key store when the owning file is saved.
    pub fn from_ppa_shortcut(shortcut: &str, suite: &str) -> Result<Source> {
        let invalid = || SourceError::InvalidShortcut(shortcut.to_string());

        let (owner, name) = shortcut
            .trim()
            .strip_prefix("ppa:")
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(invalid)?;
        if !valid_ppa_part(owner) || !valid_ppa_part(name) || suite.trim().is_empty() {
            return Err(invalid());
        }

        let mut source = Source::new();
        source.set_ident(&format!("ppa-{owner}-{name}"));
        source.set_name(&format!("ppa:{owner}/{name}"));
        source.set_uris([format!("{PPA_BASE_URI}/{owner}/{name}/ubuntu")]);
        source.set_suites([suite]);
        source.set_components([PPA_COMPONENT]);
        source.set_origin(Origin::Ppa {
            owner: owner.to_string(),
            name: name.to_string(),
        });

        Ok(source)
    }

    /// Resolves user input into a source.
    ///
    /// Accepts a full one-line entry, a `ppa:` shortcut, or an `http(s)` URI
    /// optionally followed by a suite and components. Missing suites fall back
    /// to `default_suite`. The result always carries an ident.
    pub fn from_shortcut(input: &str, default_suite: &str) -> Result<Source> {
        let input = input.trim();

        let mut source = if input.starts_with("ppa:") {
            Source::from_ppa_shortcut(input, default_suite)?
        } else if is_legacy_line(input) {
            let mut source = Source::from_legacy_line(input)?;
            source.set_origin(Origin::Manual);
            source
        } else {
            Source::from_uri_shortcut(input, default_suite)?
        };

        if source.ident().is_empty() {
            let ident = clean_ident(&source.name());
            source.set_ident(&ident);
        }
        debug!(input, ident = source.ident(), "resolved repository shortcut");

        Ok(source)
    }

    fn from_uri_shortcut(input: &str, default_suite: &str) -> Result<Source> {
        let invalid = || SourceError::InvalidShortcut(input.to_string());

        let mut words = input.split_whitespace();
        let uri = words.next().ok_or_else(invalid)?;
        let parsed = Url::parse(uri).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(invalid());
        }

        let suite = words.next().unwrap_or(default_suite);
        let mut components: Vec<&str> = words.collect();
        if components.is_empty() {
            components.push(PPA_COMPONENT);
        }

        let mut source = Source::new();
        source.set_uris([uri]);
        source.set_suites([suite]);
        source.set_components(components);
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_ppa_shortcut() {
        let source = Source::from_ppa_shortcut("ppa:system76/pop", "jammy").unwrap();
        assert_eq!(source.ident(), "ppa-system76-pop");
        assert_eq!(
            source.uris(),
            ["http://ppa.launchpadcontent.net/system76/pop/ubuntu"]
        );
        assert_eq!(source.suites(), ["jammy"]);
        assert_eq!(source.components(), ["main"]);
        assert_eq!(
            source.origin(),
            &Origin::Ppa {
                owner: "system76".into(),
                name: "pop".into()
            }
        );
        assert!(source.enabled());
    }

    #[test]
    fn test_invalid_ppa_shortcut() {
        for input in ["ppa:", "ppa:owner", "ppa:/name", "ppa:own er/name", "pap:a/b"] {
            let err = Source::from_ppa_shortcut(input, "jammy").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidShortcut, "{input}");
        }
    }

    #[test]
    fn test_shortcut_legacy_line() {
        let source =
            Source::from_shortcut("deb http://example.com/ubuntu focal main", "jammy").unwrap();
        assert_eq!(source.suites(), ["focal"]);
        assert_eq!(source.ident(), "example.com-ubuntu");
        assert_eq!(source.origin(), &Origin::Manual);
    }

    #[test]
    fn test_shortcut_bare_uri() {
        let source = Source::from_shortcut("https://repo.example.com/apt", "noble").unwrap();
        assert_eq!(source.uris(), ["https://repo.example.com/apt"]);
        assert_eq!(source.suites(), ["noble"]);
        assert_eq!(source.components(), ["main"]);
        assert_eq!(source.ident(), "repo.example.com-apt");

        let source =
            Source::from_shortcut("https://repo.example.com/apt stable contrib", "noble").unwrap();
        assert_eq!(source.suites(), ["stable"]);
        assert_eq!(source.components(), ["contrib"]);
    }

    #[test]
    fn test_shortcut_rejects_garbage() {
        let err = Source::from_shortcut("not a repository", "noble").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidShortcut);

        let err = Source::from_shortcut("ftp://example.com/debian", "noble").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidShortcut);
    }
}
