use std::{fs, path::Path};

/// Location of the distribution identification file.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Suite used when the running distribution's codename can't be determined.
pub const FALLBACK_SUITE: &str = "stable";

/// Reads the distribution codename from an os-release style file.
///
/// `VERSION_CODENAME` wins over `UBUNTU_CODENAME`. Values may be quoted.
pub fn read_codename<P: AsRef<Path>>(path: P) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    parse_codename(&content)
}

fn parse_codename(content: &str) -> Option<String> {
    let mut fallback = None;

    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        if value.is_empty() {
            continue;
        }

        match key {
            "VERSION_CODENAME" => return Some(value.to_string()),
            "UBUNTU_CODENAME" => fallback = Some(value.to_string()),
            _ => {}
        }
    }

    fallback
}

/// The codename of the running system, or [`FALLBACK_SUITE`].
pub fn system_codename() -> String {
    read_codename(OS_RELEASE_PATH).unwrap_or_else(|| FALLBACK_SUITE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_codename() {
        let content = "NAME=\"Pop!_OS\"\nVERSION_CODENAME=jammy\nUBUNTU_CODENAME=jammy\n";
        assert_eq!(parse_codename(content).as_deref(), Some("jammy"));
    }

    #[test]
    fn test_parse_ubuntu_codename_fallback() {
        let content = "NAME=Foo\nVERSION_CODENAME=\nUBUNTU_CODENAME=\"noble\"\n";
        assert_eq!(parse_codename(content).as_deref(), Some("noble"));
    }

    #[test]
    fn test_parse_no_codename() {
        assert_eq!(parse_codename("ID=debian\n"), None);
    }

    #[test]
    fn test_read_codename_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_codename(dir.path().join("os-release")), None);
    }
}
