//! Translation between the one-line `[key=v1,v2]` option syntax and DEB822 fields.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::LazyLock,
};

use serde::Serialize;

use crate::error::{Result, SourceError};

/// The fixed set of per-source APT options.
///
/// Variant order is the canonical output order for both formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OptionKey {
    Architectures,
    Languages,
    Targets,
    PDiffs,
    ByHash,
    AllowInsecure,
    AllowWeak,
    AllowDowngradeToInsecure,
    Trusted,
    SignedBy,
    CheckValidUntil,
    ValidUntilMin,
    ValidUntilMax,
}

pub type OptionMap = BTreeMap<OptionKey, String>;

impl OptionKey {
    pub const ALL: [OptionKey; 13] = [
        OptionKey::Architectures,
        OptionKey::Languages,
        OptionKey::Targets,
        OptionKey::PDiffs,
        OptionKey::ByHash,
        OptionKey::AllowInsecure,
        OptionKey::AllowWeak,
        OptionKey::AllowDowngradeToInsecure,
        OptionKey::Trusted,
        OptionKey::SignedBy,
        OptionKey::CheckValidUntil,
        OptionKey::ValidUntilMin,
        OptionKey::ValidUntilMax,
    ];

    /// Key used inside a legacy line's option group.
    pub fn short_name(&self) -> &'static str {
        match self {
            OptionKey::Architectures => "arch",
            OptionKey::Languages => "lang",
            OptionKey::Targets => "target",
            OptionKey::PDiffs => "pdiffs",
            OptionKey::ByHash => "by-hash",
            OptionKey::AllowInsecure => "allow-insecure",
            OptionKey::AllowWeak => "allow-weak",
            OptionKey::AllowDowngradeToInsecure => "allow-downgrade-to-insecure",
            OptionKey::Trusted => "trusted",
            OptionKey::SignedBy => "signed-by",
            OptionKey::CheckValidUntil => "check-valid-until",
            OptionKey::ValidUntilMin => "valid-until-min",
            OptionKey::ValidUntilMax => "valid-until-max",
        }
    }

    /// DEB822 field name.
    pub fn field_name(&self) -> &'static str {
        match self {
            OptionKey::Architectures => "Architectures",
            OptionKey::Languages => "Languages",
            OptionKey::Targets => "Targets",
            OptionKey::PDiffs => "PDiffs",
            OptionKey::ByHash => "By-Hash",
            OptionKey::AllowInsecure => "Allow-Insecure",
            OptionKey::AllowWeak => "Allow-Weak",
            OptionKey::AllowDowngradeToInsecure => "Allow-Downgrade-To-Insecure",
            OptionKey::Trusted => "Trusted",
            OptionKey::SignedBy => "Signed-By",
            OptionKey::CheckValidUntil => "Check-Valid-Until",
            OptionKey::ValidUntilMin => "Valid-Until-Min",
            OptionKey::ValidUntilMax => "Valid-Until-Max",
        }
    }

    pub fn from_short_name(name: &str) -> Option<OptionKey> {
        SHORT_NAMES.get(name).copied()
    }

    /// Looks up a DEB822 field name, ignoring case.
    pub fn from_field_name(name: &str) -> Option<OptionKey> {
        FIELD_NAMES.get(name.to_ascii_lowercase().as_str()).copied()
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field_name())
    }
}

static SHORT_NAMES: LazyLock<HashMap<&'static str, OptionKey>> = LazyLock::new(|| {
    OptionKey::ALL
        .iter()
        .map(|key| (key.short_name(), *key))
        .collect()
});

static FIELD_NAMES: LazyLock<HashMap<String, OptionKey>> = LazyLock::new(|| {
    OptionKey::ALL
        .iter()
        .map(|key| (key.field_name().to_ascii_lowercase(), *key))
        .collect()
});

/// Decodes a `[key=v1,v2 key2=v3]` group into canonical field values.
///
/// Comma-separated values become a single space-separated value.
pub fn decode(group: &str) -> Result<OptionMap> {
    let inner = group
        .trim()
        .strip_prefix('[')
        .and_then(|g| g.strip_suffix(']'))
        .unwrap_or(group);

    let mut options = OptionMap::new();
    for pair in inner.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(SourceError::malformed(
                group,
                format!("option `{pair}` has no value"),
            ));
        };
        let key = OptionKey::from_short_name(key)
            .ok_or_else(|| SourceError::UnknownOption(key.to_string()))?;

        let value = value
            .split(',')
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        options.insert(key, value);
    }

    Ok(options)
}

/// Encodes options back into a bracketed group in canonical order.
///
/// Empty values are skipped; returns `None` when nothing is left, since an
/// empty `[]` is never written.
pub fn encode(options: &OptionMap) -> Option<String> {
    let parts: Vec<String> = options
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| {
            let values: Vec<&str> = value.split_whitespace().collect();
            format!("{}={}", key.short_name(), values.join(","))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(format!("[{}]", parts.join(" ")))
    }
}
