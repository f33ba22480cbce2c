//! The format-independent source entity.

mod deb822;
mod legacy;
mod shortcut;

use std::{collections::BTreeSet, fmt, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::options::{OptionKey, OptionMap};

pub use deb822::{is_field_line, COMMENTS_FIELD, IDENT_FIELD, NAME_FIELD};
pub use legacy::is_legacy_line;
pub use shortcut::{PPA_BASE_URI, PPA_COMPONENT};

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("unable to compile ident regex"));

/// Values accepted as "true" in `Enabled:` and boolean options.
const TRUE_VALUES: [&str; 4] = ["yes", "true", "1", "on"];

/// Kind of packages a source provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Binary,
    SourceCode,
}

impl SourceType {
    pub fn keyword(&self) -> &'static str {
        match self {
            SourceType::Binary => "deb",
            SourceType::SourceCode => "deb-src",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "deb" => Some(SourceType::Binary),
            "deb-src" => Some(SourceType::SourceCode),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// On-disk representation of a source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// One-line entries, `.list`
    Legacy,
    /// DEB822 stanzas, `.sources`
    Structured,
}

impl SourceFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Legacy => "list",
            SourceFormat::Structured => "sources",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            SourceFormat::Legacy => SourceFormat::Structured,
            SourceFormat::Structured => SourceFormat::Legacy,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// How a source came to exist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Origin {
    /// Read from a file on disk.
    Parsed,
    /// Built in memory.
    #[default]
    Manual,
    /// Expanded from a `ppa:owner/name` shortcut.
    Ppa { owner: String, name: String },
    /// Belongs to the distribution's own source file.
    System,
}

/// The file that owns a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub ident: String,
    pub format: Option<SourceFormat>,
}

/// One repository definition.
///
/// Fields are private so that the normalisation rules (deduplicated lists,
/// cleaned idents, `Signed-By` kept out of the option map) always hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    ident: String,
    name: String,
    enabled: bool,
    types: BTreeSet<SourceType>,
    uris: Vec<String>,
    suites: Vec<String>,
    components: Vec<String>,
    options: OptionMap,
    signed_by: Option<String>,
    comments: Vec<String>,
    extra: Vec<(String, String)>,
    origin: Origin,
    file: Option<FileRef>,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            ident: String::new(),
            name: String::new(),
            enabled: true,
            types: BTreeSet::from([SourceType::Binary]),
            uris: Vec::new(),
            suites: Vec::new(),
            components: Vec::new(),
            options: OptionMap::new(),
            signed_by: None,
            comments: Vec::new(),
            extra: Vec::new(),
            origin: Origin::Manual,
            file: None,
        }
    }
}

impl Source {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Sets the ident, dropping characters outside `[A-Za-z0-9._-]`.
    pub fn set_ident(&mut self, ident: &str) {
        self.ident = clean_ident(ident);
    }

    /// The display name, derived from the first URI (or the ident) when unset.
    pub fn name(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.clone();
        }
        self.uris
            .first()
            .map(|uri| name_from_uri(uri))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.ident.clone())
    }

    /// Whether a name was set explicitly rather than derived.
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    /// Whether APT should use this source.
    ///
    /// False whenever the URIs, suites or ident are missing, regardless of the
    /// stored flag.
    pub fn enabled(&self) -> bool {
        self.enabled && self.has_required_parts()
    }

    /// The stored flag, without the required-parts check.
    pub fn enabled_flag(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn has_required_parts(&self) -> bool {
        !self.uris.is_empty() && !self.suites.is_empty() && !self.ident.is_empty()
    }

    pub fn types(&self) -> &BTreeSet<SourceType> {
        &self.types
    }

    /// Replaces the type set. An empty set falls back to binary packages.
    pub fn set_types<I: IntoIterator<Item = SourceType>>(&mut self, types: I) {
        self.types = types.into_iter().collect();
        if self.types.is_empty() {
            self.types.insert(SourceType::Binary);
        }
    }

    pub fn has_type(&self, source_type: SourceType) -> bool {
        self.types.contains(&source_type)
    }

    pub fn sourcecode_enabled(&self) -> bool {
        self.has_type(SourceType::SourceCode)
    }

    /// Adds or removes `deb-src` from the type set, keeping `deb`.
    pub fn set_sourcecode_enabled(&mut self, enabled: bool) {
        let mut types = vec![SourceType::Binary];
        if enabled {
            types.push(SourceType::SourceCode);
        }
        self.set_types(types);
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    pub fn set_uris<I, S>(&mut self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uris = dedup(uris);
    }

    pub fn suites(&self) -> &[String] {
        &self.suites
    }

    pub fn set_suites<I, S>(&mut self, suites: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suites = dedup(suites);
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn set_components<I, S>(&mut self, components: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = dedup(components);
    }

    /// Value of an option, or `""` when unset.
    pub fn option(&self, key: OptionKey) -> &str {
        if key == OptionKey::SignedBy {
            return self.signed_by.as_deref().unwrap_or_default();
        }
        self.options.get(&key).map(String::as_str).unwrap_or_default()
    }

    /// Sets an option. An empty value unsets it; `Signed-By` is routed to
    /// [`Source::set_signed_by`].
    pub fn set_option(&mut self, key: OptionKey, value: &str) {
        if key == OptionKey::SignedBy {
            self.set_signed_by(Some(value));
            return;
        }
        let value = value.trim();
        if value.is_empty() {
            self.options.remove(&key);
        } else {
            self.options.insert(key, value.to_string());
        }
    }

    /// The options, excluding `Signed-By`.
    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    /// All options including `Signed-By`, as written to disk.
    pub fn all_options(&self) -> OptionMap {
        let mut options = self.options.clone();
        if let Some(signed_by) = &self.signed_by {
            options.insert(OptionKey::SignedBy, signed_by.clone());
        }
        options
    }

    pub fn set_options(&mut self, options: OptionMap) {
        self.options.clear();
        for (key, value) in options {
            self.set_option(key, &value);
        }
    }

    pub fn signed_by(&self) -> Option<&str> {
        self.signed_by.as_deref()
    }

    pub fn set_signed_by(&mut self, signed_by: Option<&str>) {
        self.signed_by = signed_by
            .map(|value| value.trim_matches('\n').to_string())
            .filter(|value| !value.trim().is_empty());
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn set_comments<I, S>(&mut self, comments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comments = comments
            .into_iter()
            .map(Into::into)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }

    pub fn add_comment(&mut self, comment: &str) {
        let comment = comment.trim();
        if !comment.is_empty() {
            self.comments.push(comment.to_string());
        }
    }

    /// Fields this crate doesn't interpret, in file order.
    pub fn extra_fields(&self) -> &[(String, String)] {
        &self.extra
    }

    pub fn extra_field(&self, field: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_extra_field(&mut self, field: &str, value: &str) {
        match self
            .extra
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.extra.push((field.to_string(), value.to_string())),
        }
    }

    pub fn remove_extra_field(&mut self, field: &str) -> Option<String> {
        let idx = self
            .extra
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(field))?;
        Some(self.extra.remove(idx).1)
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn set_origin(&mut self, origin: Origin) {
        self.origin = origin;
    }

    pub fn file(&self) -> Option<&FileRef> {
        self.file.as_ref()
    }

    pub(crate) fn set_file(&mut self, file: Option<FileRef>) {
        self.file = file;
    }

    /// An independent copy, optionally turned into its source-code twin.
    ///
    /// The copy is not owned by any file.
    pub fn copy(&self, source_code: bool) -> Source {
        let mut source = self.clone();
        source.file = None;
        if source_code {
            source.set_types([SourceType::SourceCode]);
        }
        source
    }

    /// The separate `deb-src` entry that stands in for this source's code in a
    /// `.list` file.
    pub fn source_code_twin(&self) -> Source {
        let mut twin = self.copy(true);
        twin.set_ident(&format!("{}-src", self.ident));
        twin.set_name(&format!("{} Source Code", self.name()));
        twin
    }

    /// Whether `twin` is exactly what [`Source::source_code_twin`] would produce,
    /// so folding it back into this source loses nothing.
    pub fn is_folded_twin(&self, twin: &Source) -> bool {
        let expected = self.source_code_twin();
        twin.types == expected.types
            && twin.ident == expected.ident
            && twin.name() == expected.name()
            && twin.enabled == expected.enabled
            && twin.same_location(&expected)
            && twin.all_options() == expected.all_options()
            && twin.comments == expected.comments
            && twin.extra == expected.extra
    }

    /// Whether two sources point at the same archive location.
    pub fn same_location(&self, other: &Source) -> bool {
        self.uris == other.uris
            && self.suites == other.suites
            && self.components == other.components
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_structured_block())
    }
}

pub(crate) fn clean_ident(ident: &str) -> String {
    IDENT_RE.replace_all(ident.trim(), "").into_owned()
}

pub(crate) fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    TRUE_VALUES.contains(&value.as_str())
}

/// `http://archive.example.com/ubuntu/` becomes `archive.example.com-ubuntu`.
fn name_from_uri(uri: &str) -> String {
    let rest = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    rest.split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn dedup<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value: String = value.into();
        let value = value.trim();
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}
