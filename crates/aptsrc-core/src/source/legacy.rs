use tracing::trace;

use super::{Origin, Source, SourceType};
use crate::{
    comment::{self, IDENT_TAG, NAME_TAG},
    error::{Result, SourceError},
    options::{self, OptionMap},
    tokenizer,
};

/// Whether a line is a (possibly commented-out) one-line entry.
///
/// Only the leading keyword is checked; the line may still fail to parse.
pub fn is_legacy_line(line: &str) -> bool {
    let body = line.trim().trim_start_matches('#');
    matches!(body.split_whitespace().next(), Some("deb" | "deb-src"))
}

impl Source {
    /// Parses a one-line entry such as
    /// `deb [arch=amd64] http://example.com focal main ## X-Repolib-Name: Example`.
    ///
    /// A leading `#` yields a disabled source.
    pub fn from_legacy_line(line: &str) -> Result<Source> {
        let trimmed = line.trim();
        let (enabled, body) = match trimmed.strip_prefix('#') {
            Some(rest) => (false, rest.trim_start_matches('#').trim_start()),
            None => (true, trimmed),
        };

        let keyword = body.split_whitespace().next().unwrap_or_default();
        let source_type = SourceType::from_keyword(keyword)
            .ok_or_else(|| SourceError::malformed(line, "expected `deb` or `deb-src`"))?;

        let (entry, region) = match tokenizer::comment_start(body) {
            Some(idx) => (&body[..idx], &body[idx + 1..]),
            None => (body, ""),
        };

        let tokens = tokenizer::tokenize(entry)?;
        let (options, first_field) = match tokens.get(1) {
            Some(group) if tokenizer::is_option_group(group) => (options::decode(group)?, 2),
            _ => (OptionMap::new(), 1),
        };
        let fields = &tokens[first_field..];

        let annotations = comment::extract(region);
        trace!(
            line = trimmed,
            ident = annotations.ident,
            "parsed legacy entry"
        );

        let mut source = Source::new();
        source.set_types([source_type]);
        source.set_enabled(enabled);
        source.set_uris([fields[0].as_str()]);
        source.set_suites([fields[1].as_str()]);
        source.set_components(fields[2..].iter().map(String::as_str));
        source.set_options(options);
        source.set_ident(&annotations.ident);
        source.set_name(&annotations.name);
        source.set_comments(annotations.comments);
        source.set_origin(Origin::Parsed);

        Ok(source)
    }

    /// Renders the source as a single one-line entry.
    ///
    /// # Errors
    ///
    /// * [`SourceError::TooManyValues`] if there is more than one type, URI or suite.
    /// * [`SourceError::Unrepresentable`] if a required field is missing or a value
    ///   spans several lines.
    pub fn to_legacy_line(&self) -> Result<String> {
        self.ensure_single("type", self.types.len())?;
        self.ensure_single("URI", self.uris.len())?;
        self.ensure_single("suite", self.suites.len())?;

        let source_type = self.types.first().copied().unwrap_or(SourceType::Binary);
        let uri = self.uris.first().ok_or_else(|| self.unrepresentable("it has no URI"))?;
        let suite = self
            .suites
            .first()
            .ok_or_else(|| self.unrepresentable("it has no suite"))?;

        let options = self.all_options();
        if let Some((key, _)) = options.iter().find(|(_, value)| value.contains('\n')) {
            return Err(self.unrepresentable(&format!("{key} spans several lines")));
        }

        let name = self.name();
        if name.contains('\n') || self.comments.iter().any(|c| c.contains('\n')) {
            return Err(self.unrepresentable("a name or comment spans several lines"));
        }
        if !comment::is_plain(&name) {
            return Err(self.unrepresentable("the name contains `#` or a metadata tag"));
        }
        if !self.comments.iter().all(|c| comment::is_plain(c)) {
            return Err(self.unrepresentable("a comment contains `#` or a metadata tag"));
        }

        let mut line = String::new();
        if !self.enabled() {
            line.push_str("# ");
        }
        line.push_str(source_type.keyword());
        if let Some(group) = options::encode(&options) {
            line.push(' ');
            line.push_str(&group);
        }
        line.push(' ');
        line.push_str(uri);
        line.push(' ');
        line.push_str(suite);
        for component in &self.components {
            line.push(' ');
            line.push_str(component);
        }

        if !name.is_empty() {
            line.push_str(&format!(" ## {NAME_TAG} {name}"));
        }
        if !self.ident.is_empty() {
            let marker = if name.is_empty() { "##" } else { "#" };
            line.push_str(&format!(" {marker} {IDENT_TAG} {}", self.ident));
        }
        for comment in &self.comments {
            line.push_str(&format!(" # {comment}"));
        }

        Ok(line)
    }

    fn ensure_single(&self, field: &'static str, count: usize) -> Result<()> {
        if count > 1 {
            return Err(SourceError::TooManyValues {
                ident: self.ident.clone(),
                field,
            });
        }
        Ok(())
    }

    fn unrepresentable(&self, reason: &str) -> SourceError {
        SourceError::Unrepresentable {
            ident: self.ident.clone(),
            reason: reason.to_string(),
        }
    }
}
