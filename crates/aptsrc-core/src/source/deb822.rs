use std::sync::LazyLock;

use regex::Regex;

use super::{parse_bool, Origin, Source, SourceType};
use crate::{
    error::{Result, SourceError},
    options::OptionKey,
};

pub const NAME_FIELD: &str = "X-Repolib-Name";
pub const IDENT_FIELD: &str = "X-Repolib-ID";
pub const COMMENTS_FIELD: &str = "X-Repolib-Comments";

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9-]*:").expect("unable to compile field regex")
});

/// Whether a line opens a DEB822 field (`Name: value`).
pub fn is_field_line(line: &str) -> bool {
    FIELD_RE.is_match(line)
}

impl Source {
    /// Parses one DEB822 stanza.
    ///
    /// Continuation lines (leading space or tab) extend the previous field, with a
    /// lone `.` standing for an empty line. `#` lines become comments. Fields that
    /// aren't recognised are kept verbatim and written back on render.
    pub fn from_structured_block<S: AsRef<str>>(lines: &[S]) -> Result<Source> {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut source = Source::new();

        for raw in lines {
            let raw = raw.as_ref();
            let line = raw.trim_end();
            if line.trim().is_empty() {
                continue;
            }

            if let Some(comment) = line.trim_start().strip_prefix('#') {
                source.add_comment(comment.trim_start_matches('#'));
                continue;
            }

            if line.starts_with([' ', '\t']) {
                let Some((_, value)) = fields.last_mut() else {
                    return Err(SourceError::malformed(raw, "continuation line without a field"));
                };
                let content = line.trim();
                value.push('\n');
                if content != "." {
                    value.push_str(content);
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(SourceError::malformed(raw, "expected `Field: value`"));
            };
            fields.push((name.trim().to_string(), value.trim().to_string()));
        }

        for (name, value) in fields {
            source.apply_field(&name, &value)?;
        }
        source.set_origin(Origin::Parsed);

        Ok(source)
    }

    fn apply_field(&mut self, name: &str, value: &str) -> Result<()> {
        let words = || value.split_whitespace();

        match name.to_ascii_lowercase().as_str() {
            "types" => {
                let types = words()
                    .map(|word| {
                        SourceType::from_keyword(word).ok_or_else(|| {
                            SourceError::malformed(
                                &format!("{name}: {value}"),
                                format!("unknown source type `{word}`"),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.set_types(types);
            }
            "uris" => self.set_uris(words()),
            "suites" => self.set_suites(words()),
            "components" => self.set_components(words()),
            "enabled" => self.set_enabled(parse_bool(value)),
            "x-repolib-name" => self.set_name(value),
            "x-repolib-id" | "x-repolib-ident" => self.set_ident(value),
            "x-repolib-comments" => {
                for comment in value.split('#') {
                    self.add_comment(comment);
                }
            }
            _ => {
                match OptionKey::from_field_name(name) {
                    Some(key) => self.set_option(key, value),
                    None => {
                        self.extra
                            .push((name.to_string(), value.trim_matches('\n').to_string()))
                    }
                }
            }
        }

        Ok(())
    }

    /// Renders the source as a DEB822 stanza, without a trailing newline.
    pub fn to_structured_block(&self) -> String {
        let mut lines = Vec::new();

        let name = self.name();
        if !name.is_empty() {
            push_field(&mut lines, NAME_FIELD, &name);
        }
        if !self.ident.is_empty() {
            push_field(&mut lines, IDENT_FIELD, &self.ident);
        }
        if !self.comments.is_empty() {
            push_field(
                &mut lines,
                COMMENTS_FIELD,
                &format!("# {}", self.comments.join(" # ")),
            );
        }

        push_field(
            &mut lines,
            "Enabled",
            if self.enabled() { "yes" } else { "no" },
        );

        let types: Vec<&str> = self.types.iter().map(SourceType::keyword).collect();
        push_field(&mut lines, "Types", &types.join(" "));

        for (field, values) in [
            ("URIs", &self.uris),
            ("Suites", &self.suites),
            ("Components", &self.components),
        ] {
            if !values.is_empty() {
                push_field(&mut lines, field, &values.join(" "));
            }
        }

        for (key, value) in self.all_options() {
            if !value.trim().is_empty() {
                push_field(&mut lines, key.field_name(), &value);
            }
        }

        for (field, value) in &self.extra {
            push_field(&mut lines, field, value);
        }

        lines.join("\n")
    }
}

/// Appends a field, folding multi-line values into continuation lines.
fn push_field(lines: &mut Vec<String>, name: &str, value: &str) {
    if !value.contains('\n') {
        lines.push(format!("{name}: {value}").trim_end().to_string());
        return;
    }

    lines.push(format!("{name}:"));
    for part in value.split('\n') {
        if part.trim().is_empty() {
            lines.push(" .".to_string());
        } else {
            lines.push(format!(" {part}"));
        }
    }
}
