use std::collections::BTreeMap;

use aptsrc_core::{
    registry::{self, find_source},
    Result, Source, SourceFile, SourcesContext,
};
use nu_ansi_term::Color::{Blue, Cyan, Green, Red, Yellow};
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{themes::BorderCorrection, Panel, Style},
};
use tracing::{debug, info, warn};

use crate::utils::{join_or_dash, to_json, Colored};

#[derive(Serialize)]
struct SourceSummary<'a> {
    ident: &'a str,
    name: String,
    enabled: bool,
    types: Vec<&'static str>,
    uris: &'a [String],
    suites: &'a [String],
    components: &'a [String],
    options: BTreeMap<&'static str, String>,
    file: Option<&'a str>,
    origin: &'a aptsrc_core::Origin,
}

impl<'a> From<&'a Source> for SourceSummary<'a> {
    fn from(source: &'a Source) -> Self {
        Self {
            ident: source.ident(),
            name: source.name(),
            enabled: source.enabled(),
            types: source.types().iter().map(|t| t.keyword()).collect(),
            uris: source.uris(),
            suites: source.suites(),
            components: source.components(),
            options: source
                .all_options()
                .into_iter()
                .map(|(key, value)| (key.field_name(), value))
                .collect(),
            file: source.file().map(|file| file.ident.as_str()),
            origin: source.origin(),
        }
    }
}

#[derive(Serialize)]
struct FileSummary<'a> {
    ident: &'a str,
    format: Option<&'static str>,
    path: Option<String>,
    sources: Vec<&'a str>,
}

impl<'a> From<&'a SourceFile> for FileSummary<'a> {
    fn from(file: &'a SourceFile) -> Self {
        Self {
            ident: file.ident(),
            format: file.format().map(|format| format.extension()),
            path: file.path().map(|path| path.display().to_string()),
            sources: file.sources().map(|(_, source)| source.ident()).collect(),
        }
    }
}

fn enabled_marker(enabled: bool) -> String {
    if enabled {
        format!("{}", Colored(Green, "yes"))
    } else {
        format!("{}", Colored(Red, "no"))
    }
}

pub fn list_sources(ctx: &SourcesContext, all: bool, json: bool) -> Result<()> {
    debug!(all, "listing sources");

    let listing = registry::list_all_sources(ctx, true)?;
    let sources: Vec<&Source> = listing
        .sources
        .iter()
        .filter(|source| all || source.enabled())
        .collect();

    if json {
        let summaries: Vec<SourceSummary> = sources.iter().map(|s| SourceSummary::from(*s)).collect();
        println!("{}", to_json(&summaries)?);
        return Ok(());
    }

    if sources.is_empty() {
        info!("No sources configured");
    } else {
        let mut builder = Builder::new();
        builder.push_record(["Ident", "Name", "Enabled", "Types", "URIs", "Suites", "Components"]);
        for source in &sources {
            let types: Vec<&str> = source.types().iter().map(|t| t.keyword()).collect();
            builder.push_record([
                format!("{}", Colored(Blue, source.ident())),
                source.name(),
                enabled_marker(source.enabled()),
                types.join(" "),
                join_or_dash(source.uris()),
                join_or_dash(source.suites()),
                join_or_dash(source.components()),
            ]);
        }

        let table = builder
            .build()
            .with(Panel::header("Sources"))
            .with(Style::rounded())
            .with(BorderCorrection {})
            .to_string();
        info!("\n{table}");
    }

    report_failures(&listing.errors);
    Ok(())
}

pub fn list_files(ctx: &SourcesContext, json: bool) -> Result<()> {
    debug!("listing source files");

    let listing = registry::list_all_files(ctx, true)?;

    if json {
        let summaries: Vec<FileSummary> = listing.files.iter().map(FileSummary::from).collect();
        println!("{}", to_json(&summaries)?);
        return Ok(());
    }

    if listing.files.is_empty() {
        info!("No source files in {}", ctx.sources_dir().display());
    } else {
        let mut builder = Builder::new();
        builder.push_record(["File", "Format", "Sources"]);
        for file in &listing.files {
            let idents: Vec<&str> = file.sources().map(|(_, source)| source.ident()).collect();
            builder.push_record([
                format!("{}", Colored(Blue, file.ident())),
                file.format()
                    .map(|format| format.extension().to_string())
                    .unwrap_or_default(),
                join_or_dash(&idents),
            ]);
        }

        let table = builder
            .build()
            .with(Panel::header("Source files"))
            .with(Style::rounded())
            .with(BorderCorrection {})
            .to_string();
        info!("\n{table}");
    }

    report_failures(&listing.errors);
    Ok(())
}

fn report_failures<E: std::fmt::Display>(errors: &BTreeMap<std::path::PathBuf, E>) {
    if errors.is_empty() {
        return;
    }
    warn!(
        "{} file(s) could not be read:",
        Colored(Yellow, errors.len())
    );
    for (path, err) in errors {
        warn!("  {}: {err}", path.display());
    }
}

pub fn show_source(ctx: &SourcesContext, ident: &str, legacy: bool, json: bool) -> Result<()> {
    let (file, key) = find_source(ctx, ident)?;
    let Some(source) = file.source(key) else {
        return Ok(());
    };

    if json {
        println!("{}", to_json(&SourceSummary::from(source))?);
    } else if legacy {
        info!("{}", source.to_legacy_line()?);
    } else {
        info!(
            "{} {}\n{}",
            Colored(Cyan, "#"),
            Colored(Cyan, file.path().map(|p| p.display().to_string()).unwrap_or_default()),
            source.to_structured_block().trim_end()
        );
    }

    Ok(())
}
