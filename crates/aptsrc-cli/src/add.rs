use aptsrc_core::{
    registry::set_source_code_enabled, Result, Source, SourceFile, SourceFormat, SourcesContext,
};
use nu_ansi_term::Color::{Blue, Green};
use tracing::{debug, info};

use crate::{cli::FormatArg, utils::Colored};

pub struct AddOptions {
    pub disable: bool,
    pub source_code: bool,
    pub name: Option<String>,
    pub identifier: Option<String>,
    pub format: Option<FormatArg>,
}

/// Adds a source, creating its file when needed. Returns the saved file.
pub fn add_source(ctx: &SourcesContext, input: &str, opts: AddOptions) -> Result<SourceFile> {
    let mut source = Source::from_shortcut(input, ctx.default_suite())?;

    if let Some(name) = &opts.name {
        source.set_name(name);
    }
    if let Some(ident) = &opts.identifier {
        source.set_ident(ident);
    }
    if opts.disable {
        source.set_enabled(false);
    }

    let mut file = SourceFile::new(ctx.sources_dir(), source.ident());
    if file.format().is_some() {
        debug!("appending to existing file {}", file.ident());
        file.load()?;
    } else {
        let format = match opts.format {
            Some(FormatArg::Sources) => SourceFormat::Structured,
            Some(FormatArg::List) => SourceFormat::Legacy,
            None => ctx.default_format(),
        };
        file.set_format(Some(format));
    }

    let key = file.add(source);
    if opts.source_code {
        set_source_code_enabled(ctx, &mut file, key, true)?;
    }
    file.save(ctx)?;

    if let Some(source) = file.source(key) {
        info!(
            "{} {} ({})",
            Colored(Green, "Added"),
            Colored(Blue, source.ident()),
            source.name()
        );
    }
    Ok(file)
}
