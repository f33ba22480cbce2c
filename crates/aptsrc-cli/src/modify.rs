use aptsrc_core::{
    registry::{find_file, find_source, set_source_code_enabled},
    Result, SourcesContext,
};
use nu_ansi_term::Color::{Blue, Green};
use tracing::info;

use crate::utils::Colored;

pub fn toggle_source_code(ctx: &SourcesContext, ident: &str, enabled: bool) -> Result<()> {
    let (mut file, key) = find_source(ctx, ident)?;
    set_source_code_enabled(ctx, &mut file, key, enabled)?;
    file.save(ctx)?;

    info!(
        "Source code {} for {}",
        if enabled { "enabled" } else { "disabled" },
        Colored(Blue, ident)
    );
    Ok(())
}

pub fn convert_file(ctx: &SourcesContext, ident: &str) -> Result<()> {
    let mut file = find_file(ctx, ident)?;
    let from = file.format();
    file.convert_format(ctx)?;

    if let (Some(from), Some(to)) = (from, file.format()) {
        info!(
            "{} {} from .{} to .{}",
            Colored(Green, "Converted"),
            Colored(Blue, file.ident()),
            from.extension(),
            to.extension()
        );
    }
    Ok(())
}
