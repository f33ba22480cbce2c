use std::{env, fs};

use add::{add_source, AddOptions};
use aptsrc_config::{
    config::{self, generate_default_config, get_config, Config, CONFIG_PATH},
    error::ConfigError,
};
use aptsrc_core::{
    error::{ErrorContext, SourceError},
    Result, SourcesContext,
};
use aptsrc_utils::path::resolve_path;
use clap::Parser;
use cli::{Args, Commands};
use key::{manage_key, KeyAction};
use list::{list_files, list_sources, show_source};
use logging::setup_logging;
use modify::{convert_file, toggle_source_code};
use remove::remove_source;
use tracing::{debug, info, warn};
use utils::COLOR;

mod add;
mod cli;
mod key;
mod list;
mod logging;
mod modify;
mod remove;
mod utils;

fn print_config() -> Result<()> {
    let config_path = CONFIG_PATH.read().unwrap();
    let content = match fs::read_to_string(&*config_path) {
        Ok(v) => v,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found", config_path.display());
            toml::to_string_pretty(&Config::default_config()).map_err(ConfigError::from)?
        }
        Err(err) => {
            return Err(SourceError::Io {
                action: "reading config".to_string(),
                source: err,
            });
        }
    };
    info!("{}", content);
    Ok(())
}

fn handle_cli() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        let mut color = COLOR.write().unwrap();
        *color = false;
    }

    if let Some(ref c) = args.config {
        let mut config_path = CONFIG_PATH.write().unwrap();
        let path = resolve_path(c)?;
        let path = if path.is_absolute() {
            path
        } else {
            env::current_dir()
                .with_context(|| "retrieving current directory".into())?
                .join(path)
        };
        *config_path = path;
    }

    match args.command {
        Commands::DefConfig => generate_default_config()?,
        Commands::Config => print_config()?,
        command => {
            config::init()?;
            let ctx = SourcesContext::from_config(&get_config())?;
            debug!("using sources directory {}", ctx.sources_dir().display());

            match command {
                Commands::List {
                    all,
                    files,
                } => {
                    if files {
                        list_files(&ctx, args.json)?;
                    } else {
                        list_sources(&ctx, all, args.json)?;
                    }
                }
                Commands::Show {
                    ident,
                    legacy,
                } => show_source(&ctx, &ident, legacy, args.json)?,
                Commands::Add {
                    input,
                    disable,
                    source_code,
                    name,
                    identifier,
                    format,
                } => {
                    add_source(
                        &ctx,
                        &input,
                        AddOptions {
                            disable,
                            source_code,
                            name,
                            identifier,
                            format,
                        },
                    )?;
                }
                Commands::Remove {
                    ident,
                } => remove_source(&ctx, &ident)?,
                Commands::Source {
                    ident,
                    enable,
                    disable: _,
                } => toggle_source_code(&ctx, &ident, enable)?,
                Commands::Key {
                    ident,
                    path,
                    ascii,
                    name,
                    remove,
                    info: _,
                } => {
                    let action = match (path, ascii, name) {
                        (Some(path), ..) => KeyAction::Path(path),
                        (_, Some(text), _) => KeyAction::Ascii(text),
                        (.., Some(name)) => KeyAction::Name(name),
                        _ if remove => KeyAction::Remove,
                        _ => KeyAction::Info,
                    };
                    manage_key(&ctx, &ident, action, args.json)?;
                }
                Commands::Convert {
                    file,
                } => convert_file(&ctx, &file)?,
                _ => unreachable!(),
            }
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
