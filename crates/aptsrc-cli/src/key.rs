use std::io;

use aptsrc_core::{
    error::ErrorContext,
    keys::{key_info, remove_source_key, set_source_key, KeyInfo, KeySpec},
    registry::find_source,
    Result, SourcesContext,
};
use aptsrc_utils::path::resolve_path;
use nu_ansi_term::Color::{Blue, Green, Red};
use tabled::{
    builder::Builder,
    settings::{themes::BorderCorrection, Panel, Style},
};
use tracing::info;

use crate::utils::{to_json, Colored};

pub enum KeyAction {
    Path(String),
    Ascii(String),
    Name(String),
    Remove,
    Info,
}

/// Reads armored text from stdin when given `-`.
fn ascii_text(text: String) -> Result<String> {
    if text != "-" {
        return Ok(text);
    }
    io::read_to_string(io::stdin()).with_context(|| "reading key from stdin".to_string())
}

pub fn manage_key(ctx: &SourcesContext, ident: &str, action: KeyAction, json: bool) -> Result<()> {
    let (mut file, key) = find_source(ctx, ident)?;

    let spec = match action {
        KeyAction::Info => {
            let Some(source) = file.source(key) else {
                return Ok(());
            };
            return print_info(&key_info(ctx, source)?, json);
        }
        KeyAction::Remove => {
            match remove_source_key(ctx, &mut file, key)? {
                Some(path) => info!(
                    "{} key for {} ({})",
                    Colored(Red, "Removed"),
                    Colored(Blue, ident),
                    path.display()
                ),
                None => info!("{} key for {}", Colored(Red, "Detached"), Colored(Blue, ident)),
            }
            return Ok(());
        }
        KeyAction::Path(path) => KeySpec::Path(resolve_path(&path)?),
        KeyAction::Ascii(text) => KeySpec::Ascii(ascii_text(text)?),
        KeyAction::Name(name) => KeySpec::Name(name),
    };

    let path = set_source_key(ctx, &mut file, key, &spec)?;
    info!(
        "{} key {} for {}",
        Colored(Green, "Set"),
        path.display(),
        Colored(Blue, ident)
    );
    Ok(())
}

fn print_info(key: &KeyInfo, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(key)?);
        return Ok(());
    }

    let yes_no = |value: bool| if value { "yes" } else { "no" }.to_string();
    let location = match (&key.signed_by, key.inline) {
        (_, true) => "inline".to_string(),
        (Some(path), false) => path.clone(),
        (None, false) => "-".to_string(),
    };
    let shared = if key.shared_with.is_empty() {
        "-".to_string()
    } else {
        key.shared_with.join(", ")
    };

    let mut builder = Builder::new();
    builder.push_record(["Signed-By".to_string(), location]);
    builder.push_record(["Present".to_string(), yes_no(key.present)]);
    builder.push_record(["Managed".to_string(), yes_no(key.managed)]);
    builder.push_record(["Armored".to_string(), yes_no(key.armored)]);
    builder.push_record(["Size".to_string(), key.size.to_string()]);
    builder.push_record(["Shared with".to_string(), shared]);

    let table = builder
        .build()
        .with(Panel::header(format!("Key for {}", key.ident)))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .to_string();
    info!("\n{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use aptsrc_core::ErrorKind;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_key_path_then_remove() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("example.list");
        fs::write(
            &list,
            "deb http://example.com/debian bookworm main ## X-Repolib-ID: example\n",
        )
        .unwrap();
        let keyring = dir.path().join("vendor.gpg");
        fs::write(&keyring, b"keyring").unwrap();
        let ctx = SourcesContext::new(dir.path());

        manage_key(
            &ctx,
            "example",
            KeyAction::Path(keyring.to_string_lossy().into_owned()),
            false,
        )
        .unwrap();
        let installed = dir.path().join("keyrings").join("example.gpg");
        assert!(installed.exists());
        assert!(fs::read_to_string(&list).unwrap().contains("signed-by="));

        manage_key(&ctx, "example", KeyAction::Info, true).unwrap();

        manage_key(&ctx, "example", KeyAction::Remove, false).unwrap();
        assert!(!installed.exists());
        assert!(!fs::read_to_string(&list).unwrap().contains("signed-by="));
    }

    #[test]
    fn test_key_unknown_name() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("example.list"),
            "deb http://example.com/debian bookworm main ## X-Repolib-ID: example\n",
        )
        .unwrap();
        let ctx = SourcesContext::new(dir.path());

        let err = manage_key(&ctx, "example", KeyAction::Name("missing".into()), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }
}
