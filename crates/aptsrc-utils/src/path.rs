use std::{env, iter::Peekable, path::PathBuf, str::Chars};

use nix::unistd::{getuid, User};

use crate::error::{PathError, PathResult};

/// Resolves a path string that may contain environment variables.
///
/// `$VAR` and `${VAR}` are expanded from the environment, a leading `~` becomes the
/// user's home directory, and relative paths are anchored at the current directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is empty
/// * [`PathError::CurrentDir`] if the current directory cannot be determined
/// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
/// * [`PathError::UnclosedVariable`] if a `${` has no closing brace
///
/// # Example
///
/// ```
/// use aptsrc_utils::path::resolve_path;
///
/// let keys = resolve_path("/etc/apt/keyrings").unwrap();
/// assert!(keys.is_absolute());
/// ```
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let expanded = PathBuf::from(expand_variables(path)?);
    if expanded.is_absolute() {
        return Ok(expanded);
    }

    env::current_dir()
        .map(|cwd| cwd.join(expanded))
        .map_err(|err| PathError::CurrentDir { source: err })
}

/// Returns the user's home directory.
///
/// Uses `$HOME` when set and otherwise looks the current user up in the password database.
pub fn home_dir() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home);
    }

    User::from_uid(getuid())
        .ok()
        .flatten()
        .map(|user| user.dir)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                let var = consume_braced(&mut chars, path)?;
                push_env_var(&var, &mut result, path)?;
            }
            '$' => {
                let var = consume_var_name(&mut chars);
                if var.is_empty() {
                    result.push('$');
                } else {
                    push_env_var(&var, &mut result, path)?;
                }
            }
            '~' if result.is_empty() => result.push_str(&home_dir().to_string_lossy()),
            _ => result.push(c),
        }
    }

    Ok(result)
}

fn consume_braced(chars: &mut Peekable<Chars>, original: &str) -> PathResult<String> {
    let mut name = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            return Ok(name);
        }
        name.push(c);
    }

    Err(PathError::UnclosedVariable {
        input: original.to_string(),
    })
}

fn consume_var_name(chars: &mut Peekable<Chars>) -> String {
    let mut name = String::new();
    while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
        name.push(c);
    }
    name
}

fn push_env_var(name: &str, result: &mut String, original: &str) -> PathResult<()> {
    match name {
        "HOME" => result.push_str(&home_dir().to_string_lossy()),
        "XDG_CONFIG_HOME" => result.push_str(&xdg_config_home().to_string_lossy()),
        _ => {
            let value = env::var(name).map_err(|_| PathError::MissingEnvVar {
                var: name.to_string(),
                input: original.to_string(),
            })?;
            result.push_str(&value);
        }
    }
    Ok(())
}
