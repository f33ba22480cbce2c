use std::{
    fmt::Display,
    sync::{LazyLock, RwLock},
};

use aptsrc_core::{error::ErrorContext, Result};
use nu_ansi_term::Color;
use serde::Serialize;

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let color = COLOR.read().unwrap();
        if *color {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Space separated list, or `-` when empty.
pub fn join_or_dash<S: AsRef<str>>(values: &[S]) -> String {
    if values.is_empty() {
        return "-".to_string();
    }
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(std::io::Error::from)
        .with_context(|| "serializing output as json".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_or_dash() {
        assert_eq!(join_or_dash::<&str>(&[]), "-");
        assert_eq!(join_or_dash(&["main", "universe"]), "main universe");
    }
}
