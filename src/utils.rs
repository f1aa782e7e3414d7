use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

/// Scalars that spreadsheet exports put into structure and template cells.
#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Text(String),
    Number(f64),
    Flag(bool),
}

/// Deserialize an optional text cell, treating null, NaN and blank cells as
/// absent.
pub(crate) fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Cell>::deserialize(deserializer)? {
        Some(Cell::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Cell::Number(n)) if !n.is_nan() => Some(n.to_string()),
        Some(Cell::Number(_)) | Some(Cell::Flag(_)) | None => None,
    })
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
