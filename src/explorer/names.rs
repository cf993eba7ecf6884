use once_cell::sync::Lazy;
use regex::Regex;

use super::model::{Item, ItemStatus};
use crate::error::{ExplorerError, Result};

/// Anything outside the character set the store accepts in object keys.
static INVALID_KEY_CHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w!\-.*'() &$@=;:+,?]").expect("invalid key charset regex"));

/// Splits `name` at its last dot. A leading dot (`.env`) is not an extension.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// True for `stem.ext` and `stem (<n>).ext`.
fn is_copy_of(candidate: &str, stem: &str, ext: Option<&str>) -> bool {
    let base = match ext {
        Some(ext) => candidate
            .strip_suffix(ext)
            .and_then(|c| c.strip_suffix('.')),
        None => Some(candidate),
    };
    let Some(rest) = base.and_then(|b| b.strip_prefix(stem)) else {
        return false;
    };
    rest.is_empty()
        || rest
            .strip_prefix(" (")
            .and_then(|r| r.strip_suffix(')'))
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn numbered(stem: &str, ext: Option<&str>, n: usize) -> String {
    match ext {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    }
}

/// Returns a name that no active (non-editing) item in `items` already uses.
///
/// Without `autofix` a collision is an error. With it, the name gets the next
/// free ` (<n>)` suffix in front of its extension: `a.txt` becomes
/// `a (2).txt`, then `a (3).txt`.
pub fn resolve_name(name: &str, items: &[Item], autofix: bool) -> Result<String> {
    let active: Vec<&str> = items
        .iter()
        .filter(|i| i.status != ItemStatus::Editing)
        .map(|i| i.name.as_str())
        .collect();
    if !active.contains(&name) {
        return Ok(name.to_string());
    }
    if !autofix {
        return Err(ExplorerError::NameConflict(name.to_string()));
    }

    let (stem, ext) = split_extension(name);
    let copies = active.iter().filter(|n| is_copy_of(n, stem, ext)).count();
    let mut n = copies + 1;
    let mut candidate = numbered(stem, ext, n);
    while active.contains(&candidate.as_str()) {
        n += 1;
        candidate = numbered(stem, ext, n);
    }
    Ok(candidate)
}

pub fn validate_folder_name(name: &str) -> Result<()> {
    if name.contains('/') || name.contains('\\') {
        return Err(ExplorerError::InvalidName(
            "Folder name cannot contain forward or back slashes.".to_string(),
        ));
    }
    if let Some(m) = INVALID_KEY_CHAR.find(name) {
        return Err(ExplorerError::InvalidName(format!(
            "Folder name cannot contain the \"{}\" character",
            m.as_str()
        )));
    }
    Ok(())
}

/// Narrow no-break spaces (macOS screenshot names) are not valid in keys.
pub fn normalize_upload_name(name: &str) -> String {
    name.replace('\u{202F}', " ")
}
