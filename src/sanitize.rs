//! Making sure an entry's path stays inside the destination

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use log::*;

use crate::result::*;

/// Turns a normalized archive path into one that's safe to join
/// onto the destination root.
///
/// Rejects paths that climb out with `..`, absolute paths and drive prefixes,
/// NUL bytes, and (on Windows) device names like `CON` or `LPT1`.
/// `.` components are dropped.
/// The empty path stays empty and designates the root itself.
pub fn relative_path(normalized: &str) -> ExtractResult<Utf8PathBuf> {
    if normalized.contains('\0') {
        return Err(ExtractError::anomaly(normalized, "contains a NUL byte"));
    }

    let mut relative = Utf8PathBuf::new();
    for component in Utf8Path::new(normalized).components() {
        match component {
            Utf8Component::Prefix(_) | Utf8Component::RootDir => {
                return Err(ExtractError::anomaly(normalized, "path is absolute"));
            }
            Utf8Component::ParentDir => {
                return Err(ExtractError::anomaly(normalized, "path contains `..`"));
            }
            Utf8Component::CurDir => {
                warn!("Ignoring `.` in {}", normalized);
            }
            Utf8Component::Normal(name) => {
                if cfg!(windows) && is_reserved_on_windows(name) {
                    return Err(ExtractError::anomaly(
                        normalized,
                        format!("{name} is a reserved name"),
                    ));
                }
                relative.push(name);
            }
        }
    }
    Ok(relative)
}

/// Windows won't create files named after devices, with or without an extension.
fn is_reserved_on_windows(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    let upper = stem.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => match upper.strip_prefix("COM").or_else(|| upper.strip_prefix("LPT")) {
            Some(digit) => matches!(digit, "1" | "2" | "3" | "4" | "5" | "6" | "7" | "8" | "9"),
            None => false,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn anomaly(path: &str) -> bool {
        matches!(relative_path(path), Err(ExtractError::PathAnomaly { .. }))
    }

    #[test]
    fn plain_paths() {
        assert_eq!(relative_path("a.txt").unwrap(), "a.txt");
        assert_eq!(relative_path("dir/b.txt").unwrap(), "dir/b.txt");
        assert_eq!(relative_path("dir/").unwrap(), "dir");
        assert_eq!(relative_path("").unwrap(), "");
    }

    #[test]
    fn current_dir_is_dropped() {
        assert_eq!(relative_path("./dir/./b.txt").unwrap(), "dir/b.txt");
    }

    #[test]
    fn escapes() {
        assert!(anomaly("../evil"));
        assert!(anomaly("dir/../../evil"));
        // Even if it would stay inside, `..` isn't something we follow.
        assert!(anomaly("dir/../fine"));
        assert!(anomaly("/etc/passwd"));
        assert!(anomaly("dir/\0/x"));
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved_on_windows("CON"));
        assert!(is_reserved_on_windows("con.txt"));
        assert!(is_reserved_on_windows("Lpt9"));
        assert!(is_reserved_on_windows("nul.tar.gz"));
        assert!(!is_reserved_on_windows("COM0"));
        assert!(!is_reserved_on_windows("COM10"));
        assert!(!is_reserved_on_windows("console"));
        assert!(!is_reserved_on_windows("auxiliary.rs"));
    }

    #[test]
    #[cfg(not(windows))]
    fn reserved_names_are_fine_elsewhere() {
        assert_eq!(relative_path("src/aux.rs").unwrap(), "src/aux.rs");
    }
}
