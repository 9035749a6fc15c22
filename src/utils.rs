//! Utility functions for path manipulation

use std::path::{MAIN_SEPARATOR, Path, PathBuf};

/// Append `/` to a remote directory unless it is empty or already ends with one
///
/// An empty remote directory means "the login directory" and is left as is.
///
/// # Examples
///
/// ```
/// use ftp_inbound::utils::ensure_trailing_slash;
///
/// assert_eq!(ensure_trailing_slash("exports"), "exports/");
/// assert_eq!(ensure_trailing_slash("exports/"), "exports/");
/// assert_eq!(ensure_trailing_slash(""), "");
/// ```
pub fn ensure_trailing_slash(dir: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{}/", dir)
    }
}

/// Append the platform separator to a local directory path
pub fn ensure_trailing_separator(dir: &Path) -> PathBuf {
    let text = dir.to_string_lossy();
    if text.ends_with('/') || text.ends_with(MAIN_SEPARATOR) {
        return dir.to_path_buf();
    }
    let mut raw = dir.as_os_str().to_os_string();
    raw.push(MAIN_SEPARATOR.to_string());
    PathBuf::from(raw)
}

/// Final component of a `/` or `\` separated name
///
/// Configured selectors may carry a directory part; only the name is matched.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Join a normalized remote directory and a file name
pub fn remote_path(dir: &str, name: &str) -> String {
    format!("{}{}", ensure_trailing_slash(dir), name)
}
