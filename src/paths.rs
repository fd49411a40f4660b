//! Workspace path classification and expansion.
//!
//! Workspaces are declared as strings and may point at three different
//! worlds: a native path of the host (`C:\Users\me\proj` or
//! `/home/me/proj`), a UNC path reaching into a nested Linux environment
//! (`\\wsl.localhost\Ubuntu\home\me\proj`), or anything else taken at face
//! value. Classification happens once, up front, through [`WorkspaceForm`];
//! downstream code matches on the form instead of re-parsing the string.

use std::path::PathBuf;

/// UNC prefixes under which Windows exposes nested Linux filesystems.
const NESTED_UNC_PREFIXES: [&str; 2] = ["\\\\wsl.localhost\\", "\\\\wsl$\\"];

/// Classified shape of a declared workspace path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceForm {
    /// Windows drive-letter path such as `C:\proj` or `c:/proj`.
    NativeHost,
    /// UNC path into a nested Linux distribution; carries the distro name.
    NestedDistro(String),
    /// Any other path, used as-is.
    PlainAbsolute,
}

impl WorkspaceForm {
    /// Classify a raw workspace string.
    ///
    /// A path only counts as [`WorkspaceForm::NestedDistro`] when the UNC
    /// prefix is followed by a non-empty distro name and a further
    /// backslash; `\\wsl$\Ubuntu` without a trailing component stays
    /// [`WorkspaceForm::PlainAbsolute`].
    #[must_use]
    pub fn parse(path: &str) -> Self {
        if let Some((distro, _)) = split_nested_unc(path) {
            return Self::NestedDistro(distro.to_string());
        }
        if is_drive_path(path) {
            return Self::NativeHost;
        }
        Self::PlainAbsolute
    }

    /// Distro name for nested workspaces, `None` otherwise.
    #[must_use]
    pub fn distro(&self) -> Option<&str> {
        match self {
            Self::NestedDistro(distro) => Some(distro),
            _ => None,
        }
    }
}

/// Splits `\\wsl.localhost\<distro>\<tail>` (or the `wsl$` form) into
/// `(distro, tail)`. The prefix match is case-insensitive. Returns `None`
/// for every other shape.
fn split_nested_unc(path: &str) -> Option<(&str, &str)> {
    for prefix in NESTED_UNC_PREFIXES {
        // Byte-range slicing can land inside a multi-byte character for
        // arbitrary input; get() turns that into a clean None.
        let Some(head) = path.get(..prefix.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            continue;
        }
        if let Some((distro, tail)) = path[prefix.len()..].split_once('\\') {
            if !distro.is_empty() {
                return Some((distro, tail));
            }
        }
    }
    None
}

/// True for drive-letter paths like `C:\` or `c:/`.
fn is_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Converts a nested-distro UNC path to the path seen inside the distro.
///
/// `\\wsl.localhost\Ubuntu\home\me\proj` becomes `/home/me/proj`. Paths of
/// any other shape are returned unchanged.
#[must_use]
pub fn to_linux_path(path: &str) -> String {
    match split_nested_unc(path) {
        Some((_, tail)) => {
            let converted = tail.replace('\\', "/");
            if converted.starts_with('/') {
                converted
            } else {
                format!("/{converted}")
            }
        },
        None => path.to_string(),
    }
}

/// Expands `~` and environment variables, then canonicalizes if the result
/// exists.
///
/// Unknown variables are left in place rather than erased, so a typo shows
/// up verbatim in the eventual "Workspace not found" message. On Windows
/// the path is not canonicalized because that would produce a verbatim
/// (`\\?\`) path and defeat the UNC classification above.
#[must_use]
pub fn expand_workspace(raw: &str) -> PathBuf {
    let expanded = expand_env_vars(&expand_tilde(raw));
    let path = PathBuf::from(&expanded);

    #[cfg(unix)]
    {
        if path.exists() {
            if let Ok(resolved) = path.canonicalize() {
                return resolved;
            }
        }
    }

    path
}

/// Expands a leading `~` or `~/` (also `~\` on Windows declarations).
fn expand_tilde(path: &str) -> String {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    }
    let after_tilde = path
        .strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"));
    if let Some(rest) = after_tilde {
        if let Some(home) = dirs::home_dir() {
            let sep = &path[1..2];
            return format!("{}{sep}{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Expands `$VAR`, `${VAR}` and `%VAR%` references against the process
/// environment. Unknown variables and malformed references stay literal.
fn expand_env_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '$' => {
                let rest = &path[i + 1..];
                if let Some(inner) = rest.strip_prefix('{') {
                    if let Some(end) = inner.find('}') {
                        let name = &inner[..end];
                        if let Ok(value) = std::env::var(name) {
                            out.push_str(&value);
                        } else {
                            out.push_str(&path[i..i + 2 + end + 1]);
                        }
                        // end is a byte offset; skip counts characters.
                        skip_chars(&mut chars, name.chars().count() + 2);
                        continue;
                    }
                    out.push(c);
                    continue;
                }
                let name_len = rest
                    .char_indices()
                    .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
                    .count();
                if name_len == 0 {
                    out.push(c);
                    continue;
                }
                let name = &rest[..name_len];
                if let Ok(value) = std::env::var(name) {
                    out.push_str(&value);
                } else {
                    out.push('$');
                    out.push_str(name);
                }
                skip_chars(&mut chars, name_len);
            },
            '%' => {
                let rest = &path[i + 1..];
                match rest.find('%') {
                    Some(end) if end > 0 => {
                        let name = &rest[..end];
                        if let Ok(value) = std::env::var(name) {
                            out.push_str(&value);
                        } else {
                            out.push('%');
                            out.push_str(name);
                            out.push('%');
                        }
                        skip_chars(&mut chars, name.chars().count() + 1);
                    },
                    _ => out.push(c),
                }
            },
            _ => out.push(c),
        }
    }

    out
}

fn skip_chars<I: Iterator>(iter: &mut std::iter::Peekable<I>, n: usize) {
    for _ in 0..n {
        iter.next();
    }
}
