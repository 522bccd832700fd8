//! Helpers for filesystem manipulations
//!
//! This is where request paths become files: normalization of the raw path
//! and resolution of the normalized path to a static file or a script under
//! the document root.

use crate::errors::{Result, Error};

use std::fs::canonicalize;
use std::path::{Path, PathBuf};

/// Normalizes a path.
///
/// The following operations are performed:
///
/// 1. Sequences of multiple `'/'` characters are collapsed into a single `'/'`.
/// 2. Any leading or trailing `'/'` is stripped. (If the request path doesn’t
///    lead with a slash, the path is ill-formed for our purposes and we return
///    an `Err`).
/// 3. Percent-encoded bytes are decoded. Bogus percent-encoding, like `b"%bo"`,
///    will return `Err`.
pub fn normalize_path(path: &[u8]) -> Result<Vec<u8>> {
    // Check for a leading `'/'`
    if path.first() != Some(&0x2F) {
        return Err(Error::PathNotInOriginForm);
    }

    let mut buffer = Vec::with_capacity(path.len() - 1);
    let mut i = 1;

    // skip leading '/' characters
    while i < path.len() && path[i] == 0x2F {
        i += 1;
    }

    while i < path.len() {
        match path[i] {
            // '/'
            0x2F => {
                while i < path.len() && path[i] == 0x2F {
                    i += 1;
                }
                // no trailing slash
                if i < path.len() {
                    buffer.push(0x2F);
                }
            },
            // '%'
            0x25 => {
                if path.len() < i + 3 {
                    return Err(Error::IllegalPercentEncoding);
                }

                let high_nybble = path[i + 1];
                let low_nybble = path[i + 2];

                if !is_hexit(high_nybble) || !is_hexit(low_nybble) {
                    return Err(Error::IllegalPercentEncoding);
                }

                buffer.push(from_hexit(high_nybble) << 4 |
                            from_hexit(low_nybble));

                i += 3;
            },
            b => {
                buffer.push(b);
                i += 1;
            }
        }
    }

    Ok(buffer)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_strips_leading_slashes() {
        assert_eq!(normalize_path(b"/blah").unwrap(), b"blah");
        assert_eq!(normalize_path(b"//bleh").unwrap(), b"bleh");
    }

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(normalize_path(b"/app/").unwrap(), b"app");
        assert_eq!(normalize_path(b"/app//").unwrap(), b"app");
        assert_eq!(normalize_path(b"/").unwrap(), b"");
    }

    #[test]
    fn normalize_collapses_embedded_slash_sequences() {
        assert_eq!(normalize_path(b"/foo//bar").unwrap(), b"foo/bar");
    }

    #[test]
    fn normalize_decodes_percents() {
        assert_eq!(normalize_path(b"/foo%20bar").unwrap(), b"foo bar");
    }

    #[test]
    fn normalize_handles_trailing_percents_correctly() {
        assert_eq!(normalize_path(b"/trail%20").unwrap(), b"trail ");
    }

    #[test]
    fn normalize_errors_on_truncated_percent() {
        assert!(normalize_path(b"/trail%2").is_err());
        assert!(normalize_path(b"/trail%").is_err());
    }

    #[test]
    fn normalize_errors_on_bogus_percent() {
        assert!(normalize_path(b"/bog%us").is_err());
    }

    #[test]
    fn normalize_errors_without_leading_slash() {
        assert!(normalize_path(b"bogus").is_err());
        assert!(normalize_path(b"").is_err());
    }
}

/// Returns `true` iff the byte is a hexadecimal digit according to ASCII
fn is_hexit(x: u8) -> bool {
    x.is_ascii_hexdigit()
}

/// Converts from a hexadecimal digit to its value
fn from_hexit(x: u8) -> u8 {
    match x {
        b'0' ..= b'9' => x - b'0',
        b'A' ..= b'F' => x - b'A' + 10,
        b'a' ..= b'f' => x - b'a' + 10,
        _ => panic!("Contract violation: from_hexit expected a hexit, got 0x{:X}", x)
    }
}

#[test]
fn from_hexit_works() {
    use std::char;

    for x in 0x0 .. 0x10 {
        assert_eq!(from_hexit(char::from_digit(x, 16).unwrap() as u8), x as u8);
        assert_eq!(from_hexit(char::from_digit(x, 16).unwrap()
                              .to_ascii_uppercase() as u8), x as u8);
    }
}

/// Where a request path landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Found(Target),
    NotFound
}

/// A file under the document root that a request maps onto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Absolute path of the file on disk
    pub physical_path: PathBuf,
    /// The part of the request path that names the file, with a leading `/`
    pub script_name: String,
    /// Whatever the path had left past the file, with a leading `/`
    pub path_info: Option<String>,
    pub is_script: bool
}

/// Where to look and what to look for
#[derive(Debug, Clone, Copy)]
pub struct Layout<'a> {
    /// Must already be canonical
    pub document_root: &'a Path,
    pub index: &'a str,
    /// Without the leading dot
    pub script_extension: &'a str
}

/// Maps a normalized request path (no leading or trailing slash) onto the
/// document root.
///
/// The path is first tried as a file. Failing that, it is walked one segment
/// at a time for as long as each segment exists; whatever is left over is
/// path-info. A directory is swapped for its index file, if it has one.
///
/// Any filesystem error along the way just means the thing isn't there.
pub fn resolve(path: &str, layout: Layout) -> ResolvedTarget {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.iter().any(|&s| s == "." || s == "..") {
        debug!("Refusing to resolve dot segments in {:?}", path);
        return ResolvedTarget::NotFound;
    }

    let root = layout.document_root;
    let mut script_name = String::new();
    let mut physical_path = root.to_path_buf();
    let mut consumed = 0;

    let direct = root.join(path);
    if !segments.is_empty() && direct.is_file() {
        script_name = format!("/{}", segments.join("/"));
        physical_path = direct;
        consumed = segments.len();
    }
    else {
        for segment in &segments {
            let candidate = physical_path.join(segment);
            if !candidate.exists() {
                break;
            }

            script_name.push('/');
            script_name.push_str(segment);
            physical_path = candidate;
            consumed += 1;
        }
    }

    if physical_path.is_dir() {
        let candidate = physical_path.join(layout.index);
        if candidate.is_file() {
            script_name.push('/');
            script_name.push_str(layout.index);
            physical_path = candidate;
        }
    }

    if !physical_path.is_file() {
        return ResolvedTarget::NotFound;
    }

    // Symlinks can still point anywhere
    match canonicalize(&physical_path) {
        Ok(ref real) if real.starts_with(root) => (),
        Ok(real) => {
            warn!("{:?} resolves outside the document root, to {:?}",
                  path, real);
            return ResolvedTarget::NotFound;
        },
        Err(_) => return ResolvedTarget::NotFound
    }

    let path_info = if consumed < segments.len() {
        Some(format!("/{}", segments[consumed ..].join("/")))
    }
    else {
        None
    };

    let is_script = physical_path.extension()
        .map_or(false, |ext| ext == layout.script_extension);

    ResolvedTarget::Found(Target {
        physical_path: physical_path,
        script_name: script_name,
        path_info: path_info,
        is_script: is_script
    })
}

#[cfg(test)]
mod resolve_test {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    fn site() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = canonicalize(dir.path()).unwrap();

        fs::create_dir_all(root.join("app/empty")).unwrap();
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("index.php"), b"<?php").unwrap();
        fs::write(root.join("app/index.php"), b"<?php").unwrap();
        fs::write(root.join("app/info.php"), b"<?php").unwrap();
        fs::write(root.join("assets/site.css"), b"body {}").unwrap();

        (dir, root)
    }

    fn layout(root: &Path) -> Layout {
        Layout {
            document_root: root,
            index: "index.php",
            script_extension: "php"
        }
    }

    fn found(target: ResolvedTarget) -> Target {
        match target {
            ResolvedTarget::Found(t) => t,
            ResolvedTarget::NotFound => panic!("expected a target")
        }
    }

    #[test]
    fn static_file_is_found_directly() {
        let (_dir, root) = site();
        let target = found(resolve("assets/site.css", layout(&root)));

        assert_eq!(target.physical_path, root.join("assets/site.css"));
        assert_eq!(target.script_name, "/assets/site.css");
        assert_eq!(target.path_info, None);
        assert!(!target.is_script);
    }

    #[test]
    fn script_is_flagged() {
        let (_dir, root) = site();
        let target = found(resolve("app/info.php", layout(&root)));

        assert!(target.is_script);
        assert_eq!(target.script_name, "/app/info.php");
    }

    #[test]
    fn directory_falls_back_to_index() {
        let (_dir, root) = site();
        let target = found(resolve("app", layout(&root)));

        assert_eq!(target.physical_path, root.join("app/index.php"));
        assert_eq!(target.script_name, "/app/index.php");
        assert_eq!(target.path_info, None);
        assert!(target.is_script);
    }

    #[test]
    fn empty_path_is_the_root_index() {
        let (_dir, root) = site();
        let target = found(resolve("", layout(&root)));

        assert_eq!(target.script_name, "/index.php");
        assert_eq!(target.path_info, None);
    }

    #[test]
    fn trailing_segments_become_path_info() {
        let (_dir, root) = site();
        let target = found(resolve("app/info.php/users/42", layout(&root)));

        assert_eq!(target.physical_path, root.join("app/info.php"));
        assert_eq!(target.script_name, "/app/info.php");
        assert_eq!(target.path_info.as_ref().map(String::as_str), Some("/users/42"));
    }

    #[test]
    fn missing_segment_under_indexed_directory_is_path_info() {
        let (_dir, root) = site();
        let target = found(resolve("app/nothing/here", layout(&root)));

        assert_eq!(target.script_name, "/app/index.php");
        assert_eq!(target.path_info.as_ref().map(String::as_str), Some("/nothing/here"));
    }

    #[test]
    fn extensionless_script_name_is_not_guessed() {
        let (_dir, root) = site();
        // `info` doesn't exist, so the walk stops at `app` and its index runs
        let target = found(resolve("app/info", layout(&root)));

        assert_eq!(target.script_name, "/app/index.php");
        assert_eq!(target.path_info.as_ref().map(String::as_str), Some("/info"));
    }

    #[test]
    fn directory_without_index_is_not_found() {
        let (_dir, root) = site();
        assert_eq!(resolve("app/empty", layout(&root)), ResolvedTarget::NotFound);
        assert_eq!(resolve("assets", layout(&root)), ResolvedTarget::NotFound);
    }

    #[test]
    fn missing_file_in_unindexed_directory_is_not_found() {
        let (_dir, root) = site();
        assert_eq!(resolve("assets/missing.css", layout(&root)),
                   ResolvedTarget::NotFound);
    }

    #[test]
    fn dot_segments_are_refused() {
        let (_dir, root) = site();
        assert_eq!(resolve("app/../index.php", layout(&root)), ResolvedTarget::NotFound);
        assert_eq!(resolve("./index.php", layout(&root)), ResolvedTarget::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_out_of_the_root_are_refused() {
        let (_dir, root) = site();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"shh").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"),
                                   root.join("assets/leak.txt")).unwrap();

        assert_eq!(resolve("assets/leak.txt", layout(&root)), ResolvedTarget::NotFound);
    }
}
