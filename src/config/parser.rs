use super::*;
use toml::{Table, Value};

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Reads and validates a TOML config file.
///
/// Relative paths in the file are taken relative to the directory the file
/// lives in.
pub fn parse_file<P: AsRef<Path>>(conf: P) -> Result<Config, Error> {
    let mut toml = String::new();
    {
        let mut f = File::open(conf.as_ref())?;
        f.read_to_string(&mut toml)?;
    }

    let base = conf.as_ref().parent().map(Path::to_path_buf).unwrap_or_default();
    parse_str(&toml, &base)
}

/// Parses config text, resolving relative paths against `base`
pub fn parse_str(toml: &str, base: &Path) -> Result<Config, Error> {
    match toml.parse::<Table>() {
        Ok(table) => config_from_table(&table, base),
        Err(e) => Err(Error::Parse(vec![message_from_error(toml, &e)]))
    }
}

fn config_from_table(table: &Table, base: &Path) -> Result<Config, Error> {
    let mut config: Config = Default::default();
    config.site.document_root = base.join(&config.site.document_root);

    if let Some(scheme) = string_at(table, "origin.scheme")? {
        if scheme.is_empty() ||
            !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' ||
                                c == '-' || c == '.') {
            return Err(Error::Validation(
                format!("The origin scheme {:?} isn't a valid URL scheme", scheme)
            ));
        }
        config.origin.scheme = scheme.to_ascii_lowercase();
    }

    if let Some(host) = string_at(table, "origin.host")? {
        if host.is_empty() || host.contains('/') {
            return Err(Error::Validation(
                format!("The origin host {:?} isn't a valid host name", host)
            ));
        }
        config.origin.host = host.to_ascii_lowercase();
    }

    if let Some(root) = string_at(table, "site.document_root")? {
        config.site.document_root = base.join(root);
    }

    if let Some(index) = string_at(table, "site.index")? {
        if index.is_empty() || index.contains('/') {
            return Err(Error::Validation(
                format!("The index {:?} must be a plain file name", index)
            ));
        }
        config.site.index = String::from(index);
    }

    if let Some(interpreter) = string_at(table, "cgi.interpreter")? {
        config.cgi.interpreter = resolve_program(interpreter, base);
    }

    if let Some(ext) = string_at(table, "cgi.extension")? {
        let ext = ext.trim_start_matches('.');
        if ext.is_empty() {
            return Err(Error::Validation(
                String::from("The script extension can't be empty")
            ));
        }
        config.cgi.extension = String::from(ext);
    }

    match lookup(table, "cgi.timeout_secs") {
        Some(&Value::Integer(t)) if t >= 0 => config.cgi.timeout_secs = t as u64,
        Some(&Value::Integer(t)) => return Err(Error::Validation(
            format!("The script timeout {} is negative", t)
        )),
        Some(val) => return Err(Error::Validation(
            format!("Expected the script timeout to be an integer, got a {}",
                    val.type_str())
        )),
        None => ()
    }

    if let Some(software) = string_at(table, "cgi.server_software")? {
        config.cgi.server_software = String::from(software);
    }

    match lookup(table, "cgi.pass_env") {
        Some(&Value::Array(ref names)) => {
            let mut pass = Vec::with_capacity(names.len());
            for name in names {
                match *name {
                    Value::String(ref s) => pass.push(s.clone()),
                    ref val => return Err(Error::Validation(
                        format!("Expected pass_env entries to be strings, got a {}",
                                val.type_str())
                    ))
                }
            }
            config.cgi.pass_env = pass;
        },
        Some(val) => return Err(Error::Validation(
            format!("Expected pass_env to be an array, got a {}", val.type_str())
        )),
        None => ()
    }

    match table.get("mime") {
        Some(&Value::Table(ref overrides)) => {
            for (ext, mime_type) in overrides {
                match *mime_type {
                    Value::String(ref s) if s.parse::<mime::Mime>().is_ok() => {
                        config.mime.insert(
                            ext.trim_start_matches('.').to_ascii_lowercase(),
                            s.clone());
                    },
                    Value::String(ref s) => return Err(Error::Validation(
                        format!("{:?} (for .{}) isn't a MIME type", s, ext)
                    )),
                    ref val => return Err(Error::Validation(
                        format!("Expected the MIME type for .{} to be a string, got a {}",
                                ext, val.type_str())
                    ))
                }
            }
        },
        Some(val) => return Err(Error::Validation(
            format!("Expected [mime] to be a table, got a {}", val.type_str())
        )),
        None => ()
    }

    Ok(config)
}

/// Walks a dotted key path through nested tables
fn lookup<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = table.get(segments.next()?)?;

    for segment in segments {
        current = match *current {
            Value::Table(ref t) => t.get(segment)?,
            _ => return None
        };
    }

    Some(current)
}

fn string_at<'a>(table: &'a Table, path: &str) -> Result<Option<&'a str>, Error> {
    match lookup(table, path) {
        Some(&Value::String(ref s)) => Ok(Some(s.as_str())),
        Some(val) => Err(Error::Validation(
            format!("Expected {} to be a string, got a {}", path, val.type_str())
        )),
        None => Ok(None)
    }
}

/// Bare program names are left for a `PATH` search; anything with a
/// directory component is anchored at `base`.
fn resolve_program(program: &str, base: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.components().count() > 1 {
        base.join(path)
    }
    else {
        PathBuf::from(program)
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse(Vec<ErrorMessage>),
    Validation(String)
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// An owned, rendered version of a TOML parse error
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub desc: String,
    pub line: usize,
    pub column: usize
}

/// Convert a `toml::de::Error` into an `ErrorMessage`
fn message_from_error(source: &str, error: &toml::de::Error) -> ErrorMessage {
    let offset = error.span().map_or(0, |span| span.start);
    let before = &source[.. offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;

    ErrorMessage {
        desc: String::from(error.message()),
        line: line,
        column: column
    }
}
