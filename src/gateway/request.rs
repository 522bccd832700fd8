//! What the host hands the gateway for each intercepted request

use crate::errors::{Error, Result};

use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::vec;

/// An intercepted request
///
/// The host builds one of these per request; the gateway never changes it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: Headers,
    pub body: Vec<BodyElement>
}

impl Request {
    pub fn new(method: &str, url: &str) -> Result<Request> {
        Ok(Request {
            method: String::from(method),
            url: url.parse()?,
            headers: Headers::new(),
            body: Vec::new()
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Request {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, element: BodyElement) -> Request {
        self.body.push(element);
        self
    }
}

/// One piece of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyElement {
    Bytes(Vec<u8>),
    /// A file the host wants uploaded from disk
    ///
    /// `size` is what the host believed when it built the request. The
    /// gateway goes back to the filesystem for the real figure.
    File {
        path: PathBuf,
        size: u64
    }
}

impl BodyElement {
    /// A file element, sized from the filesystem
    pub fn file<P: Into<PathBuf>>(path: P) -> io::Result<BodyElement> {
        let path = path.into();
        let size = fs::metadata(&path)?.len();
        Ok(BodyElement::File { path: path, size: size })
    }

    /// How many bytes this element will put on the wire right now
    pub fn current_size(&self) -> Result<u64> {
        match *self {
            BodyElement::Bytes(ref bytes) => Ok(bytes.len() as u64),
            BodyElement::File { ref path, size } => {
                let actual = fs::metadata(path)
                    .map_err(|e| Error::BodyStreamFailure {
                        path: path.clone(),
                        source: e
                    })?
                    .len();

                if actual != size {
                    debug!("{} is {} bytes, not the {} the host reported",
                           path.display(), actual, size);
                }

                Ok(actual)
            }
        }
    }
}

/// The parts of an absolute URL the gateway looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    /// Lowercased
    pub scheme: String,
    /// Lowercased
    pub host: String,
    /// The explicit port, or the scheme's usual one
    pub port: u16,
    /// Still percent-encoded; always starts with `/`
    pub path: String,
    /// Without the `?`
    pub query: Option<String>
}

impl Url {
    /// The query string if it has anything in it
    pub fn query_str(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }
}

impl FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Url> {
        let parsed = url::Url::parse(s)
            .map_err(|e| {
                debug!("Can't parse {:?}: {}", s, e);
                Error::InvalidUrl(String::from(s))
            })?;

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
            _ => return Err(Error::InvalidUrl(String::from(s)))
        };

        let path = match parsed.path() {
            "" => String::from("/"),
            path => String::from(path)
        };

        Ok(Url {
            scheme: parsed.scheme().to_owned(),
            host: host,
            port: parsed.port_or_known_default().unwrap_or(80),
            path: path,
            query: parsed.query().map(String::from)
        })
    }
}

/// An ordered list of HTTP headers
///
/// Duplicates are kept, in order. Lookups match names case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    list: Vec<(String, String)>
}

impl Headers {
    pub fn new() -> Headers {
        Headers { list: Vec::new() }
    }

    pub fn push<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.list.push((name.into(), value.into()));
    }

    /// Replaces every header called `name` with a single one
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        self.remove(&name);
        self.list.push((name, value.into()));
    }

    /// The first header called `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.list.iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.list.iter()
            .filter(move |&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.list.retain(|&(ref n, _)| !n.eq_ignore_ascii_case(name));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.list.iter().map(|&(ref n, ref v)| (n.as_str(), v.as_str()))
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Headers {
        Headers {
            list: iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect()
        }
    }
}
