//! The CGI/1.1 side of the gateway
//!
//! Building the variables a script sees, running the interpreter, and reading
//! back the document it writes.

pub mod environment;
pub mod parser;
pub mod process;

/// A header line from a CGI document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub content: String
}

/// The header portion of a document
///
/// `headers` holds every header in the order the script wrote them,
/// including the ones that were also picked out into the other fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentHeaders {
    /// Media type without parameters
    pub content_type: Option<String>,
    pub status: Option<u16>,
    /// The `Location` value exactly as written
    pub location: Option<String>,
    pub headers: Vec<Header>
}

/// A parsed CGI response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub headers: DocumentHeaders,
    /// Byte offset in the raw output where the body starts
    pub body_offset: usize,
    /// The header block ended on something that wasn't a header
    pub malformed: bool
}

/// An ordered set of CGI meta-variables
///
/// Names are unique; setting a name twice replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgiEnvironment {
    vars: Vec<(String, String)>
}

impl CgiEnvironment {
    pub fn new() -> CgiEnvironment {
        CgiEnvironment { vars: Vec::new() }
    }

    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();

        match self.vars.iter_mut().find(|&&mut (ref n, _)| *n == name) {
            Some(&mut (_, ref mut v)) => *v = value,
            None => self.vars.push((name, value))
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.iter()
            .find(|&&(ref n, _)| n == name)
            .map(|&(_, ref v)| v.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|&(ref n, ref v)| (n.as_str(), v.as_str()))
    }
}

#[test]
fn environment_set_replaces_in_place() {
    let mut env = CgiEnvironment::new();
    env.set("A", "1");
    env.set("B", "2");
    env.set("A", "3");

    assert_eq!(env.len(), 2);
    assert_eq!(env.iter().collect::<Vec<_>>(), vec![("A", "3"), ("B", "2")]);
}
