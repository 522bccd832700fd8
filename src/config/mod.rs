pub mod parser;

use std::collections::HashMap;
use std::fs::canonicalize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// A holder for gateway configuration
///
/// Built once at start-up and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct Config {
    pub origin: OriginConfig,
    pub site: SiteConfig,
    pub cgi: CgiConfig,
    /// Extension -> MIME type overrides, consulted before guessing
    pub mime: HashMap<String, String>
}

impl Default for Config {
    fn default() -> Config {
        Config {
            origin: Default::default(),
            site: Default::default(),
            cgi: Default::default(),
            mime: HashMap::new()
        }
    }
}

impl Config {
    /// Resolves the document root to its canonical form.
    ///
    /// The resolver compares canonical paths against this one, so it has to
    /// be done before the first request.
    pub fn canonicalize(mut self) -> io::Result<Config> {
        self.site.document_root = canonicalize(&self.site.document_root)?;
        Ok(self)
    }

    /// `scheme://host`, with no trailing slash
    pub fn origin_url(&self) -> String {
        format!("{}://{}", self.origin.scheme, self.origin.host)
    }

    /// Absolute URL on the virtual origin for a path starting with `/`
    pub fn full_url(&self, path: &str) -> String {
        format!("{}{}", self.origin_url(), path)
    }

    /// The wall-clock bound on a single script run, if there is one
    pub fn script_timeout(&self) -> Option<Duration> {
        match self.cgi.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs))
        }
    }
}

/// The reserved virtual origin requests are intercepted on
#[derive(Debug, Clone)]
pub struct OriginConfig {
    pub scheme: String,
    pub host: String
}

impl Default for OriginConfig {
    fn default() -> OriginConfig {
        OriginConfig {
            scheme: String::from("http"),
            host: String::from("cgi.local")
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Where the files and scripts are located on disk
    pub document_root: PathBuf,
    /// File probed for when a request resolves to a directory
    pub index: String
}

impl Default for SiteConfig {
    fn default() -> SiteConfig {
        SiteConfig {
            document_root: PathBuf::from("htdocs"),
            index: String::from("index.php")
        }
    }
}

#[derive(Debug, Clone)]
pub struct CgiConfig {
    /// Interpreter executable; it gets the script path as its only argument
    pub interpreter: PathBuf,
    /// Files with this extension (no leading dot) are run, not served
    pub extension: String,
    /// Zero means scripts may run forever
    pub timeout_secs: u64,
    pub server_software: String,
    /// Variables of the host's environment handed down to scripts
    pub pass_env: Vec<String>
}

impl Default for CgiConfig {
    fn default() -> CgiConfig {
        CgiConfig {
            interpreter: PathBuf::from("/usr/bin/php-cgi"),
            extension: String::from("php"),
            timeout_secs: 30,
            server_software: format!("cgi-gateway/{}", env!("CARGO_PKG_VERSION")),
            pass_env: vec![String::from("PATH")]
        }
    }
}
