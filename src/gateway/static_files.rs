//! Static file service

use super::{Headers, Prepared, ResponseHead};
use crate::config::Config;
use crate::errors::Result;
use crate::filesystem::Target;

use std::fs;
use std::path::Path;

/// Reads a non-script target whole.
pub(super) fn serve(target: &Target, config: &Config) -> Result<Prepared> {
    let body = fs::read(&target.physical_path)?;
    let mime = mime_type(&target.physical_path, config);

    debug!("Serving {} as {} ({} bytes)",
           target.physical_path.display(), mime, body.len());

    let mut headers = Headers::new();
    headers.push("Content-Type", mime.as_str());

    Ok(Prepared {
        head: ResponseHead {
            status: 200,
            mime_type: Some(mime),
            content_length: body.len() as u64,
            redirect_url: None,
            headers: headers
        },
        body: body
    })
}

/// The media type for a file, by extension
///
/// Configured overrides win over the guess.
pub fn mime_type(path: &Path, config: &Config) -> String {
    let extension = path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(mime) = extension.as_ref().and_then(|ext| config.mime.get(ext)) {
        return mime.clone();
    }

    mime_guess::from_path(path)
        .first()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
        .essence_str()
        .to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    use std::path::PathBuf;

    #[test]
    fn mime_type_is_guessed_from_extension() {
        let config = Config::default();

        assert_eq!(mime_type(Path::new("/x/site.css"), &config), "text/css");
        assert_eq!(mime_type(Path::new("/x/logo.PNG"), &config), "image/png");
        assert_eq!(mime_type(Path::new("/x/blob.unknownext"), &config),
                   "application/octet-stream");
        assert_eq!(mime_type(Path::new("/x/README"), &config),
                   "application/octet-stream");
    }

    #[test]
    fn configured_override_wins() {
        let mut config = Config::default();
        config.mime.insert(String::from("css"), String::from("text/x-custom"));

        assert_eq!(mime_type(Path::new("/x/site.css"), &config), "text/x-custom");
    }

    #[test]
    fn file_is_served_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello, world").unwrap();

        let target = Target {
            physical_path: path,
            script_name: String::from("/hello.txt"),
            path_info: None,
            is_script: false
        };
        let prepared = serve(&target, &Config::default()).unwrap();

        assert_eq!(prepared.head.status, 200);
        assert_eq!(prepared.head.mime_type.as_ref().map(String::as_str), Some("text/plain"));
        assert_eq!(prepared.head.content_length, 12);
        assert_eq!(prepared.head.headers.get("content-type"), Some("text/plain"));
        assert_eq!(prepared.body, b"hello, world");
    }

    #[test]
    fn vanished_file_is_an_error() {
        let target = Target {
            physical_path: PathBuf::from("/nonexistent/gone.txt"),
            script_name: String::from("/gone.txt"),
            path_info: None,
            is_script: false
        };

        assert!(serve(&target, &Config::default()).is_err());
    }
}
