//! Meta-variables for a script run (RFC 3875, section 4.1)

use crate::cgi::CgiEnvironment;
use crate::config::Config;
use crate::errors::Result;
use crate::filesystem::Target;
use crate::gateway::Request;

/// Builds the full variable set for running `target`.
///
/// `path` is the normalized request path the target was resolved from.
/// Request headers become `HTTP_*` variables, except `Content-Type` (which is
/// `CONTENT_TYPE`) and `Proxy`, which is dropped so a client can't plant an
/// `HTTP_PROXY` in the script's environment. Header variables never replace
/// the ones set here.
///
/// `CONTENT_LENGTH` is always present. File parts of the body are measured on
/// disk, and a file that can't be measured fails the whole request.
pub fn build(request: &Request, path: &str, target: &Target, config: &Config)
             -> Result<CgiEnvironment>
{
    let url = &request.url;
    let root = &config.site.document_root;
    let document_uri = format!("/{}", path);

    let mut env = CgiEnvironment::new();
    env.set("SERVER_SOFTWARE", config.cgi.server_software.as_str());
    env.set("SERVER_NAME", url.host.as_str());
    env.set("SERVER_PORT", url.port.to_string());
    env.set("SERVER_PROTOCOL", "HTTP/1.1");
    env.set("HTTP_HOST", url.host.as_str());
    env.set("GATEWAY_INTERFACE", "CGI/1.1");
    env.set("REQUEST_METHOD", request.method.as_str());

    match url.query_str() {
        Some(query) => {
            env.set("QUERY_STRING", query);
            env.set("REQUEST_URI", format!("{}?{}", document_uri, query));
        },
        None => env.set("REQUEST_URI", document_uri.as_str())
    }

    if let Some(ref path_info) = target.path_info {
        env.set("PATH_INFO", path_info.as_str());
        env.set("PATH_TRANSLATED",
                root.join(path_info.trim_start_matches('/')).to_string_lossy());
    }

    env.set("SCRIPT_NAME", target.script_name.as_str());
    env.set("DOCUMENT_URI", document_uri);
    env.set("DOCUMENT_ROOT", root.to_string_lossy());
    env.set("SCRIPT_FILENAME", target.physical_path.to_string_lossy());
    env.set("REDIRECT_STATUS", "200");

    let mut from_headers = CgiEnvironment::new();
    for (name, value) in request.headers.iter() {
        if name.eq_ignore_ascii_case("Proxy") {
            debug!("Dropping a Proxy request header");
            continue;
        }

        if !is_token(name) || value.contains('\0') {
            debug!("Dropping unrepresentable request header {:?}", name);
            continue;
        }

        let var = if name.eq_ignore_ascii_case("Content-Type") {
            String::from("CONTENT_TYPE")
        }
        else {
            format!("HTTP_{}", name.replace('-', "_").to_ascii_uppercase())
        };

        let joined = match from_headers.get(&var) {
            Some(previous) => format!("{}, {}", previous, value),
            None => String::from(value)
        };
        from_headers.set(var, joined);
    }

    for (name, value) in from_headers.iter() {
        if !env.contains(name) {
            env.set(name, value);
        }
    }

    let mut content_length = 0;
    for element in &request.body {
        content_length += element.current_size()?;
    }
    env.set("CONTENT_LENGTH", content_length.to_string());

    Ok(env)
}

/// Header names that can stand in a variable name once hyphens are swapped
fn is_token(name: &str) -> bool {
    !name.is_empty() &&
        name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::errors::Error;
    use crate::gateway::BodyElement;

    use std::fs;
    use std::path::{Path, PathBuf};

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.site.document_root = root.to_path_buf();
        config.cgi.server_software = String::from("test-gateway");
        config
    }

    fn target(root: &Path, script_name: &str, path_info: Option<&str>) -> Target {
        Target {
            physical_path: root.join(script_name.trim_start_matches('/')),
            script_name: String::from(script_name),
            path_info: path_info.map(String::from),
            is_script: true
        }
    }

    #[test]
    fn fixed_variables_are_set() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("GET", "http://cgi.local/app/info.php?x=1").unwrap();
        let env = build(&request, "app/info.php",
                        &target(&root, "/app/info.php", None), &config(&root)).unwrap();

        assert_eq!(env.get("SERVER_SOFTWARE"), Some("test-gateway"));
        assert_eq!(env.get("SERVER_NAME"), Some("cgi.local"));
        assert_eq!(env.get("SERVER_PORT"), Some("80"));
        assert_eq!(env.get("SERVER_PROTOCOL"), Some("HTTP/1.1"));
        assert_eq!(env.get("HTTP_HOST"), Some("cgi.local"));
        assert_eq!(env.get("GATEWAY_INTERFACE"), Some("CGI/1.1"));
        assert_eq!(env.get("REQUEST_METHOD"), Some("GET"));
        assert_eq!(env.get("QUERY_STRING"), Some("x=1"));
        assert_eq!(env.get("REQUEST_URI"), Some("/app/info.php?x=1"));
        assert_eq!(env.get("SCRIPT_NAME"), Some("/app/info.php"));
        assert_eq!(env.get("DOCUMENT_URI"), Some("/app/info.php"));
        assert_eq!(env.get("DOCUMENT_ROOT"), Some("/srv/htdocs"));
        assert_eq!(env.get("SCRIPT_FILENAME"), Some("/srv/htdocs/app/info.php"));
        assert_eq!(env.get("REDIRECT_STATUS"), Some("200"));
        assert_eq!(env.get("CONTENT_LENGTH"), Some("0"));
        assert!(!env.contains("PATH_INFO"));
    }

    #[test]
    fn empty_query_leaves_query_string_out() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("GET", "http://cgi.local/index.php?").unwrap();
        let env = build(&request, "index.php",
                        &target(&root, "/index.php", None), &config(&root)).unwrap();

        assert!(!env.contains("QUERY_STRING"));
        assert_eq!(env.get("REQUEST_URI"), Some("/index.php"));
    }

    #[test]
    fn path_info_is_passed_along() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("GET", "http://cgi.local/app/info.php/users/7").unwrap();
        let env = build(&request, "app/info.php/users/7",
                        &target(&root, "/app/info.php", Some("/users/7")),
                        &config(&root)).unwrap();

        assert_eq!(env.get("PATH_INFO"), Some("/users/7"));
        assert_eq!(env.get("PATH_TRANSLATED"), Some("/srv/htdocs/users/7"));
        assert_eq!(env.get("SCRIPT_NAME"), Some("/app/info.php"));
    }

    #[test]
    fn headers_become_http_variables() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("POST", "http://cgi.local/form.php").unwrap()
            .with_header("User-Agent", "test")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_header("X-Forwarded-For", "a")
            .with_header("x-forwarded-for", "b");
        let env = build(&request, "form.php",
                        &target(&root, "/form.php", None), &config(&root)).unwrap();

        assert_eq!(env.get("HTTP_USER_AGENT"), Some("test"));
        assert_eq!(env.get("CONTENT_TYPE"), Some("application/x-www-form-urlencoded"));
        assert!(!env.contains("HTTP_CONTENT_TYPE"));
        assert_eq!(env.get("HTTP_X_FORWARDED_FOR"), Some("a, b"));
    }

    #[test]
    fn proxy_header_never_reaches_the_script() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("GET", "http://cgi.local/index.php").unwrap()
            .with_header("PROXY", "http://evil.example:8080")
            .with_header("proxy", "http://evil.example:8080");
        let env = build(&request, "index.php",
                        &target(&root, "/index.php", None), &config(&root)).unwrap();

        assert!(!env.contains("HTTP_PROXY"));
        assert!(env.iter().all(|(_, v)| !v.contains("evil")));
    }

    #[test]
    fn host_header_does_not_override_virtual_host() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("GET", "http://cgi.local/index.php").unwrap()
            .with_header("Host", "elsewhere");
        let env = build(&request, "index.php",
                        &target(&root, "/index.php", None), &config(&root)).unwrap();

        assert_eq!(env.get("HTTP_HOST"), Some("cgi.local"));
    }

    #[test]
    fn content_length_sums_every_body_element() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload.bin");
        fs::write(&upload, vec![7u8; 1000]).unwrap();

        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("POST", "http://cgi.local/up.php").unwrap()
            .with_body(BodyElement::Bytes(b"--boundary\r\n".to_vec()))
            // the host's idea of the size is stale; the disk wins
            .with_body(BodyElement::File { path: upload, size: 10 })
            .with_body(BodyElement::Bytes(b"\r\n--boundary--".to_vec()));
        let env = build(&request, "up.php",
                        &target(&root, "/up.php", None), &config(&root)).unwrap();

        assert_eq!(env.get("CONTENT_LENGTH"), Some("1026"));
        assert_eq!(env.iter().filter(|&(n, _)| n == "CONTENT_LENGTH").count(), 1);
    }

    #[test]
    fn missing_upload_file_fails_the_request() {
        let root = PathBuf::from("/srv/htdocs");
        let request = Request::new("POST", "http://cgi.local/up.php").unwrap()
            .with_body(BodyElement::File { path: PathBuf::from("/nonexistent/x"), size: 3 });

        match build(&request, "up.php", &target(&root, "/up.php", None), &config(&root)) {
            Err(Error::BodyStreamFailure { .. }) => (),
            other => panic!("{:?}", other)
        }
    }
}
