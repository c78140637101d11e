use std::{

    path::{Component, Path, PathBuf},
    fs,
};

use tracing::{debug};

use super::{

    error_response,
    parse_request,
    status_response,
};

use crate::{

    error::{EchoError},
    stop::{StopFlag},
};

/// Serve files below `root` on `port` until `stop` is raised.
pub fn run(port: u16, root: &Path, stop: &StopFlag) -> Result<(), EchoError> {
    let root = root.to_path_buf();
    super::serve("Web server", port, stop, |request| respond(request, &root))
}

/// Answer a single GET request with the file it names.
pub fn respond(request: &[u8], root: &Path) -> Vec<u8> {
    let (line, _, _) = match parse_request(request) {

        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Rejecting request, {}", e);
            return error_response(400, "Bad Request")
        }
    };

    if line.method != "GET" {
        return error_response(405, "Method Not Allowed")
    }

    let path = match resolve_path(root, &line.target) {

        Some(path) => path,
        None => return error_response(403, "Forbidden"),
    };

    match fs::read(&path) {

        Ok(contents) => {
            debug!(path = %path.display(), bytes = contents.len(), "Serving file");
            status_response(200, "OK", &contents, content_type(&path))
        }

        Err(e) => {
            debug!(path = %path.display(), "Not serving file: {}", e);
            error_response(404, "Not Found")
        }
    }
}

/// Map a request target onto a path below `root`, `None` when it would escape.
fn resolve_path(root: &Path, target: &str) -> Option<PathBuf> {
    let target = target.split(['?', '#']).next().unwrap_or_default();
    let relative = Path::new(target.trim_start_matches('/'));

    let mut path = root.to_path_buf();
    for component in relative.components() {
        match component {

            Component::Normal(part) => path.push(part),
            Component::CurDir => (),
            _ => return None,
        }
    }

    if path == root || target.ends_with('/') {
        path.push("index.html");
    }

    Some(path)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|extension| extension.to_str()) {

        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn served_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("echotrace-web-{}-{}", name, std::process::id()));
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("index.html"), b"<h1>hi</h1>").unwrap();
        fs::write(root.join("notes.txt"), b"plain").unwrap();
        root
    }

    fn status_line(response: &[u8]) -> String {
        String::from_utf8_lossy(response).lines().next().unwrap_or_default().to_string()
    }

    #[test]
    fn test_serves_existing_file() {
        let root = served_root("file");
        let response = respond(b"GET /notes.txt HTTP/1.1\r\nHost: localhost\r\n\r\n", &root);
        let text = String::from_utf8(response).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nplain"));
    }

    #[test]
    fn test_root_serves_index() {
        let root = served_root("index");
        let response = respond(b"GET / HTTP/1.0\r\n\r\n", &root);
        assert!(String::from_utf8_lossy(&response).ends_with("<h1>hi</h1>"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let root = served_root("missing");
        assert_eq!(status_line(&respond(b"GET /nope.html HTTP/1.1\r\n\r\n", &root)), "HTTP/1.1 404 Not Found");
    }

    #[test]
    fn test_rejections() {
        let root = served_root("reject");
        assert_eq!(status_line(&respond(b"GET /../etc/passwd HTTP/1.1\r\n\r\n", &root)), "HTTP/1.1 403 Forbidden");
        assert_eq!(status_line(&respond(b"POST /index.html HTTP/1.1\r\n\r\n", &root)), "HTTP/1.1 405 Method Not Allowed");
        assert_eq!(status_line(&respond(b"nonsense", &root)), "HTTP/1.1 400 Bad Request");
    }
}
