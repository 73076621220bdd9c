//! The HTTP slice the auth/timeout engine touches, as plain data.
//!
//! # Design
//! Requests and responses are described with owned fields (`String`,
//! `Vec`) and no parser state. This is deliberately not a general HTTP
//! implementation: the engine needs the status line, a handful of headers
//! (content length, challenge, connection), and content-length-delimited
//! bodies — nothing more. Header lookups are case-insensitive.

use crate::error::ClientError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// An outgoing request described as plain data.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// A complete response handed to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Split `http://host[:port]/path` into its parts. Only plain `http` is
/// recognized; the transport layer below this engine owns anything else.
pub(crate) fn split_url(url: &str) -> Result<(String, u16, String), ClientError> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| ClientError::InvalidUrl(format!("expected http:// url, got {url}")))?;
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(ClientError::InvalidUrl(format!("missing host in {url}")));
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => {
            let port = p
                .parse::<u16>()
                .map_err(|_| ClientError::InvalidUrl(format!("bad port in {url}")))?;
            (h.to_string(), port)
        }
        None => (authority.to_string(), 80),
    };
    Ok((host, port, path.to_string()))
}

/// Serialize a request to HTTP/1.1 wire bytes. The optional auth pair is
/// the negotiator's `(header-name, value)` contribution for this attempt.
pub(crate) fn encode_request(
    request: &Request,
    host: &str,
    path: &str,
    auth: Option<(&str, &str)>,
) -> Vec<u8> {
    let mut out = format!("{} {} HTTP/1.1\r\nHost: {}\r\n", request.method.as_str(), path, host);
    for (name, value) in &request.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some((name, value)) = auth {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = &request.body {
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    if let Some(body) = &request.body {
        bytes.extend_from_slice(body);
    }
    bytes
}

/// Status line and headers of a response, parsed before body streaming.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Parse the bytes up to (not including) the blank line.
    pub(crate) fn parse(raw: &[u8]) -> Result<ResponseHead, ClientError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| malformed("response head is not valid utf-8"))?;
        let mut lines = text.split("\r\n");

        let status_line = lines.next().ok_or_else(|| malformed("empty response head"))?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.") {
            return Err(malformed("unsupported protocol version"));
        }
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| malformed("missing status code"))?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed("header line without a colon"))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(ResponseHead { status, headers })
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    /// Declared body length, if the server promised one.
    pub(crate) fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Raw challenge value for this unauthorized status, if present.
    pub(crate) fn challenge(&self) -> Option<&str> {
        match self.status {
            407 => self.header("proxy-authenticate"),
            _ => self.header("www-authenticate"),
        }
    }

    /// HTTP/1.1 defaults to keep-alive unless the server opts out.
    pub(crate) fn keep_alive(&self) -> bool {
        !self
            .header("connection")
            .map_or(false, |v| v.eq_ignore_ascii_case("close"))
    }

    pub(crate) fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 407
    }
}

fn header_lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn malformed(what: &str) -> ClientError {
    ClientError::Connection(crate::error::ConnectionError::Io(format!(
        "malformed response: {what}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_url_with_port_and_path() {
        let (host, port, path) = split_url("http://127.0.0.1:8080/todos").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 8080);
        assert_eq!(path, "/todos");
    }

    #[test]
    fn split_url_defaults_port_and_path() {
        let (host, port, path) = split_url("http://example.com").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 80);
        assert_eq!(path, "/");
    }

    #[test]
    fn split_url_rejects_other_schemes() {
        assert!(matches!(
            split_url("https://example.com/"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn encode_request_includes_host_auth_and_body() {
        let req = Request {
            method: Method::Post,
            url: "http://h:1/p".to_string(),
            headers: vec![("X-Content".to_string(), "Test".to_string())],
            body: Some(b"hello".to_vec()),
        };
        let bytes = encode_request(&req, "h:1", "/p", Some(("Authorization", "Basic abc")));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("POST /p HTTP/1.1\r\nHost: h:1\r\n"));
        assert!(text.contains("X-Content: Test\r\n"));
        assert!(text.contains("Authorization: Basic abc\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn parse_head_extracts_status_and_headers() {
        let head = ResponseHead::parse(
            b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nWWW-Authenticate: Basic realm=\"MyRealm\"",
        )
        .unwrap();
        assert_eq!(head.status, 401);
        assert!(head.is_unauthorized());
        assert_eq!(head.content_length(), Some(0));
        assert_eq!(head.challenge(), Some(r#"Basic realm="MyRealm""#));
        assert!(head.keep_alive());
    }

    #[test]
    fn parse_head_honors_connection_close() {
        let head = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nConnection: close").unwrap();
        assert!(!head.keep_alive());
    }

    #[test]
    fn parse_head_rejects_garbage() {
        assert!(ResponseHead::parse(b"not http at all").is_err());
    }

    #[test]
    fn proxy_challenge_comes_from_proxy_header() {
        let head = ResponseHead::parse(
            b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"p\"",
        )
        .unwrap();
        assert_eq!(head.challenge(), Some(r#"Basic realm="p""#));
    }
}
