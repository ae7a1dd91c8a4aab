use core::fmt::Write as _;

use base64::prelude::*;
use sha2::{Digest, Sha256};

use crate::config::HttpAuthConfig;

pub const AUTH_REALM: &str = "photostation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

// Single bounded read, request line plus the one header we care about.
pub fn parse_request(buf: &[u8]) -> Option<Request> {
    let text = String::from_utf8_lossy(buf);
    let mut lines = text.lines();

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut authorization = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("authorization") {
                authorization = Some(value.trim().to_string());
            }
        }
    }

    Some(Request {
        method,
        path,
        authorization,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    CaptureNow,
    DeleteAll,
    Format,
    Sync,
    Reboot,
    NotFound,
}

impl Route {
    // Exact matching only: `/formatX` must fall through to NotFound instead
    // of hitting the format handler on a prefix.
    pub fn resolve(method: &str, path: &str) -> Route {
        if !method.eq_ignore_ascii_case("GET") {
            return Route::NotFound;
        }
        match path {
            "/" => Route::Index,
            "/takePhoto" | "/capture" => Route::CaptureNow,
            "/delete" | "/deleteAll" => Route::DeleteAll,
            "/format" => Route::Format,
            "/sync" => Route::Sync,
            "/reboot" => Route::Reboot,
            _ => Route::NotFound,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl Response {
    pub fn html(status: u16, body: String) -> Self {
        Self {
            status,
            headers: vec![
                ("Content-Type", "text/html; charset=utf-8".to_string()),
                ("Connection", "close".to_string()),
            ],
            body,
        }
    }

    pub fn unauthorized() -> Self {
        let mut response = Self::html(
            401,
            "<html><body><h1>401 Unauthorized</h1></body></html>".to_string(),
        );
        response
            .headers
            .push(("WWW-Authenticate", format!("Basic realm=\"{AUTH_REALM}\"")));
        response
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            status_reason(self.status)
        );
        for (name, value) in &self.headers {
            let _ = write!(&mut head, "{name}: {value}\r\n");
        }
        let _ = write!(&mut head, "Content-Length: {}\r\n\r\n", self.body.len());

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

// Basic credentials against the configured username + password digest. With
// no auth configured every request is accepted.
pub fn authorized(auth: Option<&HttpAuthConfig>, request: &Request) -> bool {
    let Some(auth) = auth else {
        return true;
    };
    let Some(header) = request.authorization.as_deref() else {
        return false;
    };

    let Some((scheme, credentials)) = header.split_once(' ') else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return false;
    }

    let Ok(decoded) = BASE64_STANDARD.decode(credentials.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = decoded.split_once(':') else {
        return false;
    };

    username == auth.username
        && sha256_hex(password).eq_ignore_ascii_case(&auth.password_sha256)
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
