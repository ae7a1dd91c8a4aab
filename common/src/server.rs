use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::HttpAuthConfig;
use crate::http::{self, parse_request, Response, Route};
use crate::pages;
use crate::state::DeviceState;
use crate::storage::StorageManager;

const REQUEST_BUFFER_LEN: usize = 1024;
const READ_TIMEOUT: Duration = Duration::from_millis(500);

// Work the server defers back to the tick loop: the response has already
// been flushed when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Capture,
    Reboot,
}

pub struct ControlServer {
    listener: TcpListener,
    auth: Option<HttpAuthConfig>,
}

impl ControlServer {
    pub fn bind(port: u16, auth: Option<HttpAuthConfig>) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        info!("control server listening on {}", listener.local_addr()?);
        Ok(Self { listener, auth })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    // One bounded accept-serve-close cycle per tick. No pending connection is
    // the expected steady state, not an error.
    pub fn poll_once(
        &mut self,
        storage: &mut StorageManager,
        state: &mut DeviceState,
    ) -> Option<ServerCommand> {
        let (stream, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return None,
            Err(err) => {
                warn!("accept failed: {err}");
                return None;
            }
        };

        debug!("client connected from {peer}");
        match self.serve(stream, storage, state) {
            Ok(command) => command,
            Err(err) if is_transient(&err) => {
                debug!("client {peer} went away: {err}");
                None
            }
            Err(err) => {
                warn!("request from {peer} failed: {err}");
                None
            }
        }
    }

    fn serve(
        &self,
        mut stream: TcpStream,
        storage: &mut StorageManager,
        state: &mut DeviceState,
    ) -> io::Result<Option<ServerCommand>> {
        // The accepted stream inherits non-blocking mode on some platforms;
        // flip it back and bound the read with a timeout instead.
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut buf = [0u8; REQUEST_BUFFER_LEN];
        let read = stream.read(&mut buf)?;
        if read == 0 {
            return Ok(None);
        }

        let Some(request) = parse_request(&buf[..read]) else {
            send(&mut stream, &Response::html(404, pages::not_found()))?;
            return Ok(None);
        };

        if !http::authorized(self.auth.as_ref(), &request) {
            send(&mut stream, &Response::unauthorized())?;
            return Ok(None);
        }

        let route = Route::resolve(&request.method, &request.path);
        debug!("{} {} -> {route:?}", request.method, request.path);

        let (response, command) = match route {
            Route::Index => {
                let photos = storage.list_photos();
                let total = storage.total_size();
                (
                    Response::html(200, pages::index(state, &photos, total)),
                    None,
                )
            }
            // Respond first, capture after: the client is never blocked on
            // camera latency, so HTTP completion only means "scheduled".
            Route::CaptureNow => (
                Response::html(200, pages::capture_scheduled()),
                Some(ServerCommand::Capture),
            ),
            Route::DeleteAll => {
                let (deleted, errors) = storage.delete_all(state);
                (
                    Response::html(200, pages::delete_result(deleted, errors)),
                    None,
                )
            }
            Route::Format => {
                let outcome = storage.format_volume(state);
                let status = if outcome.success { 200 } else { 500 };
                (Response::html(status, pages::format_result(&outcome)), None)
            }
            Route::Sync => {
                let ok = storage.sync();
                let status = if ok { 200 } else { 500 };
                (Response::html(status, pages::sync_result(ok)), None)
            }
            Route::Reboot => (
                Response::html(200, pages::rebooting()),
                Some(ServerCommand::Reboot),
            ),
            Route::NotFound => (Response::html(404, pages::not_found()), None),
        };

        send(&mut stream, &response)?;
        Ok(command)
    }
}

fn send(stream: &mut TcpStream, response: &Response) -> io::Result<()> {
    stream.write_all(&response.to_bytes())?;
    stream.flush()?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};
    use std::net::TcpStream;

    use base64::prelude::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::config::{HttpAuthConfig, StorageConfig};
    use crate::hal::mock::MockMedium;
    use crate::http::sha256_hex;

    fn mounted_storage(dir: &TempDir) -> (StorageManager, DeviceState) {
        let config = StorageConfig {
            mount_point: dir.path().join("sdcard").display().to_string(),
            ..StorageConfig::default()
        };
        let mut storage = StorageManager::new(config, Box::new(MockMedium::default()));
        let mut state = DeviceState::new();
        storage.mount(&mut state).unwrap();
        (storage, state)
    }

    // Single-threaded request helper: the connection waits in the listener
    // backlog until poll_once accepts it.
    fn exchange(
        server: &mut ControlServer,
        storage: &mut StorageManager,
        state: &mut DeviceState,
        request: &str,
    ) -> (String, Option<ServerCommand>) {
        let addr = server.local_addr().unwrap();
        let mut client = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();
        client.write_all(request.as_bytes()).unwrap();

        let command = server.poll_once(storage, state);

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        (response, command)
    }

    #[test]
    fn idle_poll_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        let mut server = ControlServer::bind(0, None).unwrap();

        assert_eq!(server.poll_once(&mut storage, &mut state), None);
    }

    #[test]
    fn index_page_lists_photos() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        std::fs::write(storage.photo_dir().join("photo_0000_x.jpg"), b"abc").unwrap();
        let mut server = ControlServer::bind(0, None).unwrap();

        let (response, command) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET / HTTP/1.1\r\n\r\n",
        );

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("photo_0000_x.jpg"));
        assert_eq!(command, None);
    }

    #[test]
    fn capture_route_defers_the_capture() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        let mut server = ControlServer::bind(0, None).unwrap();

        let (response, command) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET /takePhoto HTTP/1.1\r\n\r\n",
        );

        assert!(response.contains("Capture scheduled"));
        assert_eq!(command, Some(ServerCommand::Capture));
        // The response never claims the photo exists already.
        assert_eq!(state.sequence, 0);
    }

    #[test]
    fn format_then_index_reports_zero() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        state.sequence = 4;
        std::fs::write(storage.photo_dir().join("photo_0003_x.jpg"), b"abc").unwrap();
        let mut server = ControlServer::bind(0, None).unwrap();

        let (response, _) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET /format HTTP/1.1\r\n\r\n",
        );
        assert!(response.contains("Volume formatted"));

        let (response, _) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET / HTTP/1.1\r\n\r\n",
        );
        assert!(response.contains("0 photos on storage (0 KiB), next sequence 0000"));
    }

    #[test]
    fn delete_route_reports_count() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        std::fs::write(storage.photo_dir().join("photo_0000_x.jpg"), b"a").unwrap();
        std::fs::write(storage.photo_dir().join("photo_0001_x.jpg"), b"b").unwrap();
        let mut server = ControlServer::bind(0, None).unwrap();

        let (response, _) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET /deleteAll HTTP/1.1\r\n\r\n",
        );

        assert!(response.contains("Deleted 2 photos"));
        assert_eq!(state.sequence, 0);
    }

    #[test]
    fn reboot_route_returns_command() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        let mut server = ControlServer::bind(0, None).unwrap();

        let (response, command) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET /reboot HTTP/1.1\r\n\r\n",
        );

        assert!(response.contains("Rebooting"));
        assert_eq!(command, Some(ServerCommand::Reboot));
    }

    #[test]
    fn unknown_paths_get_404() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        let mut server = ControlServer::bind(0, None).unwrap();

        let (response, _) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            "GET /formatX HTTP/1.1\r\n\r\n",
        );

        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn auth_guards_every_route() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = mounted_storage(&dir);
        let auth = HttpAuthConfig {
            username: "operator".to_string(),
            password_sha256: sha256_hex("hunter2"),
        };
        let mut server = ControlServer::bind(0, Some(auth)).unwrap();

        for path in ["/", "/takePhoto", "/deleteAll", "/format", "/sync", "/reboot"] {
            let (response, command) = exchange(
                &mut server,
                &mut storage,
                &mut state,
                &format!("GET {path} HTTP/1.1\r\n\r\n"),
            );
            assert!(
                response.starts_with("HTTP/1.1 401 Unauthorized"),
                "expected 401 for {path}"
            );
            assert!(response.contains("WWW-Authenticate: Basic"));
            assert_eq!(command, None);
        }

        let credentials = BASE64_STANDARD.encode("operator:hunter2");
        let (response, _) = exchange(
            &mut server,
            &mut storage,
            &mut state,
            &format!("GET / HTTP/1.1\r\nAuthorization: Basic {credentials}\r\n\r\n"),
        );
        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }
}
