use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use runtime::{CancellationToken, JoinOutcome, TaskHandle};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::protocol::header_value;

/// Receives the lines of one request.
pub type LineSink = Arc<dyn Fn(Vec<String>) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("cannot bind callback listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("cannot build callback listener runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("cannot spawn callback listener thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub thread_name: String,
    /// Upper bound of a single accept wait; cancellation is noticed at this cadence.
    pub accept_timeout: Duration,
    /// Upper bound for reading one request.
    pub read_timeout: Duration,
    pub max_connections: usize,
    /// Upper bound for the bytes of one request; larger requests are dropped.
    pub max_request_bytes: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            thread_name: "MapViewCallbackListener".to_string(),
            accept_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
            max_connections: 16,
            max_request_bytes: 64 * 1024,
        }
    }
}

/// Loopback listener for callback requests of the rendering surface.
///
/// Runs a current-thread tokio runtime on its own named thread. Each
/// connection is read up to the end of its request and handed to the sink.
pub struct CallbackListener {
    port: u16,
    token: CancellationToken,
    task: Option<TaskHandle>,
    join_grace: Duration,
}

impl CallbackListener {
    /// Binds `127.0.0.1` on an ephemeral port and starts accepting.
    pub fn bind(settings: ListenerSettings, sink: LineSink) -> Result<Self, ListenerError> {
        let std_listener = std::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .map_err(ListenerError::Bind)?;
        std_listener
            .set_nonblocking(true)
            .map_err(ListenerError::Bind)?;
        let port = std_listener.local_addr().map_err(ListenerError::Bind)?.port();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ListenerError::Runtime)?;

        let token = CancellationToken::new();
        let join_grace = settings.accept_timeout * 2;
        let task = {
            let token = token.clone();
            let name = settings.thread_name.clone();
            TaskHandle::spawn(name, move || {
                rt.block_on(async move {
                    match TcpListener::from_std(std_listener) {
                        Ok(listener) => accept_loop(listener, settings, sink, token).await,
                        Err(err) => warn!(error = %err, "cannot register callback listener socket"),
                    }
                });
            })
            .map_err(ListenerError::Spawn)?
        };
        info!(port, "callback listener started");

        Ok(Self {
            port,
            token,
            task: Some(task),
            join_grace,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancels the accept loop and joins the listener thread. Idempotent.
    pub fn stop(&mut self) -> Option<JoinOutcome> {
        self.token.cancel();
        let task = self.task.take()?;
        let outcome = task.join_timeout(self.join_grace);
        info!(port = self.port, ?outcome, "callback listener stopped");
        Some(outcome)
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackListener")
            .field("port", &self.port)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    settings: ListenerSettings,
    sink: LineSink,
    token: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(settings.max_connections.max(1)));
    while !token.is_cancelled() {
        let (stream, peer) = match timeout(settings.accept_timeout, listener.accept()).await {
            Err(_elapsed) => continue,
            Ok(Err(err)) => {
                warn!(error = %err, "cannot accept callback connection");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            Ok(Ok(accepted)) => accepted,
        };

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let sink = Arc::clone(&sink);
        let read_timeout = settings.read_timeout;
        let max_bytes = settings.max_request_bytes;
        tokio::spawn(async move {
            let _permit = permit;
            match timeout(read_timeout, read_request(stream, max_bytes)).await {
                Ok(Ok(lines)) if !lines.is_empty() => {
                    trace!(%peer, lines = lines.len(), "received callback request");
                    sink(lines);
                }
                Ok(Ok(_)) => trace!(%peer, "empty callback request"),
                Ok(Err(err)) => debug!(%peer, error = %err, "cannot read callback request"),
                Err(_elapsed) => debug!(%peer, "callback request timed out"),
            }
        });
    }
    debug!("callback accept loop finished");
}

/// Reads header lines up to the first blank line; for `POST` also the body.
///
/// A declared `Content-Length` is read as bytes, otherwise body lines are
/// read up to the next blank line or end of stream. Nothing beyond
/// `max_bytes` is read; a body declared larger than what is left of that
/// budget drops the whole request.
async fn read_request(stream: TcpStream, max_bytes: usize) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(stream).take(max_bytes as u64);
    let mut lines = Vec::new();
    let mut buf = String::new();

    loop {
        buf.clear();
        if reader.read_line(&mut buf).await? == 0 {
            break;
        }
        let line = buf.trim();
        if line.is_empty() {
            break;
        }
        lines.push(line.to_string());
    }

    let is_post = lines.first().is_some_and(|l| l.starts_with("POST"));
    if !is_post {
        return Ok(lines);
    }

    let declared = header_value(&lines, "Content-Length").and_then(|v| v.parse::<usize>().ok());
    match declared {
        Some(length) if length as u64 > reader.limit() => {
            warn!(
                declared = length,
                max_bytes, "dropping callback request with oversized body"
            );
            return Ok(Vec::new());
        }
        Some(length) => {
            let mut body = Vec::with_capacity(length);
            (&mut reader).take(length as u64).read_to_end(&mut body).await?;
            lines.extend(
                String::from_utf8_lossy(&body)
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            );
        }
        None => loop {
            buf.clear();
            if reader.read_line(&mut buf).await? == 0 {
                break;
            }
            let line = buf.trim();
            if line.is_empty() {
                break;
            }
            lines.push(line.to_string());
        },
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpStream;
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{CallbackListener, LineSink, ListenerSettings};

    fn start() -> (CallbackListener, mpsc::Receiver<Vec<String>>) {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let sink: LineSink = Arc::new(move |lines| {
            let _ = tx.lock().send(lines);
        });
        let settings = ListenerSettings {
            accept_timeout: Duration::from_millis(100),
            ..ListenerSettings::default()
        };
        (CallbackListener::bind(settings, sink).unwrap(), rx)
    }

    fn send(port: u16, request: &str) {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        stream.flush().unwrap();
    }

    #[test]
    fn reads_get_request_up_to_blank_line() {
        let (mut listener, rx) = start();
        let port = listener.port();
        send(
            port,
            &format!("GET /1/zoomchanged HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\nignored\r\n"),
        );
        let lines = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            lines,
            vec![
                "GET /1/zoomchanged HTTP/1.1".to_string(),
                format!("Host: 127.0.0.1:{port}"),
            ]
        );
        listener.stop();
    }

    #[test]
    fn reads_post_body_by_content_length() {
        let (mut listener, rx) = start();
        let port = listener.port();
        let body = "Insert-All-Waypoints: 7/53.1/10.1/100/20/-";
        send(
            port,
            &format!(
                "POST /2/ HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        );
        let lines = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(lines.last().map(String::as_str), Some(body));
        assert_eq!(lines.len(), 4);
        listener.stop();
    }

    #[test]
    fn oversized_body_is_dropped_and_listener_keeps_serving() {
        let (mut listener, rx) = start();
        let port = listener.port();
        send(
            port,
            &format!(
                "POST /1/ HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nContent-Length: 17592186044416\r\n\r\nzoomchanged"
            ),
        );
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        send(
            port,
            &format!("GET /2/zoomchanged HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n"),
        );
        let lines = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(lines[0], "GET /2/zoomchanged HTTP/1.1");
        assert!(listener.is_running());
        listener.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut listener, _rx) = start();
        assert!(listener.stop().is_some());
        assert!(listener.stop().is_none());
        assert!(!listener.is_running());
    }
}
