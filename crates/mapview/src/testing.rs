//! Test doubles shared by the engine tests.

use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::SurfaceError;
use crate::surface::{RenderCommand, RenderSurface, SurfaceQuery};

/// Surface that records every command and answers queries from canned values.
pub(crate) struct RecordingSurface {
    commands: Mutex<Vec<RenderCommand>>,
    callbacks: Mutex<Vec<String>>,
    zoom: Mutex<Option<i32>>,
    bounds: Mutex<Option<(String, String)>>,
    visible: AtomicBool,
    fail_initialization: bool,
    answer_handshake: bool,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            zoom: Mutex::new(None),
            bounds: Mutex::new(None),
            visible: AtomicBool::new(true),
            fail_initialization: false,
            answer_handshake: false,
        }
    }
}

impl RecordingSurface {
    pub(crate) fn failing() -> Self {
        Self {
            fail_initialization: true,
            ..Self::default()
        }
    }

    /// Connects back to the listener when asked to check the callback port.
    pub(crate) fn answering() -> Self {
        Self {
            answer_handshake: true,
            ..Self::default()
        }
    }

    pub(crate) fn commands(&self) -> Vec<RenderCommand> {
        self.commands.lock().clone()
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.commands.lock().iter().map(RenderCommand::name).collect()
    }

    pub(crate) fn push_callback(&self, callback: &str) {
        self.callbacks.lock().push(callback.to_string());
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub(crate) fn set_zoom(&self, zoom: Option<i32>) {
        *self.zoom.lock() = zoom;
    }

    /// North-east and south-west corners as `"lat,lon"`.
    pub(crate) fn set_bounds(&self, bounds: Option<(&str, &str)>) {
        *self.bounds.lock() = bounds.map(|(ne, sw)| (ne.to_string(), sw.to_string()));
    }

    fn listener_port(&self) -> Option<u16> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            RenderCommand::SetCallbackPort(port) => u16::try_from(*port).ok(),
            _ => None,
        })
    }
}

impl RenderSurface for RecordingSurface {
    fn initialize(&self) -> Result<(), SurfaceError> {
        if self.fail_initialization {
            return Err(SurfaceError::Unavailable("no browser".to_string()));
        }
        Ok(())
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn execute(&self, command: RenderCommand) -> Result<(), SurfaceError> {
        let check = command == RenderCommand::CheckCallbackPort;
        self.commands.lock().push(command);
        if check
            && self.answer_handshake
            && let Some(port) = self.listener_port()
        {
            std::thread::spawn(move || {
                let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
                write!(
                    stream,
                    "GET /1/callback-port/{port} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\n\r\n"
                )
                .unwrap();
            });
        }
        Ok(())
    }

    fn query(&self, query: SurfaceQuery) -> Result<Option<String>, SurfaceError> {
        Ok(match query {
            SurfaceQuery::ZoomLevel => self.zoom.lock().map(|z| z.to_string()),
            SurfaceQuery::NorthEastBounds => self.bounds.lock().as_ref().map(|b| b.0.clone()),
            SurfaceQuery::SouthWestBounds => self.bounds.lock().as_ref().map(|b| b.1.clone()),
            SurfaceQuery::Callbacks => {
                let drained: Vec<String> = self.callbacks.lock().drain(..).collect();
                (!drained.is_empty()).then(|| drained.join("--"))
            }
        })
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
