use callback::ListenerError;
use runtime::PoolError;

/// Failure reported by a rendering surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurfaceError {
    #[error("rendering surface is unavailable: {0}")]
    Unavailable(String),
    #[error("rendering surface rejected command: {0}")]
    Script(String),
}

/// Failure of a best-effort enrichment lookup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnrichError {
    #[error("{service} is unavailable: {message}")]
    Unavailable { service: String, message: String },
    #[error("{service} returned malformed data: {message}")]
    Malformed { service: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MapViewError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("cannot spawn {name} thread: {source}")]
    Thread {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("map view is already disposed")]
    Disposed,
}
