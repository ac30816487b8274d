//! Error types
//!
//! One error enum covers the whole crate. Lifecycle errors (resource,
//! capacity, registration) are returned synchronously to the caller;
//! streaming errors (read, encode) travel through error handlers and logs.

use std::sync::Arc;

/// Boxed error produced by an external collaborator (reader, driver, encoder, track)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MediaError>;

/// Error type for media distribution operations
///
/// Cheap to clone so that a single read failure can be handed to every
/// consumer attached to a broadcast engine.
#[derive(Debug, Clone)]
pub enum MediaError {
    /// The source reader failed to produce a unit
    Read(Arc<dyn std::error::Error + Send + Sync>),
    /// A cancellation token fired while waiting
    Cancelled,
    /// The handle or source was already closed
    Closed,
    /// The resource is still referenced by another source
    ResourceInUse(String),
    /// No registry entry exists for the label
    UnknownResource(String),
    /// Opening or closing a driver failed
    Driver {
        /// Label of the driver
        label: String,
        /// Underlying failure
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    /// Encoding a single unit failed
    Encode(String),
    /// Constructing an encoder for a new shape failed
    ShapeReinit(String),
    /// A sink with the same name is already registered
    RegistrationConflict(String),
    /// Too many distinct broadcast engines on one source
    CapacityExceeded(usize),
    /// Configuration rejected at construction time
    InvalidConfig(String),
    /// The sink has been stopped and accepts no more input
    SinkStopped(String),
}

impl MediaError {
    /// Wrap a reader failure
    pub fn read(err: impl Into<BoxError>) -> Self {
        MediaError::Read(Arc::from(err.into()))
    }

    /// Wrap a driver open/close failure
    pub fn driver(label: impl Into<String>, err: impl Into<BoxError>) -> Self {
        MediaError::Driver {
            label: label.into(),
            source: Arc::from(err.into()),
        }
    }

    /// Whether this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Compare two errors by kind and message.
    ///
    /// Used to detect consecutive identical read failures.
    pub fn same_as(&self, other: &MediaError) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.to_string() == other.to_string()
    }
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::Read(e) => write!(f, "Read failed: {}", e),
            MediaError::Cancelled => write!(f, "Cancelled"),
            MediaError::Closed => write!(f, "Closed"),
            MediaError::ResourceInUse(label) => write!(f, "Resource still in use: {}", label),
            MediaError::UnknownResource(label) => write!(f, "Unknown resource: {}", label),
            MediaError::Driver { label, source } => {
                write!(f, "Driver {} failed: {}", label, source)
            }
            MediaError::Encode(msg) => write!(f, "Encode failed: {}", msg),
            MediaError::ShapeReinit(msg) => write!(f, "Encoder re-initialization failed: {}", msg),
            MediaError::RegistrationConflict(name) => {
                write!(f, "Stream already registered: {}", name)
            }
            MediaError::CapacityExceeded(limit) => {
                write!(f, "Reached max broadcast engines of {}", limit)
            }
            MediaError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            MediaError::SinkStopped(name) => write!(f, "Sink stopped: {}", name),
        }
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MediaError::Read(e) => Some(e.as_ref()),
            MediaError::Driver { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
