//! Error types for the XEmbed host

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

/// Errors that can occur while hosting an embedded window
#[derive(Debug, Error)]
pub enum Error {
    /// Could not open the X11 display
    #[error("failed to connect to the X server: {0}")]
    Connect(#[from] ConnectError),

    /// The X11 connection broke
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A request returned an X11 error instead of a reply
    #[error(transparent)]
    Reply(#[from] ReplyError),

    /// A request or id allocation failed
    #[error(transparent)]
    ReplyOrId(#[from] ReplyOrIdError),

    /// The display has no screen with the requested number
    #[error("screen {0} does not exist on this display")]
    NoScreen(usize),

    /// No 24-bit TrueColor visual is available on the screen
    #[error("no 24-bit TrueColor visual available")]
    NoVisual,

    /// The plug window did not carry a readable `_XEMBED_INFO` property
    #[error("plug window {0:#x} has no readable _XEMBED_INFO property")]
    MissingEmbedInfo(u32),

    /// The plug window announced itself as mapped before being embedded
    #[error("plug window {0:#x} is already mapped")]
    AlreadyMapped(u32),

    /// The host window has already been closed
    #[error("window is closed")]
    Closed,

    /// The file descriptor is already watched by the run loop
    #[error("fd {0} is already registered")]
    FdAlreadyRegistered(std::os::fd::RawFd),

    /// The run loop failed
    #[error("run loop error: {0}")]
    RunLoop(#[from] calloop::Error),

    /// Plain I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned to plugins registering handlers with the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The file descriptor is taken, or the timer interval is zero
    #[error("invalid argument")]
    InvalidArgument,

    /// The handler was never registered
    #[error("handler is not registered")]
    NotRegistered,

    /// The underlying event loop refused the source
    #[error("event loop rejected the registration")]
    Rejected,
}
