//! XEmbed Host
//!
//! This crate hosts an audio plugin editor that lives in another process (or
//! another toolkit) inside a window of the plugin host, on X11, using the
//! XEmbed protocol.
//!
//! # Architecture
//!
//! The host opens a top-level window containing an override-redirect
//! container window. The id of the container is handed to the plugin, which
//! creates its editor window as a child of it. From then on:
//!
//! 1. The container notices the new child and reads its `_XEMBED_INFO`
//! 2. The host sends `XEMBED_EMBEDDED_NOTIFY`, maps and sizes the plug, and
//!    activates and focuses it
//! 3. Focus changes of the top-level are forwarded as window
//!    activation/deactivation, focus requests of the plug are granted
//!
//! Everything runs on one thread, driven by a [`RunLoop`] that multiplexes
//! the X connection with the plugin's own file descriptors and timers.
//!
//! # Usage
//!
//! ```ignore
//! use xembed_host::{Display, RunLoop, Size, WindowOptions, X11Window};
//!
//! let display = Display::connect(None)?;
//! let mut run_loop = RunLoop::new()?;
//! run_loop.attach_display(display.clone())?;
//!
//! let window = X11Window::open(
//!     display,
//!     run_loop.handle(),
//!     WindowOptions {
//!         title: "My Plugin".into(),
//!         size: Size::new(800, 600),
//!         resizable: true,
//!     },
//!     controller,
//! )?;
//! // hand window.native_window() to the plugin, then:
//! window.show()?;
//! run_loop.run()?;
//! ```

mod display;
mod embedder;
mod error;
mod event;
mod lifecycle;
mod plug_loop;
mod run_loop;
mod window;
pub mod xembed;

/// Window sizes in physical pixels
pub type Size = dpi::PhysicalSize<u32>;

pub use display::{Atoms, Display};
pub use embedder::{EmbedAction, EmbedState, Plug};
pub use error::{Error, RegistrationError, Result};
pub use event::{event_window, EventTranslator, HostEvent, PlugEvent};
pub use lifecycle::{HostAction, HostLifecycle};
pub use plug_loop::{EventHandler, PlugRunLoop, TimerHandler};
pub use run_loop::{RunLoop, RunLoopHandle, TimerId, WindowHandler};
pub use window::{size_hints, WindowClosedFn, WindowController, WindowOptions, X11Window};
