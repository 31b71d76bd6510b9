//! Host window implementation using x11rb
//!
//! A top-level window owns an override-redirect container. The plugin
//! creates its window inside the container and the XEmbed handshake from
//! [`EmbedState`] takes it from there.

use crate::display::Display;
use crate::embedder::{EmbedAction, EmbedState};
use crate::error::{Error, Result};
use crate::event::{EventTranslator, PlugEvent};
use crate::lifecycle::{HostAction, HostLifecycle};
use crate::plug_loop::PlugRunLoop;
use crate::run_loop::RunLoopHandle;
use crate::xembed::XEmbedInfo;
use crate::Size;
use raw_window_handle::{HasRawWindowHandle, RawWindowHandle, XcbWindowHandle};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use x11rb::connection::Connection;
use x11rb::properties::WmSizeHints;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ColormapAlloc, ConfigureWindowAux, ConnectionExt as _,
    CreateGCAux, CreateWindowAux, EventMask, Gcontext, PropMode, Rectangle, Screen, VisualClass,
    Visualid, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::wrapper::ConnectionExt as _;

/// Smallest width and height a resizable host window may shrink to
pub const MIN_RESIZABLE_EXTENT: i32 = 80;

const BORDER_WIDTH: u16 = 1;

/// Options for opening a host window
#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub size: Size,
    pub resizable: bool,
}

/// Receives lifecycle notifications of a host window
///
/// Callbacks run on the run loop thread while the window is handling an
/// event; calling back into the window from them is allowed.
pub trait WindowController {
    fn on_show(&self, _window: &X11Window) {}

    fn on_close(&self, _window: &X11Window) {}

    fn on_resize(&self, _window: &X11Window, _size: Size) {}

    /// Adjust a size proposed by the window manager
    fn constrain_size(&self, _window: &X11Window, size: Size) -> Size {
        size
    }
}

/// Called once after the host window has been destroyed
pub type WindowClosedFn = Box<dyn FnOnce(&X11Window)>;

/// Host window with an XEmbed container for a plugin editor
#[derive(Clone)]
pub struct X11Window {
    inner: Rc<Inner>,
}

struct Inner {
    display: Rc<Display>,
    run_loop: RunLoopHandle,
    plug_loop: PlugRunLoop,
    controller: Rc<dyn WindowController>,
    on_closed: RefCell<Option<WindowClosedFn>>,
    translator: EventTranslator,
    window: Window,
    container: Window,
    gc: Gcontext,
    lifecycle: Cell<HostLifecycle>,
    embed: RefCell<EmbedState>,
}

impl X11Window {
    /// Create the host window and its container
    ///
    /// The window is not shown until [`X11Window::show`] is called.
    pub fn open(
        display: Rc<Display>,
        run_loop: RunLoopHandle,
        options: WindowOptions,
        controller: Rc<dyn WindowController>,
    ) -> Result<Self> {
        let conn = display.conn();
        let atoms = *display.atoms();
        let screen = display.screen()?;
        let (root, white, black) = (screen.root, screen.white_pixel, screen.black_pixel);
        let (depth, visual) = find_truecolor_visual(screen).ok_or(Error::NoVisual)?;
        let (width, height) = (extent(options.size.width), extent(options.size.height));

        let colormap = conn.generate_id()?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, root, visual)?;

        let window = conn.generate_id()?;
        conn.create_window(
            depth,
            window,
            root,
            0,
            0,
            width,
            height,
            BORDER_WIDTH,
            WindowClass::INPUT_OUTPUT,
            visual,
            &CreateWindowAux::new()
                .background_pixel(white)
                .border_pixel(black)
                .colormap(colormap)
                .event_mask(
                    EventMask::EXPOSURE
                        | EventMask::STRUCTURE_NOTIFY
                        | EventMask::SUBSTRUCTURE_NOTIFY
                        | EventMask::FOCUS_CHANGE,
                ),
        )?;

        size_hints(options.size, options.resizable).set_normal_hints(conn, window)?;

        let title = options.title.as_bytes();
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title,
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            atoms._NET_WM_NAME,
            atoms.UTF8_STRING,
            title,
        )?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_ICON_NAME,
            AtomEnum::STRING,
            title,
        )?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            &[atoms.WM_DELETE_WINDOW],
        )?;

        let gc = conn.generate_id()?;
        conn.create_gc(
            gc,
            window,
            &CreateGCAux::new().foreground(white).background(black),
        )?;

        let container = conn.generate_id()?;
        conn.create_window(
            depth,
            container,
            window,
            0,
            0,
            width,
            height,
            BORDER_WIDTH,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(white)
                .border_pixel(black)
                .colormap(colormap)
                .override_redirect(1)
                .event_mask(EventMask::SUBSTRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE),
        )?;
        conn.map_window(container)?;
        conn.flush()?;

        tracing::info!(
            "host window {:#x} created, container {:#x}, {}x{}",
            window,
            container,
            options.size.width,
            options.size.height
        );

        let host = Self {
            inner: Rc::new(Inner {
                translator: EventTranslator::new(window, container, &atoms),
                plug_loop: PlugRunLoop::new(run_loop.clone()),
                display,
                run_loop,
                controller,
                on_closed: RefCell::new(None),
                window,
                container,
                gc,
                lifecycle: Cell::new(HostLifecycle::new(options.size)),
                embed: RefCell::new(EmbedState::new(container)),
            }),
        };

        host.register_handler(container, Self::handle_plug_event);
        host.register_handler(window, Self::handle_host_event);
        Ok(host)
    }

    /// Set the callback invoked after the window has been destroyed
    pub fn set_on_closed<F>(&self, on_closed: F)
    where
        F: FnOnce(&X11Window) + 'static,
    {
        *self.inner.on_closed.borrow_mut() = Some(Box::new(on_closed));
    }

    /// The container window the plugin should parent its editor to
    pub fn native_window(&self) -> Window {
        self.inner.container
    }

    /// Run loop for the plugin's own fds and timers
    pub fn run_loop(&self) -> &PlugRunLoop {
        &self.inner.plug_loop
    }

    pub fn is_open(&self) -> bool {
        self.inner.lifecycle.get().is_open()
    }

    /// The embedded plug window, once the handshake has happened
    pub fn plug_window(&self) -> Option<Window> {
        self.inner.embed.borrow().plug().map(|plug| plug.window)
    }

    pub fn show(&self) -> Result<()> {
        self.ensure_open()?;
        let conn = self.inner.display.conn();
        conn.map_window(self.inner.window)?;
        conn.flush()?;
        Ok(())
    }

    /// Unmap the window. The window is destroyed once the unmap arrives.
    pub fn close(&self) -> Result<()> {
        self.ensure_open()?;
        let conn = self.inner.display.conn();
        conn.unmap_window(self.inner.window)?;
        conn.flush()?;
        Ok(())
    }

    /// Current size as reported by the server
    pub fn size(&self) -> Result<Size> {
        self.ensure_open()?;
        let geometry = self
            .inner
            .display
            .conn()
            .get_geometry(self.inner.window)?
            .reply()?;
        Ok(Size::new(
            u32::from(geometry.width),
            u32::from(geometry.height),
        ))
    }

    pub fn resize(&self, size: Size) -> Result<()> {
        self.ensure_open()?;
        let actions = self.update_lifecycle(|state| state.resize(size, false));
        self.run_host_actions(&actions)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    fn update_lifecycle<T>(&self, f: impl FnOnce(&mut HostLifecycle) -> T) -> T {
        let mut state = self.inner.lifecycle.get();
        let result = f(&mut state);
        self.inner.lifecycle.set(state);
        result
    }

    fn configure(&self, size: Size, top_level: bool) -> Result<()> {
        let conn = self.inner.display.conn();
        let aux = ConfigureWindowAux::new().width(size.width).height(size.height);
        if top_level {
            conn.configure_window(self.inner.window, &aux)?;
        }
        conn.configure_window(self.inner.container, &aux)?;
        if let Some(plug) = self.plug_window() {
            conn.configure_window(plug, &aux)?;
        }
        conn.flush()?;
        Ok(())
    }

    fn register_handler(&self, window: Window, handler: fn(&X11Window, &Event) -> Result<bool>) {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        self.inner.run_loop.register_window(window, move |event| {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let host = X11Window { inner };
            handler(&host, event).unwrap_or_else(|e| {
                tracing::error!("error handling event for {:#x}: {}", window, e);
                true
            })
        });
    }

    fn handle_host_event(&self, event: &Event) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }
        let Some(host_event) = self.inner.translator.translate_host(event) else {
            return Ok(false);
        };
        let controller = self.inner.controller.clone();
        let actions = self.update_lifecycle(|state| {
            state.handle(host_event, |size| controller.constrain_size(self, size))
        });
        match actions {
            Some(actions) => self.run_host_actions(&actions).map(|()| true),
            None => Ok(false),
        }
    }

    fn run_host_actions(&self, actions: &[HostAction]) -> Result<()> {
        let controller = self.inner.controller.clone();
        for action in actions {
            match *action {
                HostAction::Paint => self.paint()?,
                HostAction::NotifyShow => controller.on_show(self),
                HostAction::NotifyResize(size) => controller.on_resize(self, size),
                HostAction::NotifyClose => controller.on_close(self),
                HostAction::Resize(size) => self.configure(size, true)?,
                HostAction::ResizeContents(size) => self.configure(size, false)?,
                HostAction::Focus(focused) => {
                    let embed_actions = self.inner.embed.borrow().host_focus_changed(focused);
                    self.apply(&embed_actions)?;
                }
                HostAction::Destroy => self.destroy()?,
            }
        }
        Ok(())
    }

    fn paint(&self) -> Result<()> {
        let conn = self.inner.display.conn();
        let size = self.inner.lifecycle.get().size();
        conn.clear_area(false, self.inner.window, 0, 0, 0, 0)?;
        conn.poly_fill_rectangle(
            self.inner.window,
            self.inner.gc,
            &[Rectangle {
                x: 0,
                y: 0,
                width: extent(size.width),
                height: extent(size.height),
            }],
        )?;
        conn.flush()?;
        Ok(())
    }

    /// Runs once, after the lifecycle has marked the window closed
    fn destroy(&self) -> Result<()> {
        self.inner.plug_loop.clear();

        let run_loop = &self.inner.run_loop;
        run_loop.unregister_window(self.inner.window);
        run_loop.unregister_window(self.inner.container);
        if let Some(plug) = self.plug_window() {
            run_loop.unregister_window(plug);
        }

        let conn = self.inner.display.conn();
        conn.free_gc(self.inner.gc)?;
        conn.destroy_window(self.inner.window)?;
        conn.flush()?;
        tracing::info!("host window {:#x} destroyed", self.inner.window);

        let on_closed = self.inner.on_closed.borrow_mut().take();
        if let Some(on_closed) = on_closed {
            on_closed(self);
        }
        Ok(())
    }

    fn handle_plug_event(&self, event: &Event) -> Result<bool> {
        let Some(plug_event) = self.inner.translator.translate_plug(event) else {
            return Ok(false);
        };

        match plug_event {
            PlugEvent::ClientMessage {
                window,
                message_type,
                message,
            } => {
                if tracing::enabled!(tracing::Level::TRACE) {
                    tracing::trace!(
                        "client message {} on {:#x}",
                        self.inner.display.atom_name(message_type),
                        window
                    );
                }
                let Some(message) = message else {
                    return Ok(false);
                };
                tracing::debug!("<- {:?} from plug", message.opcode);
                let actions = self.inner.embed.borrow().handle_message(message);
                self.apply(&actions)?;
                Ok(true)
            }
            PlugEvent::PropertyChanged { window, atom } => {
                if tracing::enabled!(tracing::Level::TRACE) {
                    tracing::trace!(
                        "property {} changed on {:#x}",
                        self.inner.display.atom_name(atom),
                        window
                    );
                }
                Ok(false)
            }
            PlugEvent::InfoChanged(window) => {
                let info = self.query_info(window);
                let actions = self.inner.embed.borrow_mut().info_changed(window, info);
                self.apply(&actions)?;
                Ok(true)
            }
            PlugEvent::ChildCreated { parent, window } => {
                if !self.inner.embed.borrow().accepts_child_of(parent) {
                    return Ok(true);
                }
                let info = self.query_info(window);
                let size = self.inner.lifecycle.get().size();
                let result = self.inner.embed.borrow_mut().embed(window, info, size);
                match result {
                    Ok(actions) => self.apply(&actions)?,
                    Err(e) => tracing::error!("cannot embed window {:#x}: {}", window, e),
                }
                Ok(true)
            }
            PlugEvent::ChildGone(window) => {
                let actions = self.inner.embed.borrow_mut().child_gone(window);
                self.apply(&actions)?;
                Ok(!actions.is_empty())
            }
        }
    }

    fn query_info(&self, window: Window) -> Option<XEmbedInfo> {
        let atom = self.inner.display.atoms()._XEMBED_INFO;
        let reply = self
            .inner
            .display
            .conn()
            .get_property(false, window, atom, atom, 0, 2)
            .map_err(Error::from)
            .and_then(|cookie| cookie.reply().map_err(Error::from));

        match reply {
            Ok(reply) => XEmbedInfo::from_words(reply.value32()?),
            Err(e) => {
                tracing::debug!("reading _XEMBED_INFO of {:#x} failed: {}", window, e);
                None
            }
        }
    }

    fn apply(&self, actions: &[EmbedAction]) -> Result<()> {
        let display = &self.inner.display;
        let conn = display.conn();

        for action in actions {
            match *action {
                EmbedAction::Watch(window) => {
                    conn.change_window_attributes(
                        window,
                        &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
                    )?;
                    self.register_handler(window, Self::handle_plug_event);
                }
                EmbedAction::Unwatch(window) => self.inner.run_loop.unregister_window(window),
                EmbedAction::Send(window, message) => {
                    tracing::debug!("-> {:?} to {:#x}", message.opcode, window);
                    conn.send_event(
                        false,
                        window,
                        EventMask::NO_EVENT,
                        message.to_event(window, display.atoms()._XEMBED),
                    )?;
                    conn.flush()?;
                }
                EmbedAction::Map(window) => {
                    conn.map_window(window)?;
                }
                EmbedAction::Unmap(window) => {
                    conn.unmap_window(window)?;
                }
                EmbedAction::Resize(window, size) => {
                    conn.configure_window(
                        window,
                        &ConfigureWindowAux::new().width(size.width).height(size.height),
                    )?;
                }
                EmbedAction::Sync => display.sync()?,
            }
        }
        conn.flush()?;
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.run_loop.unregister_window(self.window);
        self.run_loop.unregister_window(self.container);
        if let Some(plug) = self.embed.get_mut().plug() {
            self.run_loop.unregister_window(plug.window);
        }
    }
}

unsafe impl HasRawWindowHandle for X11Window {
    fn raw_window_handle(&self) -> RawWindowHandle {
        let mut handle = XcbWindowHandle::empty();
        handle.window = self.inner.container;
        RawWindowHandle::Xcb(handle)
    }
}

/// WM_NORMAL_HINTS for a host window of `size`
pub fn size_hints(size: Size, resizable: bool) -> WmSizeHints {
    let mut hints = WmSizeHints::new();
    if resizable {
        hints.min_size = Some((MIN_RESIZABLE_EXTENT, MIN_RESIZABLE_EXTENT));
    } else {
        let fixed = (
            i32::try_from(size.width).unwrap_or(i32::MAX),
            i32::try_from(size.height).unwrap_or(i32::MAX),
        );
        hints.min_size = Some(fixed);
        hints.max_size = Some(fixed);
    }
    hints
}

/// First 24-bit TrueColor visual of the screen
fn find_truecolor_visual(screen: &Screen) -> Option<(u8, Visualid)> {
    screen
        .allowed_depths
        .iter()
        .filter(|depth| depth.depth == 24)
        .flat_map(|depth| depth.visuals.iter().map(move |visual| (depth.depth, visual)))
        .find(|(_, visual)| visual.class == VisualClass::TRUE_COLOR)
        .map(|(depth, visual)| (depth, visual.visual_id))
}

/// X11 window extents are 16 bit
fn extent(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
