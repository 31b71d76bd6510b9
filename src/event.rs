//! Event translation from X11 to the host window
//!
//! Sorts raw X11 events into what the top-level window reacts to
//! ([`HostEvent`]) and what the container and plug react to ([`PlugEvent`]).

use crate::display::Atoms;
use crate::xembed::Message;
use crate::Size;
use x11rb::protocol::xproto::{Atom, Window};
use x11rb::protocol::Event;

/// The window an event was reported on, used to route it to a handler
pub fn event_window(event: &Event) -> Option<Window> {
    let window = match event {
        Event::Expose(e) => e.window,
        Event::ConfigureNotify(e) => e.event,
        Event::MapNotify(e) => e.event,
        Event::UnmapNotify(e) => e.event,
        Event::DestroyNotify(e) => e.event,
        Event::CreateNotify(e) => e.parent,
        Event::ReparentNotify(e) => e.event,
        Event::ClientMessage(e) => e.window,
        Event::PropertyNotify(e) => e.window,
        Event::FocusIn(e) => e.event,
        Event::FocusOut(e) => e.event,
        Event::ResizeRequest(e) => e.window,
        Event::KeyPress(e) => e.event,
        Event::KeyRelease(e) => e.event,
        Event::ButtonPress(e) => e.event,
        Event::ButtonRelease(e) => e.event,
        Event::MotionNotify(e) => e.event,
        _ => return None,
    };
    Some(window)
}

/// Events the host top-level handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Part of the window needs repainting; `last` marks the end of a series
    Expose { last: bool },
    /// The window manager gave the window a new size
    Configured(Size),
    /// Someone asked to resize the window (needs `ResizeRedirect`)
    ResizeRequested(Size),
    Mapped,
    Unmapped,
    /// `WM_DELETE_WINDOW` from the window manager
    CloseRequested,
    Focus(bool),
}

/// Events the container and plug handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugEvent {
    /// A window appeared under `parent`, by creation or reparenting
    ChildCreated { parent: Window, window: Window },
    /// A window was destroyed or moved out of the container
    ChildGone(Window),
    /// The window's `_XEMBED_INFO` changed
    InfoChanged(Window),
    /// Some other property changed
    PropertyChanged { window: Window, atom: Atom },
    /// A client message; `message` is set for decodable `_XEMBED` messages
    ClientMessage {
        window: Window,
        message_type: Atom,
        message: Option<Message>,
    },
}

/// Translates X11 events for one top-level/container pair
#[derive(Debug, Clone, Copy)]
pub struct EventTranslator {
    window: Window,
    container: Window,
    xembed: Atom,
    xembed_info: Atom,
    wm_protocols: Atom,
    wm_delete_window: Atom,
}

impl EventTranslator {
    pub fn new(window: Window, container: Window, atoms: &Atoms) -> Self {
        Self {
            window,
            container,
            xembed: atoms._XEMBED,
            xembed_info: atoms._XEMBED_INFO,
            wm_protocols: atoms.WM_PROTOCOLS,
            wm_delete_window: atoms.WM_DELETE_WINDOW,
        }
    }

    /// Translate an event routed to the top-level
    /// Returns None if the top-level doesn't react to it
    pub fn translate_host(&self, event: &Event) -> Option<HostEvent> {
        match event {
            Event::Expose(e) => Some(HostEvent::Expose { last: e.count == 0 }),
            Event::ConfigureNotify(e) if e.window == self.window => Some(HostEvent::Configured(
                Size::new(u32::from(e.width), u32::from(e.height)),
            )),
            Event::ResizeRequest(e) if e.window == self.window => Some(
                HostEvent::ResizeRequested(Size::new(u32::from(e.width), u32::from(e.height))),
            ),
            Event::MapNotify(e) if e.window == self.window => Some(HostEvent::Mapped),
            Event::UnmapNotify(e) if e.window == self.window => Some(HostEvent::Unmapped),
            Event::ClientMessage(e)
                if e.window == self.window
                    && e.format == 32
                    && e.type_ == self.wm_protocols
                    && e.data.as_data32()[0] == self.wm_delete_window =>
            {
                Some(HostEvent::CloseRequested)
            }
            Event::FocusIn(_) => Some(HostEvent::Focus(true)),
            Event::FocusOut(_) => Some(HostEvent::Focus(false)),
            _ => None,
        }
    }

    /// Translate an event routed to the container or the plug
    pub fn translate_plug(&self, event: &Event) -> Option<PlugEvent> {
        match event {
            Event::CreateNotify(e) => Some(PlugEvent::ChildCreated {
                parent: e.parent,
                window: e.window,
            }),
            Event::ReparentNotify(e) if e.parent == self.container => {
                Some(PlugEvent::ChildCreated {
                    parent: e.parent,
                    window: e.window,
                })
            }
            Event::ReparentNotify(e) => Some(PlugEvent::ChildGone(e.window)),
            Event::DestroyNotify(e) => Some(PlugEvent::ChildGone(e.window)),
            Event::PropertyNotify(e) if e.atom == self.xembed_info => {
                Some(PlugEvent::InfoChanged(e.window))
            }
            Event::PropertyNotify(e) => Some(PlugEvent::PropertyChanged {
                window: e.window,
                atom: e.atom,
            }),
            Event::ClientMessage(e) => {
                let message = (e.type_ == self.xembed && e.format == 32)
                    .then(|| Message::from_words(e.data.as_data32()).ok())
                    .flatten();
                Some(PlugEvent::ClientMessage {
                    window: e.window,
                    message_type: e.type_,
                    message,
                })
            }
            _ => None,
        }
    }
}
