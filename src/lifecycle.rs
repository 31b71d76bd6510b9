//! Size and lifecycle decisions of the host window
//!
//! [`HostLifecycle`] turns translated [`HostEvent`]s into [`HostAction`]
//! lists without touching the X server, the same way
//! [`EmbedState`](crate::EmbedState) does for the plug. The window executes
//! the actions in order.

use crate::event::HostEvent;
use crate::Size;

/// Something the host window has to do in response to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    /// Repaint the background
    Paint,
    /// Tell the controller the window became visible
    NotifyShow,
    /// Tell the controller about a new size
    NotifyResize(Size),
    /// Tell the controller the window is closing
    NotifyClose,
    /// Configure the top-level, the container and the plug
    Resize(Size),
    /// Configure the container and the plug only
    ResizeContents(Size),
    /// Forward a focus change of the top-level to the plug
    Focus(bool),
    /// Destroy the windows and run the closed callback
    Destroy,
}

/// Size, visibility and open state of a host window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLifecycle {
    size: Size,
    mapped: bool,
    open: bool,
}

impl HostLifecycle {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            mapped: false,
            open: true,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Resize requested by the application. Unless `force` is set, asking
    /// for the current size does nothing.
    pub fn resize(&mut self, size: Size, force: bool) -> Vec<HostAction> {
        if !force && self.size == size {
            return Vec::new();
        }
        self.size = size;
        vec![HostAction::Resize(size)]
    }

    /// Decide how to react to `event`
    ///
    /// `constrain` is asked for the size the controller accepts whenever the
    /// window manager proposes a new one. Returns `None` for events the
    /// window does not consume, including everything after it was closed.
    pub fn handle<F>(&mut self, event: HostEvent, constrain: F) -> Option<Vec<HostAction>>
    where
        F: FnOnce(Size) -> Size,
    {
        if !self.open {
            return None;
        }

        let actions = match event {
            HostEvent::Expose { last: true } => vec![HostAction::Paint],
            HostEvent::Expose { last: false } => Vec::new(),
            HostEvent::Configured(size) => self.configured(size, constrain),
            HostEvent::ResizeRequested(size) => {
                if size == self.size {
                    Vec::new()
                } else {
                    self.resize(constrain(size), true)
                }
            }
            HostEvent::Mapped => {
                if self.mapped {
                    return None;
                }
                self.mapped = true;
                vec![HostAction::NotifyShow]
            }
            HostEvent::Unmapped | HostEvent::CloseRequested => {
                self.open = false;
                self.mapped = false;
                vec![HostAction::NotifyClose, HostAction::Destroy]
            }
            HostEvent::Focus(focused) => vec![HostAction::Focus(focused)],
        };
        Some(actions)
    }

    fn configured<F>(&mut self, size: Size, constrain: F) -> Vec<HostAction>
    where
        F: FnOnce(Size) -> Size,
    {
        if size == self.size {
            return Vec::new();
        }

        let mut actions = Vec::new();
        let constrained = constrain(size);
        if constrained != self.size {
            self.size = size;
            actions.push(HostAction::NotifyResize(size));
        }

        if constrained != size {
            actions.extend(self.resize(constrained, true));
        } else {
            actions.push(HostAction::ResizeContents(size));
        }
        actions
    }
}
