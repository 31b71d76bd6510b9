//! Run loop interface handed to plugin editors
//!
//! Plugins register fd watchers and timers by handler object; identity of
//! the handler is what unregistration matches on.

use crate::error::{Error, RegistrationError};
use crate::run_loop::{RunLoopHandle, TimerId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// Event handler interface offered to the plugin
pub trait EventHandler {
    fn on_fd_is_set(&self, fd: RawFd);
}

/// Timer interface offered to the plugin
pub trait TimerHandler {
    fn on_timer(&self);
}

fn same_handler<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// The run loop a plugin editor uses to watch its own fds and timers
///
/// Registrations are forwarded to the shared [`RunLoop`](crate::RunLoop) and dropped with
/// this object.
pub struct PlugRunLoop {
    run_loop: RunLoopHandle,
    event_handlers: RefCell<HashMap<RawFd, Rc<dyn EventHandler>>>,
    timer_handlers: RefCell<HashMap<TimerId, Rc<dyn TimerHandler>>>,
}

impl PlugRunLoop {
    pub fn new(run_loop: RunLoopHandle) -> Self {
        Self {
            run_loop,
            event_handlers: RefCell::new(HashMap::new()),
            timer_handlers: RefCell::new(HashMap::new()),
        }
    }

    /// Call `handler` whenever `fd` becomes readable
    ///
    /// # Safety
    ///
    /// `fd` must stay open until the handler is unregistered or this run
    /// loop is dropped.
    pub unsafe fn register_event_handler(
        &self,
        handler: Rc<dyn EventHandler>,
        fd: RawFd,
    ) -> Result<(), RegistrationError> {
        if self.event_handlers.borrow().contains_key(&fd) {
            return Err(RegistrationError::InvalidArgument);
        }

        let callback = handler.clone();
        self.run_loop
            .register_file_descriptor(fd, move |fd| callback.on_fd_is_set(fd))
            .map_err(|e| match e {
                Error::FdAlreadyRegistered(_) => RegistrationError::InvalidArgument,
                e => {
                    tracing::warn!("failed to watch fd {}: {}", fd, e);
                    RegistrationError::Rejected
                }
            })?;
        self.event_handlers.borrow_mut().insert(fd, handler);
        Ok(())
    }

    pub fn unregister_event_handler(
        &self,
        handler: &Rc<dyn EventHandler>,
    ) -> Result<(), RegistrationError> {
        let fd = self
            .event_handlers
            .borrow()
            .iter()
            .find(|(_, registered)| same_handler(*registered, handler))
            .map(|(fd, _)| *fd)
            .ok_or(RegistrationError::NotRegistered)?;

        self.run_loop.unregister_file_descriptor(fd);
        self.event_handlers.borrow_mut().remove(&fd);
        Ok(())
    }

    pub fn register_timer(
        &self,
        handler: Rc<dyn TimerHandler>,
        milliseconds: u64,
    ) -> Result<(), RegistrationError> {
        if milliseconds == 0 {
            return Err(RegistrationError::InvalidArgument);
        }

        let callback = handler.clone();
        let id = self
            .run_loop
            .register_timer(Duration::from_millis(milliseconds), move |_| {
                callback.on_timer()
            })
            .map_err(|e| {
                tracing::warn!("failed to register timer: {}", e);
                RegistrationError::Rejected
            })?;
        self.timer_handlers.borrow_mut().insert(id, handler);
        Ok(())
    }

    pub fn unregister_timer(&self, handler: &Rc<dyn TimerHandler>) -> Result<(), RegistrationError> {
        let id = self
            .timer_handlers
            .borrow()
            .iter()
            .find(|(_, registered)| same_handler(*registered, handler))
            .map(|(id, _)| *id)
            .ok_or(RegistrationError::NotRegistered)?;

        self.run_loop.unregister_timer(id);
        self.timer_handlers.borrow_mut().remove(&id);
        Ok(())
    }

    /// Unregister every handler. The run loop stays usable afterwards.
    pub fn clear(&self) {
        let fds: Vec<RawFd> = self.event_handlers.borrow_mut().drain().map(|(fd, _)| fd).collect();
        let timers: Vec<TimerId> = self
            .timer_handlers
            .borrow_mut()
            .drain()
            .map(|(id, _)| id)
            .collect();
        if !fds.is_empty() || !timers.is_empty() {
            tracing::debug!(
                "releasing {} fd(s) and {} timer(s) of the plug",
                fds.len(),
                timers.len()
            );
        }
        for fd in fds {
            self.run_loop.unregister_file_descriptor(fd);
        }
        for id in timers {
            self.run_loop.unregister_timer(id);
        }
    }
}

impl Drop for PlugRunLoop {
    fn drop(&mut self) {
        self.clear();
    }
}
