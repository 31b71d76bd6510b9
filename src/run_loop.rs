//! Run loop multiplexing X11 events, file descriptors and timers
//!
//! Everything here is single threaded. Handlers are plain closures which may
//! register and unregister other handlers while they run.

use crate::display::Display;
use crate::error::{Error, Result};
use crate::event::event_window;
use calloop::generic::Generic;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, LoopHandle, LoopSignal, Mode, PostAction, RegistrationToken};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::Window;
use x11rb::protocol::Event;

/// Handler for events of one window. Returns whether the event was consumed.
pub type WindowHandler = Rc<dyn Fn(&Event) -> bool>;

/// Identifies a timer registered with [`RunLoopHandle::register_timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Owner of the event loop
pub struct RunLoop {
    event_loop: EventLoop<'static, ()>,
    handle: RunLoopHandle,
}

/// Cheap handle used to register handlers with a [`RunLoop`]
#[derive(Clone)]
pub struct RunLoopHandle {
    inner: Rc<Inner>,
}

struct Inner {
    loop_handle: LoopHandle<'static, ()>,
    signal: LoopSignal,
    stop_requested: Cell<bool>,
    display: RefCell<Option<Rc<Display>>>,
    windows: RefCell<HashMap<Window, WindowHandler>>,
    fds: RefCell<HashMap<RawFd, RegistrationToken>>,
    timers: RefCell<HashMap<TimerId, RegistrationToken>>,
    next_timer: Cell<u64>,
}

impl RunLoop {
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::try_new()?;
        let handle = RunLoopHandle {
            inner: Rc::new(Inner {
                loop_handle: event_loop.handle(),
                signal: event_loop.get_signal(),
                stop_requested: Cell::new(false),
                display: RefCell::new(None),
                windows: RefCell::new(HashMap::new()),
                fds: RefCell::new(HashMap::new()),
                timers: RefCell::new(HashMap::new()),
                next_timer: Cell::new(0),
            }),
        };
        Ok(Self { event_loop, handle })
    }

    pub fn handle(&self) -> RunLoopHandle {
        self.handle.clone()
    }

    /// Watch the display connection and route its events to window handlers
    pub fn attach_display(&self, display: Rc<Display>) -> Result<()> {
        let fd = display.conn().stream().as_fd().try_clone_to_owned()?;
        let handle = self.handle.clone();
        self.event_loop
            .handle()
            .insert_source(
                Generic::new(fd, Interest::READ, Mode::Level),
                move |_, _, _| {
                    handle
                        .drain_display()
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|e| e.error)?;
        *self.handle.inner.display.borrow_mut() = Some(display);
        Ok(())
    }

    /// Wait for at most `timeout` and run whatever became ready
    pub fn dispatch(&mut self, timeout: Option<Duration>) -> Result<()> {
        // x11rb may already hold events read while waiting for a reply; the
        // fd won't report those.
        self.handle.drain_display()?;
        self.event_loop.dispatch(timeout, &mut ())?;
        self.handle.drain_display()?;
        Ok(())
    }

    /// Dispatch until [`RunLoopHandle::stop`] is called
    ///
    /// A stop requested before `run` makes it return without dispatching.
    pub fn run(&mut self) -> Result<()> {
        tracing::debug!("run loop started");
        while !self.handle.inner.stop_requested.replace(false) {
            self.dispatch(None)?;
        }
        tracing::debug!("run loop stopped");
        Ok(())
    }
}

impl RunLoopHandle {
    /// Make the current or next [`RunLoop::run`] return
    pub fn stop(&self) {
        self.inner.stop_requested.set(true);
        self.inner.signal.wakeup();
    }

    pub fn register_window<F>(&self, window: Window, handler: F)
    where
        F: Fn(&Event) -> bool + 'static,
    {
        self.inner
            .windows
            .borrow_mut()
            .insert(window, Rc::new(handler));
    }

    pub fn unregister_window(&self, window: Window) {
        self.inner.windows.borrow_mut().remove(&window);
    }

    /// Call `callback` whenever `fd` is readable. One registration per fd.
    ///
    /// # Safety
    ///
    /// `fd` must stay open until it is unregistered.
    pub unsafe fn register_file_descriptor<F>(&self, fd: RawFd, mut callback: F) -> Result<()>
    where
        F: FnMut(RawFd) + 'static,
    {
        if self.inner.fds.borrow().contains_key(&fd) {
            return Err(Error::FdAlreadyRegistered(fd));
        }

        // SAFETY: the caller keeps the descriptor open while registered.
        let borrowed: BorrowedFd<'static> = BorrowedFd::borrow_raw(fd);
        let token = self
            .inner
            .loop_handle
            .insert_source(
                Generic::new(borrowed, Interest::READ, Mode::Level),
                move |_, _, _| {
                    callback(fd);
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|e| e.error)?;
        self.inner.fds.borrow_mut().insert(fd, token);
        Ok(())
    }

    /// Returns whether `fd` was registered
    pub fn unregister_file_descriptor(&self, fd: RawFd) -> bool {
        let token = self.inner.fds.borrow_mut().remove(&fd);
        match token {
            Some(token) => {
                self.inner.loop_handle.remove(token);
                true
            }
            None => false,
        }
    }

    /// Call `callback` every `interval` until unregistered
    pub fn register_timer<F>(&self, interval: Duration, mut callback: F) -> Result<TimerId>
    where
        F: FnMut(TimerId) + 'static,
    {
        let id = TimerId(self.inner.next_timer.get());
        self.inner.next_timer.set(id.0 + 1);

        let token = self
            .inner
            .loop_handle
            .insert_source(Timer::from_duration(interval), move |_, _, _| {
                callback(id);
                TimeoutAction::ToDuration(interval)
            })
            .map_err(|e| e.error)?;
        self.inner.timers.borrow_mut().insert(id, token);
        Ok(id)
    }

    /// Returns whether the timer was registered
    pub fn unregister_timer(&self, id: TimerId) -> bool {
        let token = self.inner.timers.borrow_mut().remove(&id);
        match token {
            Some(token) => {
                self.inner.loop_handle.remove(token);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn registered_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Route an event to the handler of the window it was reported on
    pub(crate) fn dispatch_event(&self, event: &Event) -> bool {
        let Some(window) = event_window(event) else {
            return false;
        };
        // Clone out so the handler may touch the registry.
        let handler = self.inner.windows.borrow().get(&window).cloned();
        match handler {
            Some(handler) => handler(event),
            None => false,
        }
    }

    fn drain_display(&self) -> Result<()> {
        let Some(display) = self.inner.display.borrow().clone() else {
            return Ok(());
        };
        while let Some(event) = display.conn().poll_for_event()? {
            if !self.dispatch_event(&event) {
                tracing::trace!("unhandled X11 event");
            }
        }
        display.conn().flush().map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;
    use x11rb::protocol::xproto::{ExposeEvent, EXPOSE_EVENT};

    fn expose(window: Window) -> Event {
        Event::Expose(ExposeEvent {
            response_type: EXPOSE_EVENT,
            sequence: 0,
            window,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            count: 0,
        })
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn dispatch_until(run_loop: &mut RunLoop, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            run_loop
                .dispatch(Some(Duration::from_millis(20)))
                .unwrap();
        }
    }

    #[test]
    fn events_reach_the_registered_window() {
        init_logging();
        let run_loop = RunLoop::new().unwrap();
        let handle = run_loop.handle();
        let hits = Rc::new(Cell::new(0));

        let counter = hits.clone();
        handle.register_window(7, move |_| {
            counter.set(counter.get() + 1);
            true
        });

        assert!(handle.dispatch_event(&expose(7)));
        assert!(!handle.dispatch_event(&expose(8)));
        assert_eq!(hits.get(), 1);

        handle.unregister_window(7);
        assert!(!handle.dispatch_event(&expose(7)));
    }

    #[test]
    fn handlers_may_register_windows() {
        init_logging();
        let run_loop = RunLoop::new().unwrap();
        let handle = run_loop.handle();

        let inner = handle.clone();
        handle.register_window(1, move |_| {
            inner.register_window(2, |_| true);
            true
        });

        assert!(!handle.dispatch_event(&expose(2)));
        assert!(handle.dispatch_event(&expose(1)));
        assert!(handle.dispatch_event(&expose(2)));
    }

    #[test]
    fn readable_fd_invokes_callback() {
        init_logging();
        let mut run_loop = RunLoop::new().unwrap();
        let (reader, mut writer) = UnixStream::pair().unwrap();
        let seen = Rc::new(Cell::new(None));

        let slot = seen.clone();
        unsafe {
            run_loop
                .handle()
                .register_file_descriptor(reader.as_raw_fd(), move |fd| slot.set(Some(fd)))
                .unwrap();
        }

        writer.write_all(b"x").unwrap();
        dispatch_until(&mut run_loop, || seen.get().is_some());
        assert_eq!(seen.get(), Some(reader.as_raw_fd()));

        assert!(run_loop.handle().unregister_file_descriptor(reader.as_raw_fd()));
        assert!(!run_loop.handle().unregister_file_descriptor(reader.as_raw_fd()));
    }

    #[test]
    fn fd_can_only_be_registered_once() {
        init_logging();
        let run_loop = RunLoop::new().unwrap();
        let (reader, _writer) = UnixStream::pair().unwrap();
        let handle = run_loop.handle();

        unsafe {
            handle
                .register_file_descriptor(reader.as_raw_fd(), |_| {})
                .unwrap();
            assert!(matches!(
                handle.register_file_descriptor(reader.as_raw_fd(), |_| {}),
                Err(Error::FdAlreadyRegistered(fd)) if fd == reader.as_raw_fd()
            ));
        }
        handle.unregister_file_descriptor(reader.as_raw_fd());
    }

    #[test]
    fn timers_repeat_until_unregistered() {
        init_logging();
        let mut run_loop = RunLoop::new().unwrap();
        let ticks = Rc::new(Cell::new(0));

        let counter = ticks.clone();
        let id = run_loop
            .handle()
            .register_timer(Duration::from_millis(1), move |_| counter.set(counter.get() + 1))
            .unwrap();

        dispatch_until(&mut run_loop, || ticks.get() >= 3);
        assert!(ticks.get() >= 3);

        assert!(run_loop.handle().unregister_timer(id));
        let after = ticks.get();
        run_loop.dispatch(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(ticks.get(), after);
        assert!(!run_loop.handle().unregister_timer(id));
    }

    #[test]
    fn stop_ends_run() {
        init_logging();
        let mut run_loop = RunLoop::new().unwrap();
        let handle = run_loop.handle();

        let stopper = handle.clone();
        let id = handle
            .register_timer(Duration::from_millis(1), move |_| stopper.stop())
            .unwrap();

        run_loop.run().unwrap();
        assert!(handle.unregister_timer(id));
    }

    #[test]
    fn stop_before_run_is_honoured() {
        init_logging();
        let mut run_loop = RunLoop::new().unwrap();
        let handle = run_loop.handle();

        let watchdog_fired = Rc::new(Cell::new(false));
        let fired = watchdog_fired.clone();
        let stopper = handle.clone();
        let watchdog = handle
            .register_timer(Duration::from_millis(500), move |_| {
                fired.set(true);
                stopper.stop();
            })
            .unwrap();

        handle.stop();
        run_loop.run().unwrap();
        assert!(!watchdog_fired.get());

        // The request is consumed, so the next run waits for a new stop.
        run_loop.run().unwrap();
        assert!(watchdog_fired.get());
        assert!(handle.unregister_timer(watchdog));
    }
}
