//! Opens a host window and embeds whatever XEmbed client gets started in it
//!
//! Run with: cargo run --example host -- [command [args...]]
//!
//! The container window id is appended to the command line, so any client
//! that takes a parent window id works, e.g. winit's `x11_embed` example.

use std::process::Command;
use std::rc::Rc;
use xembed_host::{Display, RunLoop, Size, WindowController, WindowOptions, X11Window};

struct LoggingController;

impl WindowController for LoggingController {
    fn on_show(&self, window: &X11Window) {
        tracing::info!("shown, container {:#x}", window.native_window());
    }

    fn on_close(&self, _window: &X11Window) {
        tracing::info!("closing");
    }

    fn on_resize(&self, _window: &X11Window, size: Size) {
        tracing::info!("resized to {}x{}", size.width, size.height);
    }

    fn constrain_size(&self, _window: &X11Window, size: Size) -> Size {
        Size::new(size.width.max(200), size.height.max(150))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .init();

    let display = Display::connect(None)?;
    let mut run_loop = RunLoop::new()?;
    run_loop.attach_display(display.clone())?;

    let options = WindowOptions {
        title: "XEmbed Host Example".into(),
        size: Size::new(400, 300),
        resizable: true,
    };
    let window = X11Window::open(display, run_loop.handle(), options, Rc::new(LoggingController))?;

    let handle = run_loop.handle();
    window.set_on_closed(move |_| handle.stop());

    println!("Container window: {}", window.native_window());

    let mut args = std::env::args().skip(1);
    let mut child = match args.next() {
        Some(program) => Some(
            Command::new(program)
                .args(args)
                .arg(window.native_window().to_string())
                .spawn()?,
        ),
        None => None,
    };

    window.show()?;
    run_loop.run()?;

    if let Some(child) = child.as_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }

    println!("Window closed.");
    Ok(())
}
