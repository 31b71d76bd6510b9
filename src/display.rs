//! Shared X11 connection

use crate::error::{Error, Result};
use std::rc::Rc;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt as _, Screen};
use x11rb::rust_connection::RustConnection;

x11rb::atom_manager! {
    /// Atoms interned once per connection
    pub Atoms: AtomsCookie {
        _XEMBED,
        _XEMBED_INFO,
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        _NET_WM_NAME,
        UTF8_STRING,
    }
}

/// An X11 connection plus the atoms the host needs
pub struct Display {
    conn: RustConnection,
    screen_num: usize,
    atoms: Atoms,
}

impl Display {
    /// Connect to the display named by `name`, or `$DISPLAY` when `None`
    pub fn connect(name: Option<&str>) -> Result<Rc<Self>> {
        let (conn, screen_num) = x11rb::connect(name)?;
        let atoms = Atoms::new(&conn)?.reply()?;
        tracing::debug!("connected to X server, screen {}", screen_num);

        Ok(Rc::new(Self {
            conn,
            screen_num,
            atoms,
        }))
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    pub fn screen(&self) -> Result<&Screen> {
        self.conn
            .setup()
            .roots
            .get(self.screen_num)
            .ok_or(Error::NoScreen(self.screen_num))
    }

    /// Flush and wait until the server processed every request
    pub fn sync(&self) -> Result<()> {
        self.conn.get_input_focus()?.reply()?;
        Ok(())
    }

    /// Resolve an atom for logging
    pub fn atom_name(&self, atom: Atom) -> String {
        self.conn
            .get_atom_name(atom)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| String::from_utf8_lossy(&reply.name).into_owned())
            .unwrap_or_else(|| format!("atom {}", atom))
    }
}
