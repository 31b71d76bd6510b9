//! XEmbed protocol vocabulary
//!
//! Message opcodes, the `_XEMBED_INFO` property layout and the encoding of
//! `_XEMBED` client messages.
//! See <https://specifications.freedesktop.org/xembed-spec/latest/>.

use x11rb::protocol::xproto::{ClientMessageEvent, Window};

/// Protocol version spoken by the host
pub const PROTOCOL_VERSION: u32 = 0;

/// `_XEMBED_INFO` flag: the plug wants to be mapped
pub const FLAG_MAPPED: u32 = 1 << 0;

/// Focus detail values carried by [`Opcode::FocusIn`]
pub mod focus {
    pub const CURRENT: u32 = 0;
    pub const FIRST: u32 = 1;
    pub const LAST: u32 = 2;
}

/// XEmbed message opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    EmbeddedNotify = 0,
    WindowActivate = 1,
    WindowDeactivate = 2,
    RequestFocus = 3,
    FocusIn = 4,
    FocusOut = 5,
    FocusNext = 6,
    FocusPrev = 7,
    // 8-9 were XEMBED_GRAB_KEY/XEMBED_UNGRAB_KEY
    ModalityOn = 10,
    ModalityOff = 11,
    RegisterAccelerator = 12,
    UnregisterAccelerator = 13,
    ActivateAccelerator = 14,
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::EmbeddedNotify,
            1 => Self::WindowActivate,
            2 => Self::WindowDeactivate,
            3 => Self::RequestFocus,
            4 => Self::FocusIn,
            5 => Self::FocusOut,
            6 => Self::FocusNext,
            7 => Self::FocusPrev,
            10 => Self::ModalityOn,
            11 => Self::ModalityOff,
            12 => Self::RegisterAccelerator,
            13 => Self::UnregisterAccelerator,
            14 => Self::ActivateAccelerator,
            other => return Err(other),
        })
    }
}

/// Contents of the `_XEMBED_INFO` property of a plug window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XEmbedInfo {
    pub version: u32,
    pub flags: u32,
}

impl XEmbedInfo {
    /// Parse the property value. Returns `None` unless both words are present.
    pub fn from_words<I>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut words = words.into_iter();
        let version = words.next()?;
        let flags = words.next()?;
        Some(Self { version, flags })
    }

    pub fn is_mapped(&self) -> bool {
        self.flags & FLAG_MAPPED == FLAG_MAPPED
    }

    /// Version both sides understand
    pub fn negotiated_version(&self) -> u32 {
        self.version.min(PROTOCOL_VERSION)
    }
}

/// A single `_XEMBED` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub detail: u32,
    pub data1: u32,
    pub data2: u32,
}

impl Message {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            detail: 0,
            data1: 0,
            data2: 0,
        }
    }

    pub fn with_detail(mut self, detail: u32) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_data(mut self, data1: u32, data2: u32) -> Self {
        self.data1 = data1;
        self.data2 = data2;
        self
    }

    /// Client message data words, stamped with `time`
    pub fn to_words(&self, time: u32) -> [u32; 5] {
        [
            time,
            self.opcode as u32,
            self.detail,
            self.data1,
            self.data2,
        ]
    }

    /// Decode message words. Unknown opcodes are returned as the error value.
    pub fn from_words(words: [u32; 5]) -> Result<Self, u32> {
        let opcode = Opcode::try_from(words[1])?;
        Ok(Self {
            opcode,
            detail: words[2],
            data1: words[3],
            data2: words[4],
        })
    }

    /// Build the client message event addressed to `receiver`
    pub fn to_event(&self, receiver: Window, xembed_atom: u32) -> ClientMessageEvent {
        ClientMessageEvent::new(
            32,
            receiver,
            xembed_atom,
            self.to_words(x11rb::CURRENT_TIME),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_needs_two_words() {
        assert_eq!(XEmbedInfo::from_words([1]), None);
        assert_eq!(
            XEmbedInfo::from_words([1, FLAG_MAPPED, 99]),
            Some(XEmbedInfo {
                version: 1,
                flags: FLAG_MAPPED
            })
        );
    }

    #[test]
    fn info_mapped_flag_and_version() {
        let info = XEmbedInfo {
            version: 3,
            flags: 0b10,
        };
        assert!(!info.is_mapped());
        assert_eq!(info.negotiated_version(), PROTOCOL_VERSION);

        let info = XEmbedInfo {
            version: 0,
            flags: FLAG_MAPPED | 0b10,
        };
        assert!(info.is_mapped());
    }

    #[test]
    fn message_words_layout() {
        let msg = Message::new(Opcode::FocusIn)
            .with_detail(focus::FIRST)
            .with_data(0x400001, 0);
        assert_eq!(msg.to_words(0), [0, 4, 1, 0x400001, 0]);
        assert_eq!(Message::from_words([123, 4, 1, 0x400001, 0]), Ok(msg));
    }

    #[test]
    fn retired_opcodes_are_rejected() {
        assert_eq!(Message::from_words([0, 8, 0, 0, 0]), Err(8));
        assert_eq!(Opcode::try_from(9), Err(9));
        assert_eq!(Opcode::try_from(14), Ok(Opcode::ActivateAccelerator));
    }

    #[test]
    fn event_is_32_bit_xembed_message() {
        let event = Message::new(Opcode::EmbeddedNotify)
            .with_data(7, 0)
            .to_event(42, 300);
        assert_eq!(event.format, 32);
        assert_eq!(event.window, 42);
        assert_eq!(event.type_, 300);
        assert_eq!(event.data.as_data32(), [0, 0, 0, 7, 0]);
    }
}
