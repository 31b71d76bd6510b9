//! Embedder side of the XEmbed handshake
//!
//! [`EmbedState`] holds no connection. Every transition returns the X
//! requests to perform as a list of [`EmbedAction`]s, which the window layer
//! executes in order.

use crate::error::{Error, Result};
use crate::xembed::{focus, Message, Opcode, XEmbedInfo};
use crate::Size;
use x11rb::protocol::xproto::Window;

/// A request the embedder wants performed on the X connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedAction {
    /// Route the window's events to the plug handler and watch its properties
    Watch(Window),
    /// Stop routing the window's events
    Unwatch(Window),
    /// Send an `_XEMBED` message to the window
    Send(Window, Message),
    Map(Window),
    Unmap(Window),
    Resize(Window, Size),
    /// Round trip to the server
    Sync,
}

/// The currently embedded plug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plug {
    pub window: Window,
    pub info: XEmbedInfo,
}

/// XEmbed state of one container window
#[derive(Debug)]
pub struct EmbedState {
    container: Window,
    plug: Option<Plug>,
}

impl EmbedState {
    pub fn new(container: Window) -> Self {
        Self {
            container,
            plug: None,
        }
    }

    pub fn container(&self) -> Window {
        self.container
    }

    pub fn plug(&self) -> Option<Plug> {
        self.plug
    }

    /// Whether a window created under `parent` is a candidate plug
    pub fn accepts_child_of(&self, parent: Window) -> bool {
        parent == self.container
    }

    /// A window appeared in the container. `info` is its `_XEMBED_INFO`.
    pub fn embed(
        &mut self,
        child: Window,
        info: Option<XEmbedInfo>,
        size: Size,
    ) -> Result<Vec<EmbedAction>> {
        let info = info.ok_or(Error::MissingEmbedInfo(child))?;
        if info.is_mapped() {
            return Err(Error::AlreadyMapped(child));
        }

        let mut actions = Vec::with_capacity(8);
        if let Some(old) = self.plug.take() {
            tracing::warn!("plug {:#x} replaced by {:#x}", old.window, child);
            actions.push(EmbedAction::Unwatch(old.window));
        }

        let plug = Plug {
            window: child,
            info,
        };
        self.plug = Some(plug);
        tracing::debug!(
            "embedding {:#x} into {:#x} (plug version {})",
            child,
            self.container,
            info.version
        );

        actions.extend([
            EmbedAction::Watch(child),
            EmbedAction::Send(child, self.message(plug, Opcode::EmbeddedNotify)),
            EmbedAction::Map(child),
            EmbedAction::Resize(child, size),
            EmbedAction::Send(child, self.message(plug, Opcode::WindowActivate)),
            EmbedAction::Send(
                child,
                self.message(plug, Opcode::FocusIn).with_detail(focus::CURRENT),
            ),
            EmbedAction::Sync,
        ]);
        Ok(actions)
    }

    /// The host top-level gained or lost input focus
    pub fn host_focus_changed(&self, focused: bool) -> Vec<EmbedAction> {
        let Some(plug) = self.plug else {
            return Vec::new();
        };
        let opcode = if focused {
            Opcode::WindowActivate
        } else {
            Opcode::WindowDeactivate
        };
        vec![
            EmbedAction::Send(plug.window, self.message(plug, opcode)),
            EmbedAction::Sync,
        ]
    }

    /// The plug sent an `_XEMBED` message to its embedder
    pub fn handle_message(&self, message: Message) -> Vec<EmbedAction> {
        let Some(plug) = self.plug else {
            tracing::debug!("{:?} without an embedded plug", message.opcode);
            return Vec::new();
        };

        // The plug is the only focus target, so focus chain moves wrap around.
        let detail = match message.opcode {
            Opcode::RequestFocus => focus::CURRENT,
            Opcode::FocusNext => focus::FIRST,
            Opcode::FocusPrev => focus::LAST,
            other => {
                tracing::debug!("ignoring {:?} from plug {:#x}", other, plug.window);
                return Vec::new();
            }
        };
        vec![
            EmbedAction::Send(
                plug.window,
                self.message(plug, Opcode::FocusIn).with_detail(detail),
            ),
            EmbedAction::Sync,
        ]
    }

    /// The plug's `_XEMBED_INFO` property changed
    pub fn info_changed(&mut self, window: Window, info: Option<XEmbedInfo>) -> Vec<EmbedAction> {
        let Some(plug) = self.plug.as_mut().filter(|plug| plug.window == window) else {
            return Vec::new();
        };
        let Some(info) = info else {
            return Vec::new();
        };

        let was_mapped = plug.info.is_mapped();
        plug.info = info;
        match (was_mapped, info.is_mapped()) {
            (false, true) => vec![EmbedAction::Map(window)],
            (true, false) => vec![EmbedAction::Unmap(window)],
            _ => Vec::new(),
        }
    }

    /// `window` was destroyed or reparented out of the container
    pub fn child_gone(&mut self, window: Window) -> Vec<EmbedAction> {
        match self.plug {
            Some(plug) if plug.window == window => {
                tracing::debug!("plug {:#x} left container {:#x}", window, self.container);
                self.plug = None;
                vec![EmbedAction::Unwatch(window)]
            }
            _ => Vec::new(),
        }
    }

    fn message(&self, plug: Plug, opcode: Opcode) -> Message {
        Message::new(opcode).with_data(self.container, plug.info.negotiated_version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xembed::FLAG_MAPPED;

    const CONTAINER: Window = 0x200;
    const PLUG: Window = 0x300;

    fn info(flags: u32) -> Option<XEmbedInfo> {
        Some(XEmbedInfo { version: 0, flags })
    }

    fn embedded() -> EmbedState {
        let mut state = EmbedState::new(CONTAINER);
        state.embed(PLUG, info(0), Size::new(400, 300)).unwrap();
        state
    }

    fn sent(actions: &[EmbedAction]) -> Vec<(Opcode, u32)> {
        actions
            .iter()
            .filter_map(|action| match action {
                EmbedAction::Send(_, msg) => Some((msg.opcode, msg.detail)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn embed_handshake_order() {
        let mut state = EmbedState::new(CONTAINER);
        let size = Size::new(640, 480);
        let actions = state.embed(PLUG, info(0), size).unwrap();

        let notify = Message::new(Opcode::EmbeddedNotify).with_data(CONTAINER, 0);
        let activate = Message::new(Opcode::WindowActivate).with_data(CONTAINER, 0);
        let focus_in = Message::new(Opcode::FocusIn).with_data(CONTAINER, 0);
        assert_eq!(
            actions,
            vec![
                EmbedAction::Watch(PLUG),
                EmbedAction::Send(PLUG, notify),
                EmbedAction::Map(PLUG),
                EmbedAction::Resize(PLUG, size),
                EmbedAction::Send(PLUG, activate),
                EmbedAction::Send(PLUG, focus_in),
                EmbedAction::Sync,
            ]
        );
        assert_eq!(state.plug().map(|p| p.window), Some(PLUG));
    }

    #[test]
    fn version_is_negotiated_down() {
        let mut state = EmbedState::new(CONTAINER);
        let newer = Some(XEmbedInfo {
            version: 2,
            flags: 0,
        });
        let actions = state.embed(PLUG, newer, Size::new(1, 1)).unwrap();
        for action in actions {
            if let EmbedAction::Send(_, msg) = action {
                assert_eq!(msg.data2, 0);
            }
        }
    }

    #[test]
    fn rejects_plug_without_info() {
        let mut state = EmbedState::new(CONTAINER);
        let err = state.embed(PLUG, None, Size::new(1, 1)).unwrap_err();
        assert!(matches!(err, Error::MissingEmbedInfo(PLUG)));
        assert!(state.plug().is_none());
    }

    #[test]
    fn rejects_already_mapped_plug() {
        let mut state = EmbedState::new(CONTAINER);
        let err = state.embed(PLUG, info(FLAG_MAPPED), Size::new(1, 1)).unwrap_err();
        assert!(matches!(err, Error::AlreadyMapped(PLUG)));
        assert!(state.plug().is_none());
    }

    #[test]
    fn only_children_of_container_are_candidates() {
        let state = EmbedState::new(CONTAINER);
        assert!(state.accepts_child_of(CONTAINER));
        assert!(!state.accepts_child_of(PLUG));
    }

    #[test]
    fn second_plug_replaces_first() {
        let mut state = embedded();
        let actions = state.embed(0x400, info(0), Size::new(1, 1)).unwrap();
        assert_eq!(actions[0], EmbedAction::Unwatch(PLUG));
        assert_eq!(actions[1], EmbedAction::Watch(0x400));
        assert_eq!(state.plug().map(|p| p.window), Some(0x400));
    }

    #[test]
    fn focus_forwarding_requires_plug() {
        let state = EmbedState::new(CONTAINER);
        assert!(state.host_focus_changed(true).is_empty());

        let state = embedded();
        assert_eq!(
            sent(&state.host_focus_changed(true)),
            vec![(Opcode::WindowActivate, 0)]
        );
        assert_eq!(
            sent(&state.host_focus_changed(false)),
            vec![(Opcode::WindowDeactivate, 0)]
        );
    }

    #[test]
    fn focus_requests_answer_with_focus_in() {
        let state = embedded();
        let reply = |opcode| sent(&state.handle_message(Message::new(opcode)));

        assert_eq!(reply(Opcode::RequestFocus), vec![(Opcode::FocusIn, focus::CURRENT)]);
        assert_eq!(reply(Opcode::FocusNext), vec![(Opcode::FocusIn, focus::FIRST)]);
        assert_eq!(reply(Opcode::FocusPrev), vec![(Opcode::FocusIn, focus::LAST)]);
        assert!(reply(Opcode::ModalityOn).is_empty());
        assert!(reply(Opcode::RegisterAccelerator).is_empty());
    }

    #[test]
    fn request_focus_before_embedding_is_ignored() {
        let state = EmbedState::new(CONTAINER);
        assert!(state
            .handle_message(Message::new(Opcode::RequestFocus))
            .is_empty());
    }

    #[test]
    fn mapped_flag_transitions_map_and_unmap() {
        let mut state = embedded();
        assert_eq!(
            state.info_changed(PLUG, info(FLAG_MAPPED)),
            vec![EmbedAction::Map(PLUG)]
        );
        assert!(state.info_changed(PLUG, info(FLAG_MAPPED)).is_empty());
        assert_eq!(state.info_changed(PLUG, info(0)), vec![EmbedAction::Unmap(PLUG)]);
        assert!(state.info_changed(PLUG, None).is_empty());
        assert!(state.info_changed(0x999, info(FLAG_MAPPED)).is_empty());
    }

    #[test]
    fn destroyed_plug_is_forgotten() {
        let mut state = embedded();
        assert!(state.child_gone(0x999).is_empty());
        assert_eq!(state.child_gone(PLUG), vec![EmbedAction::Unwatch(PLUG)]);
        assert!(state.plug().is_none());
        assert!(state.host_focus_changed(true).is_empty());
    }
}
