use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gpui::{FocusHandle, Window};

use super::error::FormResult;
use super::focus::FocusNode;
use super::observable::{Observable, Subscription};

/// Connects a field's [`FocusNode`] to a gpui [`FocusHandle`].
///
/// A view keeps one bridge per focusable field, tracks focus with
/// `handle()` and calls `sync` while rendering. Pending focus requests are
/// applied to the window and the window's focus state is reported back to
/// the node, which is what drives focus-loss validation.
pub struct FocusBridge {
    node: FocusNode,
    handle: FocusHandle,
}

impl FocusBridge {
    pub fn new(node: FocusNode, cx: &gpui::App) -> Self {
        Self {
            node,
            handle: cx.focus_handle(),
        }
    }

    pub fn with_handle(node: FocusNode, handle: FocusHandle) -> Self {
        Self { node, handle }
    }

    pub fn node(&self) -> &FocusNode {
        &self.node
    }

    pub fn handle(&self) -> &FocusHandle {
        &self.handle
    }

    /// Returns `false` once the node was finalized; the bridge should then be
    /// dropped.
    pub fn sync(&self, window: &mut Window, cx: &mut gpui::App) -> FormResult<bool> {
        if self.node.is_disposed() {
            return Ok(false);
        }
        if self.node.take_focus_request() {
            window.focus(&self.handle);
        }
        self.node.set_focused(self.handle.is_focused(window))?;
        Ok(true)
    }
}

/// Flag raised whenever an observed controller notifies. Views poll it to
/// decide whether to re-render.
#[derive(Clone, Default)]
pub struct RebuildSignal {
    pending: Arc<AtomicBool>,
}

impl RebuildSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, target: &impl Observable) -> Subscription {
        let pending = self.pending.clone();
        target.subscribe(move || pending.store(true, Ordering::SeqCst))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}
