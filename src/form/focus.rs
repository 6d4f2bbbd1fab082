use std::sync::{Arc, RwLock};

use super::error::{FormError, FormResult, read_lock, write_lock};
use super::observable::{Notifier, Subscription};

#[derive(Default)]
struct FocusState {
    focused: bool,
    pending_request: bool,
    request_count: u64,
    disposed: bool,
}

/// Focus handle owned by a field.
///
/// The controller side requests focus and listens for focus changes. The host
/// side (a UI binding) drains requests with [`FocusNode::take_focus_request`]
/// and reports the real focus state through [`FocusNode::set_focused`].
#[derive(Clone, Default)]
pub struct FocusNode {
    state: Arc<RwLock<FocusState>>,
    changes: Notifier<bool>,
}

impl FocusNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_focus(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "requesting focus")?;
        if state.disposed {
            return Err(FormError::FocusNodeDisposed);
        }
        state.pending_request = true;
        state.request_count = state.request_count.saturating_add(1);
        Ok(())
    }

    pub fn has_focus(&self) -> bool {
        self.state.read().is_ok_and(|state| state.focused)
    }

    pub fn is_focus_requested(&self) -> bool {
        self.state.read().is_ok_and(|state| state.pending_request)
    }

    pub fn focus_request_count(&self) -> u64 {
        self.state.read().map_or(0, |state| state.request_count)
    }

    pub fn add_focus_listener(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> FormResult<Subscription> {
        if read_lock(&self.state, "adding focus listener")?.disposed {
            return Err(FormError::FocusNodeDisposed);
        }
        Ok(self.changes.subscribe(move |focused: &bool| listener(*focused)))
    }

    pub fn take_focus_request(&self) -> bool {
        match self.state.write() {
            Ok(mut state) => std::mem::take(&mut state.pending_request),
            Err(_) => false,
        }
    }

    /// Reports the host's focus state. Listeners only run on an actual change.
    pub fn set_focused(&self, focused: bool) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "updating focus state")?;
            if state.disposed {
                return Err(FormError::FocusNodeDisposed);
            }
            if focused {
                state.pending_request = false;
            }
            if state.focused == focused {
                return Ok(());
            }
            state.focused = focused;
        }
        self.changes.emit(&focused);
        Ok(())
    }

    pub fn dispose(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "disposing focus node")?;
            if state.disposed {
                return Err(FormError::FocusNodeDisposed);
            }
            state.disposed = true;
            state.focused = false;
            state.pending_request = false;
        }
        self.changes.close();
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().map_or(true, |state| state.disposed)
    }
}

impl std::fmt::Debug for FocusNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusNode")
            .field("has_focus", &self.has_focus())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
