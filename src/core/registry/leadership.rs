use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read-only view of this process's leadership flag.
///
/// Cloned into every leader-gated task; reading never touches the store.
#[derive(Debug, Clone, Default)]
pub struct LeadershipHandle {
    is_primary: Arc<AtomicBool>,
}

impl LeadershipHandle {
    pub(crate) fn new(is_primary: Arc<AtomicBool>) -> Self {
        Self { is_primary }
    }

    /// Detached handle whose value never changes
    pub fn fixed(is_primary: bool) -> Self {
        Self::new(Arc::new(AtomicBool::new(is_primary)))
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_tracks_shared_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = LeadershipHandle::new(flag.clone());
        assert!(!handle.is_primary());

        flag.store(true, Ordering::SeqCst);
        assert!(handle.clone().is_primary());
        assert!(LeadershipHandle::fixed(true).is_primary());
    }
}
