//! Per-frame editor state observed by background work

/// Snapshot of the editor conditions for one UI frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditorConditions {
    /// The UI asked background tasks to back off (e.g. during a resize or scroll).
    pub throttling: bool,
    /// A drag-drop or menu interaction is in progress.
    pub interacting: bool,
    /// A play-in-editor or simulate session is running.
    pub play_in_editor: bool,
}

impl EditorConditions {
    /// Background rendering yields to interactive input only while throttling
    /// is requested and no drag-drop/menu interaction needs the frame to stay live.
    pub fn should_skip_background_work(&self) -> bool {
        self.throttling && !self.interacting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_skips_unless_interacting() {
        let idle = EditorConditions::default();
        assert!(!idle.should_skip_background_work());

        let throttled = EditorConditions {
            throttling: true,
            ..Default::default()
        };
        assert!(throttled.should_skip_background_work());

        let dragging = EditorConditions {
            throttling: true,
            interacting: true,
            ..Default::default()
        };
        assert!(!dragging.should_skip_background_work());
    }
}
