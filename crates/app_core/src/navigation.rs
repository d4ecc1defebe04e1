//! Navigation entries and history

use crate::path::RemotePath;
use app_proto::FileStat;

/// A file being previewed, together with the directory it was opened from
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSelection {
    pub file: FileStat,
    pub directory: RemotePath,
}

impl PreviewSelection {
    /// Full remote path of the previewed file
    pub fn file_path(&self) -> RemotePath {
        self.directory.join(&self.file.name)
    }
}

/// One position in the navigation history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationEntry {
    pub path: RemotePath,
    pub preview: Option<PreviewSelection>,
}

impl NavigationEntry {
    pub fn directory(path: RemotePath) -> Self {
        Self {
            path,
            preview: None,
        }
    }
}

/// Back/forward history over navigation entries
#[derive(Debug, Default)]
pub struct NavigationHistory {
    current: NavigationEntry,

    /// Navigation history stack
    history: Vec<NavigationEntry>,

    /// Forward stack (for redo)
    forward: Vec<NavigationEntry>,
}

impl NavigationHistory {
    pub fn new(start: NavigationEntry) -> Self {
        Self {
            current: start,
            history: Vec::new(),
            forward: Vec::new(),
        }
    }

    pub fn current(&self) -> &NavigationEntry {
        &self.current
    }

    /// Navigate to a new entry
    pub fn navigate_to(&mut self, entry: NavigationEntry) {
        if entry == self.current {
            return;
        }

        // Save current to history
        let old = std::mem::replace(&mut self.current, entry);
        self.history.push(old);

        // Clear forward stack
        self.forward.clear();
    }

    /// Change the preview of the current entry without adding history
    pub fn replace_preview(&mut self, preview: Option<PreviewSelection>) {
        self.current.preview = preview;
    }

    /// Go back in history
    pub fn go_back(&mut self) -> bool {
        if let Some(prev) = self.history.pop() {
            let current = std::mem::replace(&mut self.current, prev);
            self.forward.push(current);
            true
        } else {
            false
        }
    }

    /// Go forward in history
    pub fn go_forward(&mut self) -> bool {
        if let Some(next) = self.forward.pop() {
            let current = std::mem::replace(&mut self.current, next);
            self.history.push(current);
            true
        } else {
            false
        }
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }
}
