//! RemotePath - slash-separated directory paths on the server

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized path on the remote file tree
///
/// Empty segments and `.` are dropped, `..` pops the previous segment
/// (never above the root). The root is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RemotePath {
    segments: Vec<String>,
}

/// One clickable prefix of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    /// Display label; `None` for the root crumb
    pub label: Option<String>,
    pub target: RemotePath,
}

impl RemotePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(path: &str) -> Self {
        let mut segments: Vec<String> = Vec::new();
        Self::push_parts(&mut segments, path);
        Self { segments }
    }

    fn push_parts(segments: &mut Vec<String>, path: &str) {
        for part in path.split(['/', '\\']) {
            match part {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                name => segments.push(name.to_string()),
            }
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, if any
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Append a relative path
    pub fn join(&self, child: &str) -> Self {
        let mut segments = self.segments.clone();
        Self::push_parts(&mut segments, child);
        Self { segments }
    }

    /// Parent directory; `None` at the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(self.prefix(self.segments.len() - 1))
    }

    /// The first `len` segments
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.min(self.segments.len());
        Self {
            segments: self.segments[..len].to_vec(),
        }
    }

    /// Every prefix from the root down to the path itself
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        (0..=self.segments.len())
            .map(|i| Breadcrumb {
                label: i.checked_sub(1).map(|last| self.segments[last].clone()),
                target: self.prefix(i),
            })
            .collect()
    }

    pub fn as_string(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        Self::new(&path)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.as_string()
    }
}
