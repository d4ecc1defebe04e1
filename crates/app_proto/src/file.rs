//! File metadata as sent by the server

use crate::ProtoError;
use serde::{Deserialize, Serialize};

/// Whether an entry is a directory or a regular file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Dir,
    File,
}

/// Metadata for one directory entry
///
/// The server sends `is_dir` and `is_file` as separate booleans; exactly one
/// of them must be set, so they are folded into [`FileKind`] when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFileStat", into = "RawFileStat")]
pub struct FileStat {
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
    pub file_type: Option<String>,
    /// Milliseconds since the Unix epoch
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
}

#[derive(Serialize, Deserialize)]
struct RawFileStat {
    name: String,
    is_dir: bool,
    is_file: bool,
    #[serde(default)]
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_type: Option<String>,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    modified: u64,
    #[serde(default)]
    accessed: u64,
}

impl TryFrom<RawFileStat> for FileStat {
    type Error = ProtoError;

    fn try_from(raw: RawFileStat) -> Result<Self, ProtoError> {
        let kind = match (raw.is_dir, raw.is_file) {
            (true, false) => FileKind::Dir,
            (false, true) => FileKind::File,
            (is_dir, is_file) => {
                return Err(ProtoError::InvalidFileStat {
                    name: raw.name,
                    is_dir,
                    is_file,
                })
            }
        };

        Ok(Self {
            name: raw.name,
            kind,
            size: raw.size,
            file_type: raw.file_type,
            created: raw.created,
            modified: raw.modified,
            accessed: raw.accessed,
        })
    }
}

impl From<FileStat> for RawFileStat {
    fn from(stat: FileStat) -> Self {
        Self {
            is_dir: stat.is_dir(),
            is_file: stat.is_file(),
            name: stat.name,
            size: stat.size,
            file_type: stat.file_type,
            created: stat.created,
            modified: stat.modified,
            accessed: stat.accessed,
        }
    }
}

impl FileStat {
    /// Create a regular file entry
    pub fn file(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            kind: FileKind::File,
            size,
            file_type: None,
            created: 0,
            modified: 0,
            accessed: 0,
        }
    }

    /// Create a directory entry
    pub fn dir(name: &str) -> Self {
        Self {
            kind: FileKind::Dir,
            ..Self::file(name, 0)
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Lowercase extension without the dot, empty if none
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
            _ => String::new(),
        }
    }

    /// Check if this is an image file
    pub fn is_image(&self) -> bool {
        self.is_file()
            && matches!(
                self.extension().as_str(),
                "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "ico" | "tiff" | "tif" | "svg" | "avif"
            )
    }

    /// Check if this is an archive file
    pub fn is_archive(&self) -> bool {
        self.is_file()
            && matches!(
                self.extension().as_str(),
                "zip" | "cbz" | "rar" | "cbr" | "7z" | "cb7" | "lzh" | "tar" | "gz" | "tgz"
            )
    }
}

/// One node of an archive's entry tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveNode {
    pub file: FileStat,
    #[serde(default)]
    pub children: Vec<ArchiveNode>,
}

impl ArchiveNode {
    /// Depth-first walk, yielding each node with its depth (root = 0)
    pub fn walk(&self) -> Vec<(usize, &FileStat)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, &node.file));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// Total number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ArchiveNode::node_count).sum::<usize>()
    }
}

/// One hit of a name search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_name: String,
    pub file_path: String,
    pub is_dir: bool,
}
