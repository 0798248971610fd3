//! Source locations - opaque positions in workspace text
//!
//! Format: `<path>:<line>:<start>-<end>` (1-indexed line, 0-indexed columns)
//! or `<path>:<line>:<start>-<end_line>:<end>` for multi-line ranges.
//!
//! Examples:
//! - `/ws/lib/commands.dart:12:8-15`
//! - `/ws/lib/home_page.dart:40:4-41:2`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

static LOCATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(.+):(\d+):(\d+)-(?:(\d+):)?(\d+)$").expect("static location pattern")
});

/// Zero-based line/character position, as language servers report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Same line, `n` characters further right
    pub fn offset(self, n: u32) -> Self {
        Self {
            line: self.line,
            character: self.character.saturating_add(n),
        }
    }
}

/// A range of text inside one file.
///
/// Used both for declarations and for references; the builder never looks
/// inside the path beyond filtering by root, extension and basename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// File path (absolute for live backends, as recorded for snapshots)
    pub path: String,
    /// Start of the range (inclusive)
    pub start: Position,
    /// End of the range (exclusive)
    pub end: Position,
}

impl Location {
    /// Create a new location
    pub fn new(path: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            path: path.into(),
            start,
            end,
        }
    }

    /// Location of a single-line token `[start, start + len)`
    pub fn token(path: impl Into<String>, line: u32, character: u32, len: u32) -> Self {
        let start = Position::new(line, character);
        Self::new(path, start, start.offset(len))
    }

    /// File name component of the path, or the whole path if it has none
    pub fn basename(&self) -> String {
        basename(&self.path)
    }

    /// Whether the path lies under `root` (case-insensitive prefix match)
    pub fn is_under(&self, root: &Path) -> bool {
        let root = root.to_string_lossy().to_lowercase();
        let root = root.trim_end_matches(['/', '\\']);
        let path = self.path.to_lowercase();
        match path.strip_prefix(root) {
            Some(rest) => root.is_empty() || rest.is_empty() || rest.starts_with(['/', '\\']),
            None => false,
        }
    }

    /// Whether the path ends with `.<extension>`
    pub fn has_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.path
            .strip_suffix(extension)
            .is_some_and(|stem| stem.ends_with('.'))
    }

    /// Parse the textual form
    pub fn parse(s: &str) -> Result<Self> {
        let caps = LOCATION_RE
            .captures(s)
            .ok_or_else(|| Error::InvalidLocation(format!("expected path:line:start-end, got {}", s)))?;

        let number = |idx: usize| -> Result<u32> {
            caps[idx]
                .parse::<u32>()
                .map_err(|_| Error::InvalidLocation(format!("Invalid number in {}", s)))
        };

        let line = number(2)?;
        if line == 0 {
            return Err(Error::InvalidLocation(format!("Lines are 1-indexed: {}", s)));
        }
        let start = Position::new(line - 1, number(3)?);
        let end_line = match caps.get(4) {
            Some(_) => {
                let l = number(4)?;
                if l < line {
                    return Err(Error::InvalidLocation(format!("Range ends before it starts: {}", s)));
                }
                l - 1
            }
            None => line - 1,
        };
        let end = Position::new(end_line, number(5)?);

        Ok(Self::new(&caps[1], start, end))
    }

    /// Convert to the textual form
    pub fn to_location_string(&self) -> String {
        if self.start.line == self.end.line {
            format!(
                "{}:{}:{}-{}",
                self.path,
                self.start.line + 1,
                self.start.character,
                self.end.character
            )
        } else {
            format!(
                "{}:{}:{}-{}:{}",
                self.path,
                self.start.line + 1,
                self.start.character,
                self.end.line + 1,
                self.end.character
            )
        }
    }
}

/// File name component of a path string
pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_location_string())
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Location {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_location_string())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Location::parse(&s).map_err(serde::de::Error::custom)
    }
}
