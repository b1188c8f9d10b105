use std::{path::Path, str::FromStr};

use crate::error::{Error, ParseError};

/// Three line element set (name + 2 element lines).
/// Content is only checked for shape here, the propagator
/// is responsible for checksums and field decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrbitalElements {
    name: String,
    line1: String,
    line2: String,
}

impl OrbitalElements {
    /// Satellite name (first line)
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Element lines 1 and 2
    pub fn lines(&self) -> (&str, &str) {
        (&self.line1, &self.line2)
    }
    /// Loads Self from a .tle file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ParseError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(content.parse::<Self>()?)
    }
}

impl FromStr for OrbitalElements {
    type Err = ParseError;
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let lines = content
            .trim_end()
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>();
        if lines.len() != 3 || lines.iter().any(|l| l.trim().is_empty()) {
            return Err(ParseError::TleLineCount(lines.len()));
        }
        if !lines[1].starts_with("1 ") {
            return Err(ParseError::TleLineNumber { line: 1 });
        }
        if !lines[2].starts_with("2 ") {
            return Err(ParseError::TleLineNumber { line: 2 });
        }
        Ok(Self {
            name: lines[0].trim().to_string(),
            line1: lines[1].to_string(),
            line2: lines[2].to_string(),
        })
    }
}
