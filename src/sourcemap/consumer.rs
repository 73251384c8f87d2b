//! Generated → original position lookup.

use super::vlq::{self, Segment};
use super::{SourceMap, SourceMapError};

/// Original location of a generated position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    /// 1-based
    pub line: u32,
    /// 0-based
    pub column: u32,
    pub name: Option<String>,
}

/// Decoded source map ready for lookups.
///
/// Decoding validates every source and name index up front, so lookups
/// never fail afterwards.
#[derive(Debug)]
pub struct SourceMapConsumer {
    sources: Vec<String>,
    names: Vec<String>,
    lines: Vec<Vec<Segment>>,
}

impl SourceMapConsumer {
    pub fn new(map: &SourceMap) -> Result<Self, SourceMapError> {
        let lines = vlq::decode_mappings(&map.mappings)?;

        let sources: Vec<String> = (0..map.sources.len())
            .filter_map(|i| map.resolved_source(i))
            .collect();

        for original in lines.iter().flatten().filter_map(|s| s.original) {
            if original.source as usize >= sources.len() {
                return Err(SourceMapError::SourceOutOfRange(original.source, sources.len()));
            }
            if let Some(name) = original.name
                && name as usize >= map.names.len()
            {
                return Err(SourceMapError::NameOutOfRange(name, map.names.len()));
            }
        }

        Ok(Self {
            sources,
            names: map.names.clone(),
            lines,
        })
    }

    /// Original position for a generated `line` (1-based) and `column` (0-based).
    ///
    /// Picks the closest segment at or before `column` on that line. `None`
    /// when the line has no such segment or it carries no source.
    pub fn original_position_for(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let index = line.checked_sub(1)? as usize;
        let segments = self.lines.get(index)?;

        let upper = segments.partition_point(|s| s.gen_column <= column);
        let segment = segments[..upper].last()?;
        let original = segment.original?;

        Some(OriginalPosition {
            source: self.sources[original.source as usize].clone(),
            line: original.line + 1,
            column: original.column,
            name: original.name.map(|n| self.names[n as usize].clone()),
        })
    }
}
