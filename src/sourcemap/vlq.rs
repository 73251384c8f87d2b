//! Base64 VLQ decoding of the `mappings` field.
//!
//! Each generated line is `;`-separated, each segment `,`-separated. A
//! segment has 1, 4 or 5 signed VLQ fields: generated column, then source
//! index, original line, original column and name index. The generated
//! column is relative to the previous segment on the same line; every other
//! field is relative to the previous occurrence anywhere in the map.

use super::SourceMapError;

/// One decoded segment with absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Segment {
    pub gen_column: u32,
    pub original: Option<Original>,
}

/// Original-side half of a 4- or 5-field segment (all 0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Original {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

/// Decode a whole `mappings` string into segments per generated line.
///
/// Segments within a line are sorted by generated column.
pub(super) fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>, SourceMapError> {
    let mut lines = Vec::new();
    let mut source = 0i64;
    let mut line = 0i64;
    let mut column = 0i64;
    let mut name = 0i64;

    for encoded_line in mappings.split(';') {
        let mut segments = Vec::new();
        let mut gen_column = 0i64;

        for encoded in encoded_line.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_segment(encoded)?;
            gen_column += fields[0];

            let original = match fields.len() {
                1 => None,
                4 | 5 => {
                    source += fields[1];
                    line += fields[2];
                    column += fields[3];
                    let name_index = fields.get(4).map(|delta| {
                        name += delta;
                        name
                    });
                    Some(Original {
                        source: to_u32(source)?,
                        line: to_u32(line)?,
                        column: to_u32(column)?,
                        name: name_index.map(to_u32).transpose()?,
                    })
                }
                n => return Err(SourceMapError::SegmentArity(n)),
            };

            segments.push(Segment {
                gen_column: to_u32(gen_column)?,
                original,
            });
        }

        segments.sort_by_key(|s| s.gen_column);
        lines.push(segments);
    }

    Ok(lines)
}

/// Decode the signed VLQ fields of one segment.
fn decode_segment(encoded: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut fields = Vec::with_capacity(5);
    let mut value = 0i64;
    let mut shift = 0u32;
    let mut open = false;

    for ch in encoded.chars() {
        let digit = base64_value(ch).ok_or(SourceMapError::InvalidBase64(ch))?;
        if shift > 30 {
            return Err(SourceMapError::Overflow);
        }
        value |= i64::from(digit & 0b1_1111) << shift;
        open = digit & 0b10_0000 != 0;

        if open {
            shift += 5;
        } else {
            let magnitude = value >> 1;
            fields.push(if value & 1 == 1 { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }

    if open {
        return Err(SourceMapError::Truncated);
    }
    Ok(fields)
}

fn base64_value(ch: char) -> Option<u8> {
    let value = match ch {
        'A'..='Z' => ch as u8 - b'A',
        'a'..='z' => ch as u8 - b'a' + 26,
        '0'..='9' => ch as u8 - b'0' + 52,
        '+' => 62,
        '/' => 63,
        _ => return None,
    };
    Some(value)
}

fn to_u32(value: i64) -> Result<u32, SourceMapError> {
    u32::try_from(value).map_err(|_| SourceMapError::Negative)
}
