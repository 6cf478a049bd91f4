//! Line tokenizer for pipe-delimited report messages.
//!
//! A segment is one line of the message. Field 0 is the segment name, so
//! `segment.field(3)` on a `PID` line is PID-3 in the usual HL7 numbering.
//! Lookups past the end of a line return `None` rather than panicking, which
//! keeps "field absent" distinct from "field present but empty".

pub const FIELD_SEPARATOR: char = '|';
pub const COMPONENT_SEPARATOR: char = '^';

/// Segment types the extractor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    PatientIdentity,
    Order,
    Result,
    Other,
}

impl SegmentKind {
    fn from_line(line: &str) -> Self {
        if line.starts_with("PID") {
            SegmentKind::PatientIdentity
        } else if line.starts_with("OBR") {
            SegmentKind::Order
        } else if line.starts_with("OBX") {
            SegmentKind::Result
        } else {
            SegmentKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    fields: Vec<&'a str>,
}

impl<'a> Segment<'a> {
    pub fn parse(line: &'a str) -> Self {
        Self {
            kind: SegmentKind::from_line(line),
            fields: line.split(FIELD_SEPARATOR).collect(),
        }
    }

    /// Raw (untrimmed) field at `index`, or `None` if the line is too short.
    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.fields.get(index).copied()
    }

    /// Component `index` (zero-based) of field `field_index`.
    pub fn component(&self, field_index: usize, index: usize) -> Option<&'a str> {
        self.field(field_index)?
            .split(COMPONENT_SEPARATOR)
            .nth(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split a message into segments. Accepts `\n`, `\r\n` and bare `\r` endings.
pub fn segments(message: &str) -> impl Iterator<Item = Segment<'_>> {
    message
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .map(Segment::parse)
}
