//! Hierarchical subscription patterns.
//!
//! `*` matches exactly one segment. `#` matches one or more trailing segments and
//! may only appear last. Wildcards always occupy a whole segment.

use std::fmt;

use crate::error::RoutingError;
use crate::routing_key::{DELIMITER, JOB_DIRECTION, RESULT_DIRECTION};

pub const SINGLE_WILDCARD: &str = "*";
pub const MULTI_WILDCARD: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        if raw.is_empty() {
            return Err(RoutingError::pattern(raw, "empty pattern"));
        }
        let parts: Vec<&str> = raw.split(DELIMITER).collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(RoutingError::pattern(raw, "empty segment")),
                SINGLE_WILDCARD => Segment::Single,
                MULTI_WILDCARD if i == last => Segment::Multi,
                MULTI_WILDCARD => {
                    return Err(RoutingError::pattern(raw, "'#' must be the last segment"));
                }
                literal if literal.contains(['*', '#']) => {
                    return Err(RoutingError::pattern(
                        raw,
                        format!("wildcard must occupy a whole segment, found '{literal}'"),
                    ));
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Matches every well-formed job key.
    pub fn jobs() -> Self {
        Self {
            raw: format!("{JOB_DIRECTION}.*.*.*.*"),
            segments: vec![
                Segment::Literal(JOB_DIRECTION.to_string()),
                Segment::Single,
                Segment::Single,
                Segment::Single,
                Segment::Single,
            ],
        }
    }

    /// Matches every well-formed result key.
    pub fn results() -> Self {
        Self {
            raw: format!("{RESULT_DIRECTION}.*.*"),
            segments: vec![
                Segment::Literal(RESULT_DIRECTION.to_string()),
                Segment::Single,
                Segment::Single,
            ],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let mut key = routing_key.split(DELIMITER);
        for segment in &self.segments {
            match segment {
                Segment::Multi => return key.next().is_some(),
                Segment::Single => {
                    if key.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => {
                    if key.next() != Some(expected.as_str()) {
                        return false;
                    }
                }
            }
        }
        key.next().is_none()
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
