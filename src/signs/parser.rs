//! Sign text grammar
//!
//! The first line carries a bracketed tag; the rest depends on the tag:
//!
//! ```text
//! [node]      [pickup]    [dropoff]   [storage]
//! <name>      <node>      <node>      <complex name>
//! <a>, <b>                            [y-level]
//! <c>
//! ```
//!
//! Node connection lines are comma separated and may span several lines.
//! Pickup and dropoff points sit where the sign stands.

use thiserror::Error;

/// What a single sign declares
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignDeclaration {
    Node {
        name: String,
        connections: Vec<String>,
    },
    Pickup {
        node: String,
    },
    Dropoff {
        node: String,
    },
    Storage {
        name: String,
        /// Falls back to the sign's own y when absent
        y_level: Option<i32>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignParseError {
    /// Ordinary sign text, not meant for the operator
    #[error("not a declaration")]
    NotADeclaration,

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error("{0} sign has no name")]
    MissingName(&'static str),

    #[error("invalid y-level: {0}")]
    InvalidYLevel(String),
}

/// Turns raw sign lines into a declaration
pub trait SignParser: Send + Sync {
    fn parse(&self, lines: &[String]) -> Result<SignDeclaration, SignParseError>;
}

/// Bracket-tag grammar described in the module docs
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSignParser;

impl DefaultSignParser {
    fn name_line(lines: &[String], tag: &'static str) -> Result<String, SignParseError> {
        lines
            .get(1)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or(SignParseError::MissingName(tag))
    }
}

impl SignParser for DefaultSignParser {
    fn parse(&self, lines: &[String]) -> Result<SignDeclaration, SignParseError> {
        let first = lines
            .first()
            .map(|l| l.trim())
            .ok_or(SignParseError::NotADeclaration)?;

        let Some(tag) = first.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
            return Err(SignParseError::NotADeclaration);
        };

        match tag.trim().to_ascii_lowercase().as_str() {
            "node" => {
                let name = Self::name_line(lines, "node")?;
                let connections = lines
                    .iter()
                    .skip(2)
                    .flat_map(|l| l.split(','))
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(SignDeclaration::Node { name, connections })
            }
            "pickup" => Ok(SignDeclaration::Pickup {
                node: Self::name_line(lines, "pickup")?,
            }),
            "dropoff" => Ok(SignDeclaration::Dropoff {
                node: Self::name_line(lines, "dropoff")?,
            }),
            "storage" => {
                let name = Self::name_line(lines, "storage")?;
                let y_level = match lines.get(2).map(|l| l.trim()).filter(|l| !l.is_empty()) {
                    Some(raw) => Some(
                        raw.parse::<i32>()
                            .map_err(|_| SignParseError::InvalidYLevel(raw.to_string()))?,
                    ),
                    None => None,
                };
                Ok(SignDeclaration::Storage { name, y_level })
            }
            other => Err(SignParseError::UnknownTag(other.to_string())),
        }
    }
}
