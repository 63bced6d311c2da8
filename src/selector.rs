//! Target selector grammar.
//!
//! A selector is one or more comma-separated atoms:
//!
//! | Atom            | Matches                                   |
//! |-----------------|-------------------------------------------|
//! | `*`             | every bulb                                |
//! | `#name`         | bulbs tagged `name`                       |
//! | `@name`         | bulbs whose label starts with `name`      |
//! | 12 hex digits   | the bulb with that device address         |
//! | anything else   | bulbs labeled exactly that                |

use std::fmt;
use std::str::FromStr;

use crate::types::{DeviceId, looks_like_address};

const TAG_PREFIX: char = '#';
const GROUP_PREFIX: char = '@';
const WILDCARD: &str = "*";

/// Why a selector string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty selector")]
    Empty,

    #[error("empty target at position {0}")]
    EmptyAtom(usize),

    #[error("missing tag name after '#'")]
    EmptyTag,

    #[error("missing group name after '@'")]
    EmptyGroup,
}

/// A parsed predicate over bulbs.
///
/// Selectors are plain values; matching happens against the registry at
/// dispatch time.
///
/// # Examples
///
/// ```
/// use lightsd_rs::Selector;
///
/// let selector: Selector = "kitchen, #evening".parse().unwrap();
/// assert_eq!(
///     selector,
///     Selector::Union(vec![
///         Selector::Label("kitchen".to_string()),
///         Selector::Tag("evening".to_string()),
///     ])
/// );
/// assert_eq!(selector.to_string(), "kitchen,#evening");
///
/// assert!("kitchen,,desk".parse::<Selector>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Label(String),
    Id(DeviceId),
    Tag(String),
    Group(String),
    Union(Vec<Selector>),
}

impl Selector {
    /// Parse a selector string.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut atoms = s
            .split(',')
            .enumerate()
            .map(|(position, atom)| parse_atom(position, atom.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        if atoms.len() == 1 {
            Ok(atoms.remove(0))
        } else {
            Ok(Selector::Union(atoms))
        }
    }
}

fn parse_atom(position: usize, atom: &str) -> Result<Selector, ParseError> {
    if atom.is_empty() {
        return Err(ParseError::EmptyAtom(position));
    }
    if atom == WILDCARD {
        return Ok(Selector::All);
    }
    if let Some(tag) = atom.strip_prefix(TAG_PREFIX) {
        if tag.is_empty() {
            return Err(ParseError::EmptyTag);
        }
        return Ok(Selector::Tag(tag.to_string()));
    }
    if let Some(group) = atom.strip_prefix(GROUP_PREFIX) {
        if group.is_empty() {
            return Err(ParseError::EmptyGroup);
        }
        return Ok(Selector::Group(group.to_string()));
    }
    if looks_like_address(atom) {
        if let Ok(id) = atom.parse() {
            return Ok(Selector::Id(id));
        }
    }
    Ok(Selector::Label(atom.to_string()))
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str(WILDCARD),
            Selector::Label(label) => f.write_str(label),
            Selector::Id(id) => write!(f, "{id}"),
            Selector::Tag(tag) => write!(f, "{TAG_PREFIX}{tag}"),
            Selector::Group(group) => write!(f, "{GROUP_PREFIX}{group}"),
            Selector::Union(atoms) => {
                for (i, atom) in atoms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{atom}")?;
                }
                Ok(())
            }
        }
    }
}
