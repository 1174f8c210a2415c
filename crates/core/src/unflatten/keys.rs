//! Flattened key recognition
//!
//! Legacy records encode grouped and repeated fields in their key names:
//! `contributor.2.email` is sub-field `email` of the second `contributor`,
//! `keyword.3.` is the third value of a repeatable scalar, and
//! `person.given` is sub-field `given` of a single `person` group.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading integer, then either the end or a dot and the remaining path
static INDEXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:\.(.*))?$").unwrap());

/// Decomposed flattened key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatKey<'a> {
    /// Base field the key belongs to
    pub base: &'a str,
    /// Raw 1-based repeat index, when the key carries one
    pub ordinal: Option<u64>,
    /// Sub-field path, possibly empty
    pub subfield: &'a str,
}

impl FlatKey<'_> {
    /// 0-based repeat index
    ///
    /// `None` when the key has no index or the index is `0`, which is not a
    /// valid 1-based ordinal.
    pub fn index(&self) -> Option<usize> {
        self.ordinal
            .and_then(|o| o.checked_sub(1))
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Whether the key carries a repeat index
    pub fn is_indexed(&self) -> bool {
        self.ordinal.is_some()
    }
}

/// Decompose `key` if it belongs to the record field `base`
///
/// A key belongs to `base` when it starts with `base` followed by a dot.
pub fn parse_flat_key<'a>(key: &'a str, base: &'a str) -> Option<FlatKey<'a>> {
    let remainder = key.strip_prefix(base)?.strip_prefix('.')?;
    match INDEXED.captures(remainder) {
        Some(caps) => {
            let ordinal = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
            // Indices too large for u64 are kept as un-indexed paths
            if ordinal.is_none() {
                return Some(FlatKey {
                    base,
                    ordinal: None,
                    subfield: remainder,
                });
            }
            let subfield = caps.get(2).map_or("", |m| m.as_str());
            Some(FlatKey {
                base,
                ordinal,
                subfield,
            })
        }
        None => Some(FlatKey {
            base,
            ordinal: None,
            subfield: remainder,
        }),
    }
}
