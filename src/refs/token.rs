use std::fmt;
use std::str::FromStr;

use crate::error::AxbridgeError;

/// Ref handed out by a snapshot: `<frame>-<sequence>`.
///
/// `frame` is always 0 (only the top-level document is walked) and
/// `sequence` is the node's pre-order index in the walk that produced it.
/// Tokens carry no identity across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefToken {
    pub frame: u32,
    pub sequence: u32,
}

impl RefToken {
    pub fn new(frame: u32, sequence: u32) -> Self {
        Self { frame, sequence }
    }

    pub fn top_level(sequence: u32) -> Self {
        Self::new(0, sequence)
    }

    /// Strip the surface forms callers use: `@0-3`, `ref=0-3`, `[0-3]`.
    pub fn strip_surface(raw: &str) -> &str {
        let mut cleaned = raw.trim();

        if let Some(inner) = cleaned
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
        {
            cleaned = inner.trim();
        }

        if let Some(rest) = cleaned.strip_prefix('@') {
            return rest.trim();
        }

        match cleaned.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("ref=") => cleaned[4..].trim(),
            _ => cleaned,
        }
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.frame, self.sequence)
    }
}

impl FromStr for RefToken {
    type Err = AxbridgeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let not_found = || AxbridgeError::RefNotFound {
            reference: raw.trim().to_string(),
        };

        let cleaned = Self::strip_surface(raw);
        let (frame, sequence) = cleaned.split_once('-').ok_or_else(not_found)?;

        // Canonical digit runs only, so `0-01` is not another spelling of `0-1`
        let digits = |s: &str| {
            !s.is_empty()
                && s.bytes().all(|b| b.is_ascii_digit())
                && (s == "0" || !s.starts_with('0'))
        };
        if !digits(frame) || !digits(sequence) {
            return Err(not_found());
        }

        Ok(Self {
            frame: frame.parse().map_err(|_| not_found())?,
            sequence: sequence.parse().map_err(|_| not_found())?,
        })
    }
}
