//! Issue identifiers
//!
//! Issues are numbered sequentially starting at 1 and shown as `#N`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest identifier every backend can store (SQLite integers are signed)
pub const MAX_ID: u64 = i64::MAX as u64;

/// Stable integer identifier of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub u64);

impl IssueId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for IssueId {
    fn from(value: u64) -> Self {
        IssueId(value)
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Accepts `12` or `#12`
impl std::str::FromStr for IssueId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        match digits.parse::<u64>() {
            Ok(n) if n > 0 && n <= MAX_ID => Ok(IssueId(n)),
            _ => Err(Error::InvalidId(s.to_string())),
        }
    }
}

/// Next identifier after the highest one in use. Fails once the id space
/// is exhausted.
pub fn next_id<'a>(existing: impl IntoIterator<Item = &'a IssueId>) -> Result<IssueId> {
    let max = existing.into_iter().map(|id| id.0).max().unwrap_or(0);
    max.checked_add(1)
        .filter(|n| *n <= MAX_ID)
        .map(IssueId)
        .ok_or_else(|| Error::InvalidId(format!("no identifier left after #{}", max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!("12".parse::<IssueId>().unwrap(), IssueId(12));
        assert_eq!("#7".parse::<IssueId>().unwrap(), IssueId(7));
        assert!("0".parse::<IssueId>().is_err());
        assert!("abc".parse::<IssueId>().is_err());
        assert!(u64::MAX.to_string().parse::<IssueId>().is_err());
        assert_eq!(MAX_ID.to_string().parse::<IssueId>().unwrap(), IssueId(MAX_ID));
    }

    #[test]
    fn test_next_id() {
        assert_eq!(next_id(&[]).unwrap(), IssueId(1));
        let ids = [IssueId(3), IssueId(1), IssueId(9)];
        assert_eq!(next_id(&ids).unwrap(), IssueId(10));
    }

    #[test]
    fn test_next_id_exhausted() {
        assert!(matches!(next_id(&[IssueId(u64::MAX)]), Err(Error::InvalidId(_))));
        assert!(next_id(&[IssueId(MAX_ID)]).is_err());
        assert_eq!(next_id(&[IssueId(MAX_ID - 1)]).unwrap(), IssueId(MAX_ID));
    }

    #[test]
    fn test_display() {
        assert_eq!(IssueId(42).to_string(), "#42");
    }
}
