//! Build version strings of the form `YYYYMMDD.N`

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{8})\.([0-9]+)$").expect("Invalid build version pattern"));

/// Why a version string was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("'{0}' is not of the form YYYYMMDD.N")]
    Malformed(String),
}

/// Parsed build version, ordered by date then sequence
///
/// The sequence has no upper bound; it is kept as its decimal digits with
/// leading zeros removed, so zero is the empty string. Anything that does
/// not parse is treated as [`BuildVersion::SENTINEL`], which sorts below
/// every real build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BuildVersion {
    date: u32,
    sequence: String,
}

impl BuildVersion {
    pub const SENTINEL: Self = Self {
        date: 0,
        sequence: String::new(),
    };

    #[must_use]
    pub fn new(date: u32, sequence: u64) -> Self {
        Self {
            date,
            sequence: normalize(&sequence.to_string()),
        }
    }

    /// Strict parse; surrounding whitespace is ignored
    ///
    /// # Errors
    /// Returns `VersionError` if `raw` is not `YYYYMMDD.N`
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        let captures = VERSION_PATTERN
            .captures(trimmed)
            .ok_or_else(|| VersionError::Malformed(trimmed.to_string()))?;

        // Eight ASCII digits always fit in a u32.
        let date = captures[1]
            .parse()
            .map_err(|_| VersionError::Malformed(trimmed.to_string()))?;

        Ok(Self {
            date,
            sequence: normalize(&captures[2]),
        })
    }

    /// Parse, demoting anything malformed to the sentinel
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::SENTINEL)
    }

    #[must_use]
    pub fn date(&self) -> u32 {
        self.date
    }

    /// Sequence digits without leading zeros
    #[must_use]
    pub fn sequence(&self) -> &str {
        if self.sequence.is_empty() {
            "0"
        } else {
            &self.sequence
        }
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

fn normalize(digits: &str) -> String {
    digits.trim_start_matches('0').to_string()
}

impl Ord for BuildVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Without leading zeros a longer digit string is a larger number.
        self.date
            .cmp(&other.date)
            .then_with(|| self.sequence.len().cmp(&other.sequence.len()))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for BuildVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for BuildVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}.{}", self.date, self.sequence())
    }
}

/// Whether `candidate` orders strictly after `baseline`
#[must_use]
pub fn is_newer(candidate: &str, baseline: &str) -> bool {
    BuildVersion::parse_lenient(candidate) > BuildVersion::parse_lenient(baseline)
}
