use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default name of the escape link offered in every keyword directory.
pub const DEFAULT_LINK_MARKER: &str = "@@";

/// Default filesystem name reported to the kernel.
pub const DEFAULT_FS_NAME: &str = "keywordfs";

/// A duration written as an integer and a unit: `ms`, `s`, `m` or `h`.
///
/// Stored with millisecond precision; renders with the largest unit that
/// divides it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(pub Duration);

/// Units in milliseconds, largest first.
const UNITS: [(&str, u64); 4] = [("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)];

impl Default for HumanDuration {
    fn default() -> Self {
        HumanDuration(Duration::from_secs(1))
    }
}

impl HumanDuration {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{}' has no unit", text))?;
        let (digits, unit) = text.split_at(split);

        let count: u64 = digits
            .parse()
            .map_err(|_| format!("duration '{}' does not start with a number", text))?;
        let scale = UNITS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(unit))
            .map(|(_, ms)| *ms)
            .ok_or_else(|| format!("unknown unit '{}' in duration '{}'", unit, text))?;
        let millis = count
            .checked_mul(scale)
            .ok_or_else(|| format!("duration '{}' is too long", text))?;

        Ok(HumanDuration(Duration::from_millis(millis)))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        let (name, scale) = UNITS
            .iter()
            .find(|(_, ms)| millis > 0 && millis % u128::from(*ms) == 0)
            .copied()
            .unwrap_or(("ms", 1));
        write!(f, "{}{}", millis / u128::from(scale), name)
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HumanDuration> for String {
    fn from(d: HumanDuration) -> String {
        d.to_string()
    }
}

/// Resolution cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Memoize resolved views between requests.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings { enabled: true }
    }
}

/// Options passed to the kernel when mounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSettings {
    /// Filesystem name shown in the mount table.
    #[serde(default)]
    pub fs_name: Option<String>,
    /// Let other users access the mount (needs `user_allow_other`).
    #[serde(default)]
    pub allow_other: bool,
    /// Unmount automatically when the process exits.
    #[serde(default = "default_true")]
    pub auto_unmount: bool,
    /// Reject every mutating request.
    #[serde(default)]
    pub read_only: bool,
    /// How long the kernel may cache attributes and entries.
    #[serde(default)]
    pub attr_ttl: Option<HumanDuration>,
}

impl Default for MountSettings {
    fn default() -> Self {
        MountSettings {
            fs_name: None,
            allow_other: false,
            auto_unmount: true,
            read_only: false,
            attr_ttl: None,
        }
    }
}

/// Root configuration for a keywordfs mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeywordFsConfig {
    /// The real directory tree that is scanned and tagged.
    #[serde(default)]
    pub reference_root: Option<String>,
    /// Where the keyword view is mounted.
    #[serde(default)]
    pub mountpoint: Option<String>,
    /// Child name that links back into the real tree.
    #[serde(default)]
    pub link_marker: Option<String>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub mount: MountSettings,
}

fn default_true() -> bool {
    true
}
