// src/version/mod.rs

//! Version handling for RPM-style packages
//!
//! This module provides the rpm segment comparison (`rpmvercmp`), the
//! epoch:version-release value type used by packages and capabilities,
//! and the version distance used to choose between several installed
//! instances of one package name.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Compare two version (or release) strings the way rpm does
///
/// Strings are split into alternating numeric and alphabetic segments,
/// separators are ignored. Numeric segments compare numerically and are
/// newer than alphabetic ones. `~` sorts before anything, even the end of
/// the string; `^` sorts after the end of the string but before anything
/// else.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < one.len() || j < two.len() {
        while i < one.len() && !one[i].is_ascii_alphanumeric() && one[i] != b'~' && one[i] != b'^'
        {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() && two[j] != b'~' && two[j] != b'^'
        {
            j += 1;
        }

        let c1 = one.get(i).copied();
        let c2 = two.get(j).copied();

        if c1 == Some(b'~') || c2 == Some(b'~') {
            if c1 != Some(b'~') {
                return Ordering::Greater;
            }
            if c2 != Some(b'~') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if c1 == Some(b'^') || c2 == Some(b'^') {
            if c1.is_none() {
                return Ordering::Less;
            }
            if c2.is_none() {
                return Ordering::Greater;
            }
            if c1 != Some(b'^') {
                return Ordering::Greater;
            }
            if c2 != Some(b'^') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if c1.is_none() || c2.is_none() {
            break;
        }

        let (start1, start2) = (i, j);
        let isnum = one[i].is_ascii_digit();
        if isnum {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        // segments of different type: numeric is newer
        if start2 == j {
            return if isnum {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let mut seg1 = &one[start1..i];
        let mut seg2 = &two[start2..j];

        if isnum {
            while seg1.len() > 1 && seg1[0] == b'0' {
                seg1 = &seg1[1..];
            }
            while seg2.len() > 1 && seg2[0] == b'0' {
                seg2 = &seg2[1..];
            }
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        match seg1.cmp(seg2) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (false, _) => Ordering::Greater,
        (true, false) => Ordering::Less,
    }
}

/// An epoch:version-release triple
///
/// Equality and ordering follow rpm semantics, so `1.0` and `1.00` are
/// equal. A missing epoch compares as epoch 0; a missing release sorts
/// before any release.
#[derive(Debug, Clone)]
pub struct Evr {
    pub epoch: Option<u32>,
    pub version: String,
    pub release: Option<String>,
}

impl Evr {
    pub fn new(epoch: Option<u32>, version: &str, release: Option<&str>) -> Self {
        Self {
            epoch,
            version: version.to_string(),
            release: release.map(|r| r.to_string()),
        }
    }

    /// Parse `[epoch:]version[-release]`
    ///
    /// The release is split off at the last dash, so versions with dashes
    /// keep them.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch, rest) = match s.split_once(':') {
            Some((e, r)) if e.is_empty() => (None, r),
            Some((e, r)) => {
                let epoch = e.parse::<u32>().map_err(|err| {
                    Error::ParseError(format!("Invalid epoch in version '{}': {}", s, err))
                })?;
                (Some(epoch), r)
            }
            None => (None, s),
        };

        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) if !r.is_empty() => (v, Some(r)),
            _ => (rest, None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self::new(epoch, version, release))
    }

    pub fn epoch_or_zero(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// True when an explicit non-zero epoch is present
    pub fn has_epoch(&self) -> bool {
        self.epoch.is_some_and(|e| e > 0)
    }

    pub fn has_release(&self) -> bool {
        self.release.as_deref().is_some_and(|r| !r.is_empty())
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_or_zero()
            .cmp(&other.epoch_or_zero())
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            })
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Evr {}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch.filter(|e| *e > 0) {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(release) = self.release.as_deref().filter(|r| !r.is_empty()) {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

/// Weight of one version segment relative to the next one to its right
const SEGMENT_WEIGHT: u128 = 1000;

/// Distance between two EVRs, ordered most significant part first
///
/// Used by the multi-instance rule: among several installed instances of
/// the same name, the one closest to the incoming package is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionDistance {
    pub epoch: u64,
    pub version: u128,
    pub release: u128,
}

/// Compute the version distance between `a` and `b`
///
/// Versions are split into segments the way `rpmvercmp` splits them. Each
/// numeric segment contributes its absolute difference, weighted by its
/// position counted from the right over the longer segment list; missing
/// and non-numeric segments count as 0. Releases are measured the same way
/// and only break ties between equal version distances.
pub fn version_distance(a: &Evr, b: &Evr) -> VersionDistance {
    VersionDistance {
        epoch: u64::from(a.epoch_or_zero().abs_diff(b.epoch_or_zero())),
        version: segment_distance(&a.version, &b.version),
        release: segment_distance(
            a.release.as_deref().unwrap_or(""),
            b.release.as_deref().unwrap_or(""),
        ),
    }
}

fn segment_distance(a: &str, b: &str) -> u128 {
    let sa = numeric_segments(a);
    let sb = numeric_segments(b);
    let n = sa.len().max(sb.len());

    let mut distance: u128 = 0;
    for i in 0..n {
        let x = sa.get(i).copied().unwrap_or(0);
        let y = sb.get(i).copied().unwrap_or(0);
        let weight = SEGMENT_WEIGHT.saturating_pow((n - 1 - i) as u32);
        distance = distance.saturating_add(x.abs_diff(y).saturating_mul(weight));
    }
    distance
}

fn numeric_segments(s: &str) -> Vec<u128> {
    let bytes = s.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_alphanumeric() {
            i += 1;
            continue;
        }
        let start = i;
        let numeric = bytes[i].is_ascii_digit();
        while i < bytes.len()
            && bytes[i].is_ascii_alphanumeric()
            && bytes[i].is_ascii_digit() == numeric
        {
            i += 1;
        }
        let value = if numeric {
            s[start..i].parse::<u128>().unwrap_or(u128::MAX)
        } else {
            0
        };
        segments.push(value);
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpmvercmp_basic() {
        assert_eq!(rpmvercmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(rpmvercmp("1.0", "2.0"), Ordering::Less);
        assert_eq!(rpmvercmp("2.0.1", "2.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.010", "1.10"), Ordering::Equal);
    }

    #[test]
    fn test_rpmvercmp_alpha_and_numeric() {
        assert_eq!(rpmvercmp("1.0a", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1a", "1.1"), Ordering::Less);
        assert_eq!(rpmvercmp("abc", "abd"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0.fc43", "1.0.fc42"), Ordering::Greater);
        assert_eq!(rpmvercmp("1_0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_rpmvercmp_tilde_and_caret() {
        assert_eq!(rpmvercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0^git1", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.0^git1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_evr_parse() {
        let evr = Evr::parse("2:1.2.3-4.el8").unwrap();
        assert_eq!(evr.epoch, Some(2));
        assert_eq!(evr.version, "1.2.3");
        assert_eq!(evr.release.as_deref(), Some("4.el8"));

        let evr = Evr::parse("1.2.3").unwrap();
        assert_eq!(evr.epoch, None);
        assert!(evr.release.is_none());

        assert!(Evr::parse("x:1.0").is_err());
        assert!(Evr::parse("").is_err());
    }

    #[test]
    fn test_evr_ordering() {
        let a = Evr::parse("1.0-1").unwrap();
        let b = Evr::parse("1.0-2").unwrap();
        let c = Evr::parse("1:0.5-1").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(Evr::parse("0:1.0-1").unwrap(), a);
        assert_eq!(Evr::parse("1.00-1").unwrap(), a);
    }

    #[test]
    fn test_evr_display() {
        assert_eq!(Evr::parse("1:2.0-3").unwrap().to_string(), "1:2.0-3");
        assert_eq!(Evr::parse("0:2.0-3").unwrap().to_string(), "2.0-3");
        assert_eq!(Evr::parse("2.0").unwrap().to_string(), "2.0");
    }

    #[test]
    fn test_version_distance_is_symmetric_and_weighted() {
        let p = Evr::parse("1.2-1").unwrap();
        let low = Evr::parse("1.0-1").unwrap();
        let high = Evr::parse("1.4-1").unwrap();
        let major = Evr::parse("2.2-1").unwrap();

        assert_eq!(version_distance(&p, &low), version_distance(&low, &p));
        assert_eq!(version_distance(&p, &low), version_distance(&p, &high));
        assert!(version_distance(&p, &high) < version_distance(&p, &major));
    }

    #[test]
    fn test_version_distance_uneven_segments() {
        let a = Evr::parse("1.2").unwrap();
        let b = Evr::parse("1.2.5").unwrap();
        let d = version_distance(&a, &b);
        assert_eq!(d.version, 5);
        assert_eq!(d.epoch, 0);
    }

    #[test]
    fn test_version_distance_release_breaks_ties() {
        let p = Evr::parse("1.0-3").unwrap();
        let a = Evr::parse("1.0-2").unwrap();
        let b = Evr::parse("1.0-7").unwrap();
        assert!(version_distance(&p, &a) < version_distance(&p, &b));
    }
}
