//! Package version comparison and range normalization.

use std::cmp::Ordering;
use std::fmt;

use rtriage_rules::{VersionOp, VersionRangeDef};

// =============================================================================
// PkgVersion
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Num(u64),
    Alpha(String),
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Num(a), Segment::Num(b)) => a.cmp(b),
            (Segment::Alpha(a), Segment::Alpha(b)) => a.cmp(b),
            // numeric segments sort after alphabetic ones ("1.0.1" > "1.0.rc1")
            (Segment::Num(_), Segment::Alpha(_)) => Ordering::Greater,
            (Segment::Alpha(_), Segment::Num(_)) => Ordering::Less,
        }
    }
}

/// A package version split into numeric and alphabetic segments for
/// comparison. Separators are any non-alphanumeric characters.
#[derive(Debug, Clone)]
pub struct PkgVersion {
    raw: String,
    segments: Vec<Segment>,
}

impl PartialEq for PkgVersion {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for PkgVersion {}

impl PkgVersion {
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut chars = raw.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut n: u64 = 0;
                while let Some(&d) = chars.peek()
                    && d.is_ascii_digit()
                {
                    n = n.saturating_mul(10).saturating_add(d as u64 - '0' as u64);
                    chars.next();
                }
                segments.push(Segment::Num(n));
            } else if c.is_ascii_alphabetic() {
                let mut s = String::new();
                while let Some(&a) = chars.peek()
                    && a.is_ascii_alphabetic()
                {
                    s.push(a);
                    chars.next();
                }
                segments.push(Segment::Alpha(s));
            } else {
                chars.next();
            }
        }
        PkgVersion {
            raw: raw.to_string(),
            segments,
        }
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

// =============================================================================
// Range normalization
// =============================================================================

#[derive(Debug, Clone)]
struct Bound {
    version: PkgVersion,
    inclusive: bool,
}

/// One normalized version range: all present bounds must hold; if equality
/// pins exist, the version must also match one of them.
#[derive(Debug, Clone)]
pub struct VersionRange {
    lower: Option<Bound>,
    upper: Option<Bound>,
    eqs: Vec<PkgVersion>,
}

impl VersionRange {
    fn from_def(def: &VersionRangeDef) -> Self {
        let mut range = VersionRange {
            lower: None,
            upper: None,
            eqs: Vec::new(),
        };
        for (op, raw) in &def.bounds {
            let version = PkgVersion::parse(raw);
            match op {
                VersionOp::Eq => range.eqs.push(version),
                VersionOp::Ge => {
                    range.lower = Some(Bound {
                        version,
                        inclusive: true,
                    })
                }
                VersionOp::Gt => {
                    range.lower = Some(Bound {
                        version,
                        inclusive: false,
                    })
                }
                VersionOp::Le => {
                    range.upper = Some(Bound {
                        version,
                        inclusive: true,
                    })
                }
                VersionOp::Lt => {
                    range.upper = Some(Bound {
                        version,
                        inclusive: false,
                    })
                }
            }
        }
        range
    }

    /// The version used to order this range among its siblings.
    fn sort_key(&self) -> Option<&PkgVersion> {
        self.lower
            .as_ref()
            .map(|b| &b.version)
            .or(self.upper.as_ref().map(|b| &b.version))
            .or(self.eqs.first())
    }

    fn contains(&self, v: &PkgVersion) -> bool {
        if let Some(lower) = &self.lower {
            let ok = if lower.inclusive {
                *v >= lower.version
            } else {
                *v > lower.version
            };
            if !ok {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            let ok = if upper.inclusive {
                *v <= upper.version
            } else {
                *v < upper.version
            };
            if !ok {
                return false;
            }
        }
        if !self.eqs.is_empty() && !self.eqs.contains(v) {
            return false;
        }
        true
    }
}

/// Normalize a list of range definitions: sort ascending, close gaps with
/// implicit bounds inherited from neighbors, then order descending so the
/// most recent range is tried first.
pub fn normalize_ranges(defs: &[VersionRangeDef]) -> Vec<VersionRange> {
    let mut ranges: Vec<VersionRange> = defs.iter().map(VersionRange::from_def).collect();
    ranges.sort_by(|a, b| match (a.sort_key(), b.sort_key()) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    });

    // Close gaps against the neighbors' pre-fill bounds.
    let originals = ranges.clone();
    for i in 0..ranges.len() {
        if ranges[i].upper.is_none()
            && let Some(next) = originals.get(i + 1)
        {
            // inherit the next range's lower bound as an exclusive upper
            // bound, falling back to its upper bound inclusively
            if let Some(lower) = &next.lower {
                ranges[i].upper = Some(Bound {
                    version: lower.version.clone(),
                    inclusive: false,
                });
            } else if let Some(upper) = &next.upper {
                ranges[i].upper = Some(upper.clone());
            }
        }
        if ranges[i].lower.is_none()
            && i > 0
            && let Some(prev) = originals.get(i - 1)
        {
            if let Some(upper) = &prev.upper {
                ranges[i].lower = Some(Bound {
                    version: upper.version.clone(),
                    inclusive: false,
                });
            } else if let Some(lower) = &prev.lower {
                ranges[i].lower = Some(Bound {
                    version: lower.version.clone(),
                    inclusive: false,
                });
            }
        }
    }

    ranges.sort_by(|a, b| match (a.sort_key(), b.sort_key()) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ranges
}

/// Whether a version satisfies any of the (normalized) ranges. Empty range
/// lists accept everything; "installed" is checked by the caller.
pub fn version_within(version: &str, defs: &[VersionRangeDef]) -> bool {
    if defs.is_empty() {
        return true;
    }
    let v = PkgVersion::parse(version);
    normalize_ranges(defs).iter().any(|r| r.contains(&v))
}
