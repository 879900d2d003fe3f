//! Version satisfaction using semver.
//!
//! npm range syntax is translated into `semver::VersionReq` comparator sets:
//! - Standard ranges: `^1.0.0`, `~1.0.0`, `>=1.0.0`
//! - Bare versions are exact: `1.2.3` means `=1.2.3`
//! - X-ranges and partials: `1.x`, `1.2.*`, `1`, `1.2`, `*`, empty
//! - Hyphen ranges: `1.0.0 - 2.0.0`
//! - Space-separated comparators (AND): `>= 2.1.2 < 3.0.0`, `^1.2.0 ^1.3.0`
//! - Alternatives (OR): `^1.0.0 || ^2.0.0`

use super::error::PkgError;
use semver::{Version, VersionReq};

/// Decides whether a concrete version satisfies a range expression.
pub trait VersionPredicate: Send + Sync {
    /// Returns true if `version` satisfies `range`. Unparseable input never
    /// satisfies.
    fn satisfies(&self, version: &str, range: &str) -> bool;
}

/// The default predicate, backed by the `semver` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverPredicate;

impl VersionPredicate for SemverPredicate {
    fn satisfies(&self, version: &str, range: &str) -> bool {
        satisfies(version, range)
    }
}

/// A parsed npm range: any alternative may match.
#[derive(Debug, Clone)]
pub struct RangeSet {
    alternatives: Vec<VersionReq>,
}

impl RangeSet {
    /// Parse an npm range expression.
    ///
    /// # Errors
    /// Returns `PKG_SPEC_INVALID` if no alternative parses.
    pub fn parse(range: &str) -> Result<Self, PkgError> {
        let mut alternatives = Vec::new();
        for alt in range.split("||") {
            alternatives.push(parse_comparator_set(alt).map_err(|e| {
                PkgError::spec_invalid(format!("Invalid version range '{range}': {e}"))
            })?);
        }
        Ok(Self { alternatives })
    }

    /// Check a parsed version against every alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Returns true if `version` satisfies the npm `range`.
#[must_use]
pub fn satisfies(version: &str, range: &str) -> bool {
    let Some(version) = parse_version(version) else {
        return false;
    };
    RangeSet::parse(range).is_ok_and(|set| set.matches(&version))
}

/// Returns the highest version that satisfies `range`.
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let set = RangeSet::parse(range).ok()?;
    versions
        .into_iter()
        .filter_map(|v| parse_version(v).map(|parsed| (parsed, v)))
        .filter(|(parsed, _)| set.matches(parsed))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, v)| v)
}

/// True for a single concrete version such as `1.2.3`, `=1.2.3` or `v1.2.3`.
#[must_use]
pub fn is_exact_version(spec: &str) -> bool {
    parse_version(spec.trim().trim_start_matches('=')).is_some()
}

/// True if `spec` parses as a range expression.
#[must_use]
pub fn is_valid_range(spec: &str) -> bool {
    RangeSet::parse(spec).is_ok()
}

/// Parse a concrete version, tolerating a leading `v`.
#[must_use]
pub fn parse_version(version: &str) -> Option<Version> {
    Version::parse(version.trim().trim_start_matches('v')).ok()
}

/// Parse one `||` alternative into a comparator set.
fn parse_comparator_set(alt: &str) -> Result<VersionReq, semver::Error> {
    let alt = alt.trim();

    if let Some((start, end)) = parse_hyphen_range(alt) {
        return VersionReq::parse(&format!(">={start}, <={end}"));
    }

    let comparators: Vec<String> = comparator_tokens(alt)
        .iter()
        .map(|token| normalize_comparator(token))
        .collect();

    if comparators.is_empty() {
        return Ok(VersionReq::STAR);
    }
    VersionReq::parse(&comparators.join(", "))
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    (!start.is_empty() && !end.is_empty()).then_some((start, end))
}

/// Split an AND set into comparators, re-attaching operators written with a
/// space before their version (`>= 2.1.2`).
fn comparator_tokens(range: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending_op = String::new();

    for word in range.split_whitespace() {
        let word = word.trim_end_matches(',');
        if word.is_empty() {
            continue;
        }
        let has_version = word
            .chars()
            .any(|c| c.is_ascii_digit() || matches!(c, 'x' | 'X' | '*'));
        if has_version {
            tokens.push(format!("{pending_op}{word}"));
            pending_op.clear();
        } else {
            pending_op.push_str(word);
        }
    }

    // A dangling operator is kept so that parsing rejects it.
    if !pending_op.is_empty() {
        tokens.push(pending_op);
    }

    tokens
}

/// Translate one npm comparator into `semver` syntax.
fn normalize_comparator(token: &str) -> String {
    let body_start = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(token.len());
    let (op, body) = token.split_at(body_start);
    let body = body.trim_start_matches('v');

    if matches!(body, "" | "*" | "x" | "X") {
        return if op.is_empty() || op == "=" || op == ">=" {
            "*".to_string()
        } else {
            format!("{op}0.0.0")
        };
    }

    let (core, suffix) = match body.find(['-', '+']) {
        Some(pos) => body.split_at(pos),
        None => (body, ""),
    };
    let parts: Vec<&str> = core
        .split('.')
        .take_while(|p| !matches!(*p, "x" | "X" | "*"))
        .collect();

    if parts.len() >= 3 {
        let exact = format!("{}{suffix}", parts[..3].join("."));
        return if op.is_empty() {
            format!("={exact}")
        } else {
            format!("{op}{exact}")
        };
    }

    if !op.is_empty() {
        return format!("{op}{}", parts.join("."));
    }

    // Bare partial version: an x-range.
    match parts.as_slice() {
        [major] => match major.parse::<u64>() {
            Ok(m) => format!(">={m}.0.0, <{}.0.0", m + 1),
            Err(_) => (*major).to_string(),
        },
        [major, minor] => match (major.parse::<u64>(), minor.parse::<u64>()) {
            (Ok(m), Ok(n)) => format!(">={m}.{n}.0, <{m}.{}.0", n + 1),
            _ => format!("{major}.{minor}"),
        },
        _ => parts.join("."),
    }
}
