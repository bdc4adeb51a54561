//! Version comparison for plugin releases

use std::cmp::Ordering;

use semver::{Prerelease, Version};

/// A parsed plugin version.
///
/// Plugin authors frequently use more than three numeric segments
/// (`1.2.3.4`), so anything past the patch segment is kept in `extra`
/// and compared numerically after it.
#[derive(Debug, Clone)]
pub struct PluginVersion {
    core: Version,
    extra: Vec<u64>,
}

impl PluginVersion {
    pub fn is_prerelease(&self) -> bool {
        !self.core.pre.is_empty()
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let core = (self.core.major, self.core.minor, self.core.patch).cmp(&(
            other.core.major,
            other.core.minor,
            other.core.patch,
        ));
        if core != Ordering::Equal {
            return core;
        }

        let len = self.extra.len().max(other.extra.len());
        for i in 0..len {
            let a = self.extra.get(i).copied().unwrap_or(0);
            let b = other.extra.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }

        // semver orders an empty pre-release above any non-empty one
        self.core.pre.cmp(&other.core.pre)
    }
}

// `1.2.3` and `1.2.3.0` are the same version
impl PartialEq for PluginVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PluginVersion {}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parse a version string, normalizing the notations plugins use in practice.
///
/// - A leading `v`/`V` is ignored
/// - "1" and "1.2" are padded with zeros
/// - "1.2.3.4" keeps the fourth segment
/// - "1.2.3-beta.1" keeps the pre-release, "+build" metadata is ignored
///
/// Returns `None` for anything that is not a dotted run of numbers with an
/// optional semver pre-release.
pub fn parse_version(version: &str) -> Option<PluginVersion> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);

    let without_build = trimmed.split_once('+').map_or(trimmed, |(v, _)| v);
    let (numbers, pre) = match without_build.split_once('-') {
        Some((numbers, pre)) => (numbers, Some(pre)),
        None => (without_build, None),
    };

    let segments = numbers
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse::<u64>().ok()
        })
        .collect::<Option<Vec<u64>>>()?;

    let mut core = match segments.as_slice() {
        [major] => Version::new(*major, 0, 0),
        [major, minor] => Version::new(*major, *minor, 0),
        [major, minor, patch, ..] => Version::new(*major, *minor, *patch),
        [] => return None,
    };

    if let Some(pre) = pre {
        if pre.is_empty() {
            return None;
        }
        core.pre = Prerelease::new(pre).ok()?;
    }

    let extra = segments.get(3..).map(<[u64]>::to_vec).unwrap_or_default();

    Some(PluginVersion { core, extra })
}

/// Compare two version strings.
///
/// Well-formed versions are compared segment by segment, numerically.
/// A malformed version sorts below every well-formed one and two malformed
/// versions compare equal, so the ordering stays total and a broken remote
/// version never looks like an update.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Returns true if `remote` is strictly newer than `installed`
pub fn is_newer(remote: &str, installed: &str) -> bool {
    compare_versions(remote, installed) == Ordering::Greater
}

/// Find the highest version from a list, skipping malformed entries
///
/// Returns the original string so prefixes like `v` are preserved.
pub fn find_max_version(versions: &[String], ignore_prerelease: bool) -> Option<String> {
    versions
        .iter()
        .filter_map(|v| parse_version(v).map(|parsed| (v, parsed)))
        .filter(|(_, parsed)| !(ignore_prerelease && parsed.is_prerelease()))
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(original, _)| original.clone())
}
