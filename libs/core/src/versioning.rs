//! SemVer helpers shared by rollback, version computation and the faulty
//! version scanner.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

static RELEASE_IN_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d+\.\d+\.\d+)/").expect("valid release path regex"));

/// Lenient parse: surrounding whitespace and a leading `v` are accepted.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

/// Strict `X.Y.Z` release version, no prerelease or build metadata.
pub fn parse_release(raw: &str) -> Option<Version> {
    let version = Version::parse(raw.trim()).ok()?;
    (version.pre.is_empty() && version.build.is_empty()).then_some(version)
}

/// SemVer 2.0 precedence; build metadata is ignored.
pub fn compare_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Sorts raw version strings by descending precedence. Strings that do not
/// parse keep their relative order at the end.
pub fn sort_desc<T, F>(items: &mut [T], version_of: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|left, right| {
        match (parse_lenient(version_of(left)), parse_lenient(version_of(right))) {
            (Some(a), Some(b)) => compare_precedence(&b, &a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

pub fn bump_patch(raw: &str) -> Option<String> {
    let version = parse_release(raw)?;
    Some(format!(
        "{}.{}.{}",
        version.major,
        version.minor,
        version.patch + 1
    ))
}

/// Highest strict release among `values`, returned as the original string.
pub fn max_release<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(|raw| parse_release(raw).map(|version| (version, raw)))
        .max_by(|(a, _), (b, _)| compare_precedence(a, b))
        .map(|(_, raw)| raw)
}

/// Extracts `X.Y.Z` directory segments such as `web/assets/1.6.14/app.js`.
pub fn release_from_path(path: &str) -> Option<String> {
    let padded = format!("/{}/", path.trim_matches('/'));
    RELEASE_IN_PATH
        .captures(&padded)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|candidate| parse_release(candidate).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        parse_lenient(raw).unwrap()
    }

    #[test]
    fn ga_outranks_prerelease() {
        assert_eq!(compare_precedence(&v("1.0.0"), &v("1.0.0-rc.1")), Ordering::Greater);
    }

    #[test]
    fn numeric_identifiers_rank_below_alphanumeric() {
        assert_eq!(
            compare_precedence(&v("1.0.0-1"), &v("1.0.0-alpha")),
            Ordering::Less
        );
        assert_eq!(
            compare_precedence(&v("1.0.0-alpha.2"), &v("1.0.0-alpha.10")),
            Ordering::Less
        );
    }

    #[test]
    fn shorter_prerelease_ranks_lower() {
        assert_eq!(
            compare_precedence(&v("1.0.0-alpha"), &v("1.0.0-alpha.1")),
            Ordering::Less
        );
    }

    #[test]
    fn build_metadata_is_ignored() {
        assert_eq!(
            compare_precedence(&v("1.2.3+build.7"), &v("1.2.3+build.9")),
            Ordering::Equal
        );
    }

    #[test]
    fn lenient_parse_accepts_prefix_and_whitespace() {
        assert_eq!(v("  v2.3.4 "), Version::new(2, 3, 4));
        assert!(parse_lenient("2.3").is_none());
    }

    #[test]
    fn sort_desc_puts_unparseable_last() {
        let mut items = vec!["1.3.2", "garbage", "1.4.0", "1.4.0-rc.1"];
        sort_desc(&mut items, |s| s);
        assert_eq!(items, vec!["1.4.0", "1.4.0-rc.1", "1.3.2", "garbage"]);
    }

    #[test]
    fn bump_and_max() {
        assert_eq!(bump_patch("1.2.9").as_deref(), Some("1.2.10"));
        assert!(bump_patch("1.2.9-rc.1").is_none());
        assert_eq!(max_release(["1.2.0", "1.10.0", "1.9.9", "x"]), Some("1.10.0"));
        assert_eq!(max_release(["x", "1.0"]), None);
    }

    #[test]
    fn release_segments_in_paths() {
        assert_eq!(
            release_from_path("web/assets/1.6.14").as_deref(),
            Some("1.6.14")
        );
        assert_eq!(release_from_path("web/assets/latest"), None);
    }
}
