//! Dotted schema-version comparison.

/// Whether `version` is at least `minimum`, comparing dotted numeric
/// segments. Non-numeric segments compare as zero.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|segment| segment.trim().parse().unwrap_or(0))
            .collect()
    };
    let version = parse(version);
    let minimum = parse(minimum);
    let len = version.len().max(minimum.len());
    for i in 0..len {
        let a = version.get(i).copied().unwrap_or(0);
        let b = minimum.get(i).copied().unwrap_or(0);
        if a != b {
            return a > b;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_dotted_segments_numerically() {
        assert!(version_at_least("2.0", "2.0"));
        assert!(version_at_least("2.1", "2.0"));
        assert!(version_at_least("10.0", "9.9"));
        assert!(!version_at_least("1.9", "2.0"));
        assert!(version_at_least("2.0.1", "2.0"));
        assert!(!version_at_least("2", "2.1"));
    }

    #[test]
    fn garbage_compares_as_zero() {
        assert!(!version_at_least("banana", "0.9"));
        assert!(version_at_least("1.x", "1.0"));
    }
}
