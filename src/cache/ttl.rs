//! TTL Policy Module
//!
//! Maps a resource class to an expiry duration.

use std::time::Duration;

// == TTL Policy ==
/// Ordered `(class pattern, ttl)` table with a default fallback.
///
/// Lookup is **first match**, not longest match: the first pattern that
/// occurs anywhere in the resource identifier decides the TTL. Put more
/// specific patterns before more general ones.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    classes: Vec<(String, Duration)>,
    default_ttl: Duration,
}

impl TtlPolicy {
    // == Constructor ==
    /// Creates a policy with no classes.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            classes: Vec::new(),
            default_ttl,
        }
    }

    /// Creates a policy from an ordered class table.
    pub fn from_classes<I, S>(classes: I, default_ttl: Duration) -> Self
    where
        I: IntoIterator<Item = (S, Duration)>,
        S: Into<String>,
    {
        Self {
            classes: classes
                .into_iter()
                .map(|(pattern, ttl)| (pattern.into(), ttl))
                .collect(),
            default_ttl,
        }
    }

    /// Appends a class after every existing one.
    pub fn with_class(mut self, pattern: impl Into<String>, ttl: Duration) -> Self {
        self.classes.push((pattern.into(), ttl));
        self
    }

    // == TTL For ==
    /// Returns the TTL of the first class contained in `resource_id`.
    pub fn ttl_for(&self, resource_id: &str) -> Duration {
        self.classes
            .iter()
            .find(|(pattern, _)| resource_id.contains(pattern.as_str()))
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.default_ttl)
    }

    /// Returns the fallback TTL.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the class table in match order.
    pub fn classes(&self) -> &[(String, Duration)] {
        &self.classes
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60;

    #[test]
    fn test_default_when_nothing_matches() {
        let policy = TtlPolicy::new(Duration::from_secs(5 * MIN))
            .with_class("/api/optimize", Duration::from_secs(10 * MIN));

        assert_eq!(policy.ttl_for("/api/other"), Duration::from_secs(5 * MIN));
    }

    #[test]
    fn test_substring_match() {
        let policy = TtlPolicy::new(Duration::from_secs(MIN))
            .with_class("optimize", Duration::from_secs(10 * MIN));

        assert_eq!(
            policy.ttl_for("/v2/api/optimize/batch"),
            Duration::from_secs(10 * MIN)
        );
    }

    #[test]
    fn test_first_match_wins_over_longest_match() {
        // "/api" also matches "/api/optimize"; it is listed first, so it wins.
        let policy = TtlPolicy::from_classes(
            [
                ("/api", Duration::from_secs(MIN)),
                ("/api/optimize", Duration::from_secs(10 * MIN)),
            ],
            Duration::from_secs(5 * MIN),
        );

        assert_eq!(policy.ttl_for("/api/optimize"), Duration::from_secs(MIN));
    }

    #[test]
    fn test_specific_first_ordering() {
        let policy = TtlPolicy::from_classes(
            [
                ("/api/optimize", Duration::from_secs(10 * MIN)),
                ("/api", Duration::from_secs(MIN)),
            ],
            Duration::from_secs(5 * MIN),
        );

        assert_eq!(
            policy.ttl_for("/api/optimize"),
            Duration::from_secs(10 * MIN)
        );
        assert_eq!(policy.ttl_for("/api/parse"), Duration::from_secs(MIN));
        assert_eq!(policy.classes().len(), 2);
    }
}
