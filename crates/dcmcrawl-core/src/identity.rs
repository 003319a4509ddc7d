//! Subject identity lookup
//!
//! Files only carry project and session identifiers in their paths; the
//! subject label has to be looked up in XNAT. [`IdentityCache`] wraps a
//! backend so that each (project, session) pair is looked up at most once per
//! run.

use crate::error::IdentityError;
use log::{debug, warn};
use std::collections::HashMap;

/// Backend mapping a (project, session) pair to a subject label
pub trait IdentityResolver {
    /// Short backend name used in log messages
    fn name(&self) -> &'static str;

    /// Look up the subject label of a session
    ///
    /// Returns `Ok(None)` when XNAT has no such session.
    ///
    /// # Errors
    ///
    /// Returns an error when the identity service cannot be queried.
    fn lookup(&mut self, project: &str, session: &str) -> Result<Option<String>, IdentityError>;
}

/// Backend that never resolves a subject
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityResolver for NoIdentity {
    fn name(&self) -> &'static str {
        "none"
    }

    fn lookup(&mut self, _project: &str, _session: &str) -> Result<Option<String>, IdentityError> {
        Ok(None)
    }
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn lookup(&mut self, project: &str, session: &str) -> Result<Option<String>, IdentityError> {
        (**self).lookup(project, session)
    }
}

type CacheKey = (Option<String>, Option<String>);

/// Per-run memo of subject lookups
///
/// Not-found results and failed lookups are cached as `None` as well, so a
/// session is never queried twice within one run.
pub struct IdentityCache<R> {
    resolver: R,
    entries: HashMap<CacheKey, Option<String>>,
    lookups: usize,
    failures: usize,
}

impl<R: IdentityResolver> IdentityCache<R> {
    /// Empty cache in front of `resolver`
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            entries: HashMap::new(),
            lookups: 0,
            failures: 0,
        }
    }

    /// Subject label for a (project, session) pair
    ///
    /// Pairs missing either component resolve to `None` without a lookup.
    pub fn resolve(&mut self, project: Option<&str>, session: Option<&str>) -> Option<String> {
        let key = (project.map(str::to_owned), session.map(str::to_owned));
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }

        let subject = match (project, session) {
            (Some(project), Some(session)) => {
                self.lookups += 1;
                match self.resolver.lookup(project, session) {
                    Ok(subject) => {
                        debug!(
                            "{} lookup {project}/{session} -> {}",
                            self.resolver.name(),
                            subject.as_deref().unwrap_or("<not found>")
                        );
                        subject
                    }
                    Err(e) => {
                        self.failures += 1;
                        warn!("Subject lookup failed for {project}/{session}: {e}");
                        None
                    }
                }
            }
            _ => None,
        };

        self.entries.insert(key, subject.clone());
        subject
    }

    /// Number of external lookups performed so far
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Number of external lookups that failed
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Number of distinct pairs seen
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pair has been resolved yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The wrapped backend
    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that records every call
    #[derive(Default)]
    struct Recording {
        calls: Vec<(String, String)>,
        fail: bool,
    }

    impl IdentityResolver for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn lookup(&mut self, project: &str, session: &str) -> Result<Option<String>, IdentityError> {
            self.calls.push((project.to_string(), session.to_string()));
            if self.fail {
                return Err(IdentityError::InvalidUrl("offline".to_string()));
            }
            Ok((session != "UNKNOWN").then(|| format!("{project}-subj")))
        }
    }

    #[test]
    fn test_single_lookup_per_pair() {
        let mut cache = IdentityCache::new(Recording::default());

        assert_eq!(cache.resolve(Some("P1"), Some("S1")).as_deref(), Some("P1-subj"));
        assert_eq!(cache.resolve(Some("P1"), Some("S1")).as_deref(), Some("P1-subj"));
        assert_eq!(cache.resolve(Some("P1"), Some("S2")).as_deref(), Some("P1-subj"));

        assert_eq!(cache.lookups(), 2);
        assert_eq!(cache.resolver().calls.len(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_not_found_is_cached() {
        let mut cache = IdentityCache::new(Recording::default());

        assert_eq!(cache.resolve(Some("P1"), Some("UNKNOWN")), None);
        assert_eq!(cache.resolve(Some("P1"), Some("UNKNOWN")), None);

        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_failure_is_cached_as_not_found() {
        let mut cache = IdentityCache::new(Recording {
            fail: true,
            ..Recording::default()
        });

        assert_eq!(cache.resolve(Some("P1"), Some("S1")), None);
        assert_eq!(cache.resolve(Some("P1"), Some("S1")), None);

        assert_eq!(cache.lookups(), 1);
        assert_eq!(cache.failures(), 1);
    }

    #[test]
    fn test_incomplete_pair_skips_lookup() {
        let mut cache = IdentityCache::new(Recording::default());

        assert_eq!(cache.resolve(None, Some("S1")), None);
        assert_eq!(cache.resolve(Some("P1"), None), None);
        assert_eq!(cache.resolve(None, None), None);

        assert_eq!(cache.lookups(), 0);
        assert!(cache.resolver().calls.is_empty());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_no_identity() {
        let mut cache = IdentityCache::new(NoIdentity);
        assert!(cache.is_empty());
        assert_eq!(cache.resolve(Some("P"), Some("S")), None);
        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_boxed_resolver() {
        let boxed: Box<dyn IdentityResolver> = Box::new(NoIdentity);
        let mut cache = IdentityCache::new(boxed);
        assert_eq!(cache.resolver().name(), "none");
        assert_eq!(cache.resolve(Some("P"), Some("S")), None);
    }
}
