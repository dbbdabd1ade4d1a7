//! Conflict classification.
//!
//! Decides what an apply failure means for the item: try again later, give
//! up, or stop and ask a human. Classification reads only the error's kind,
//! never its message, so the same error shape always yields the same verdict.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::processor::{ApplyError, ApplyErrorKind};

/// What to do with an item after a failed apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Expected to succeed if retried
    Transient,
    /// Will never succeed as written
    Permanent,
    /// Remote state has diverged; needs manual resolution
    Conflict,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Conflict => "conflict",
        };
        f.write_str(s)
    }
}

/// Default verdict for an error kind.
#[must_use]
pub const fn default_verdict(kind: ApplyErrorKind) -> Verdict {
    match kind {
        ApplyErrorKind::Network
        | ApplyErrorKind::Timeout
        | ApplyErrorKind::Unavailable
        | ApplyErrorKind::RateLimited => Verdict::Transient,
        ApplyErrorKind::Duplicate | ApplyErrorKind::StaleVersion => Verdict::Conflict,
        ApplyErrorKind::Validation
        | ApplyErrorKind::Malformed
        | ApplyErrorKind::Unauthorized
        | ApplyErrorKind::Unregistered
        | ApplyErrorKind::Other => Verdict::Permanent,
    }
}

/// Classify an error with the default rules.
#[must_use]
pub const fn classify(error: &ApplyError) -> Verdict {
    default_verdict(error.kind)
}

/// Rule table: default rules plus per-kind overrides.
///
/// Deployments whose remote uses a kind differently (for example an auth
/// token that refreshes on its own, making `Unauthorized` worth retrying)
/// override that kind instead of patching processors.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    overrides: HashMap<ApplyErrorKind, Verdict>,
}

impl Classifier {
    /// Classifier with only the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the verdict for one kind.
    #[must_use]
    pub fn with_rule(mut self, kind: ApplyErrorKind, verdict: Verdict) -> Self {
        self.overrides.insert(kind, verdict);
        self
    }

    /// Classify an error.
    #[must_use]
    pub fn classify(&self, error: &ApplyError) -> Verdict {
        self.overrides
            .get(&error.kind)
            .copied()
            .unwrap_or_else(|| default_verdict(error.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_transient() {
        for kind in [
            ApplyErrorKind::Network,
            ApplyErrorKind::Timeout,
            ApplyErrorKind::Unavailable,
            ApplyErrorKind::RateLimited,
        ] {
            assert_eq!(classify(&ApplyError::new(kind, "x")), Verdict::Transient);
        }
    }

    #[test]
    fn test_collisions_are_conflicts() {
        assert_eq!(
            classify(&ApplyError::duplicate("sale S-100 already recorded")),
            Verdict::Conflict
        );
        assert_eq!(
            classify(&ApplyError::new(ApplyErrorKind::StaleVersion, "v3 != v4")),
            Verdict::Conflict
        );
    }

    #[test]
    fn test_everything_else_is_permanent() {
        for kind in [
            ApplyErrorKind::Validation,
            ApplyErrorKind::Malformed,
            ApplyErrorKind::Unauthorized,
            ApplyErrorKind::Unregistered,
            ApplyErrorKind::Other,
        ] {
            assert_eq!(classify(&ApplyError::new(kind, "x")), Verdict::Permanent);
        }
    }

    #[test]
    fn test_message_does_not_affect_verdict() {
        // A validation error mentioning "timeout" is still a validation error
        let err = ApplyError::validation("field 'timeout' must be positive");
        assert_eq!(classify(&err), Verdict::Permanent);
        assert_eq!(classify(&err), classify(&err.clone()));
    }

    #[test]
    fn test_override_rule() {
        let classifier =
            Classifier::new().with_rule(ApplyErrorKind::Unauthorized, Verdict::Transient);

        assert_eq!(
            classifier.classify(&ApplyError::new(ApplyErrorKind::Unauthorized, "token expired")),
            Verdict::Transient
        );
        // Other kinds keep the defaults
        assert_eq!(
            classifier.classify(&ApplyError::duplicate("exists")),
            Verdict::Conflict
        );
    }

    #[test]
    fn test_classifier_is_deterministic() {
        let classifier = Classifier::new();
        let err = ApplyError::network("connection reset");
        let first = classifier.classify(&err);
        for _ in 0..100 {
            assert_eq!(classifier.classify(&err), first);
        }
    }
}
