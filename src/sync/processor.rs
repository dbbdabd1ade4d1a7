//! Entity processors.
//!
//! A processor turns one queue item's payload into a call against the remote
//! store and maps whatever comes back into an [`ApplyError`] with an explicit
//! [`ApplyErrorKind`]. The registry is built once at startup and handed to
//! the orchestrator.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::item::QueueItem;

/// What went wrong with one apply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyErrorKind {
    /// Connection refused, reset, DNS failure
    Network,
    /// No response within the transport timeout
    Timeout,
    /// Remote reachable but not serving (5xx, maintenance)
    Unavailable,
    /// Remote asked us to slow down
    RateLimited,
    /// Remote already holds a record with the same unique key
    Duplicate,
    /// Write was based on a version the remote no longer has
    StaleVersion,
    /// Remote rejected the content
    Validation,
    /// Payload could not be decoded by the processor
    Malformed,
    /// Credentials missing or insufficient
    Unauthorized,
    /// No processor for the entity type
    Unregistered,
    /// Anything else
    Other,
}

impl ApplyErrorKind {
    /// Map an HTTP status code to a kind.
    ///
    /// Returns `None` for success codes.
    #[must_use]
    pub const fn from_http_status(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            401 | 403 => Some(Self::Unauthorized),
            408 | 504 => Some(Self::Timeout),
            409 => Some(Self::Duplicate),
            412 => Some(Self::StaleVersion),
            429 => Some(Self::RateLimited),
            400 | 422 => Some(Self::Validation),
            500..=599 => Some(Self::Unavailable),
            _ => Some(Self::Other),
        }
    }

    /// Display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::Duplicate => "duplicate",
            Self::StaleVersion => "stale_version",
            Self::Validation => "validation",
            Self::Malformed => "malformed",
            Self::Unauthorized => "unauthorized",
            Self::Unregistered => "unregistered",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ApplyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one apply attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApplyError {
    /// Machine-readable category, read by the classifier.
    pub kind: ApplyErrorKind,
    /// Human-readable diagnostic, stored as the item's `last_error`.
    pub message: String,
}

impl ApplyError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ApplyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApplyErrorKind::Network, message)
    }

    /// Transport timeout.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApplyErrorKind::Timeout, message)
    }

    /// Duplicate unique key on the remote.
    #[must_use]
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ApplyErrorKind::Duplicate, message)
    }

    /// Content rejected by the remote.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApplyErrorKind::Validation, message)
    }

    /// Payload the processor could not decode.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ApplyErrorKind::Malformed, message)
    }

    /// Build an error from an HTTP response.
    ///
    /// Success codes map to [`ApplyErrorKind::Other`]; callers should only
    /// use this for responses they already consider failures.
    #[must_use]
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let kind = ApplyErrorKind::from_http_status(status).unwrap_or(ApplyErrorKind::Other);
        Self::new(kind, format!("HTTP {status}: {}", body.into()))
    }

    /// Build an error from a free-text remote message.
    ///
    /// Keyword fallback for remotes that return no structured error code.
    /// Prefer [`ApplyError::new`] with an explicit kind whenever the remote
    /// offers one.
    #[must_use]
    pub fn from_remote_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let kind = if ["duplicate", "already exists", "unique constraint", "conflict"]
            .iter()
            .any(|k| lower.contains(k))
        {
            ApplyErrorKind::Duplicate
        } else if ["timed out", "timeout"].iter().any(|k| lower.contains(k)) {
            ApplyErrorKind::Timeout
        } else if ["network", "connection", "fetch", "offline", "unreachable"]
            .iter()
            .any(|k| lower.contains(k))
        {
            ApplyErrorKind::Network
        } else {
            ApplyErrorKind::Other
        };

        Self { kind, message }
    }
}

/// Acknowledgment of a successful apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Identifier the remote assigned, if any.
    pub remote_id: Option<String>,
}

impl Ack {
    /// Acknowledgment carrying the remote identifier.
    #[must_use]
    pub fn with_remote_id(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
        }
    }
}

/// Submits one item's payload to the remote store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Processor: Send + Sync {
    /// Apply the item remotely.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplyError`] whose kind the classifier turns into a
    /// retry, a permanent failure or a conflict.
    async fn apply(&self, item: &QueueItem) -> Result<Ack, ApplyError>;
}

/// Adapter that lets an async closure act as a [`Processor`].
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F> {
    /// Wrap a closure.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(QueueItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Ack, ApplyError>> + Send + 'static,
{
    async fn apply(&self, item: &QueueItem) -> Result<Ack, ApplyError> {
        (self.f)(item.clone()).await
    }
}

/// Map from entity type tag to its processor.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, returning the one it replaced.
    pub fn register<P>(
        &mut self,
        entity_type: impl Into<String>,
        processor: P,
    ) -> Option<Arc<dyn Processor>>
    where
        P: Processor + 'static,
    {
        self.processors
            .insert(entity_type.into(), Arc::new(processor))
    }

    /// Register an async closure as a processor.
    pub fn register_fn<F, Fut>(
        &mut self,
        entity_type: impl Into<String>,
        f: F,
    ) -> Option<Arc<dyn Processor>>
    where
        F: Fn(QueueItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Ack, ApplyError>> + Send + 'static,
    {
        self.register(entity_type, FnProcessor::new(f))
    }

    /// Look up the processor for an entity type.
    #[must_use]
    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(entity_type).cloned()
    }

    /// Check if an entity type has a processor.
    #[must_use]
    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.processors.contains_key(entity_type)
    }

    /// Registered entity types, sorted.
    #[must_use]
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered processors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Apply an item with the processor registered for its entity type.
    ///
    /// # Errors
    ///
    /// Returns the processor's error, or an [`ApplyErrorKind::Unregistered`]
    /// error when no processor matches.
    pub async fn apply(&self, item: &QueueItem) -> Result<Ack, ApplyError> {
        match self.get(&item.entity_type) {
            Some(processor) => processor.apply(item).await,
            None => Err(ApplyError::new(
                ApplyErrorKind::Unregistered,
                format!(
                    "no processor registered for entity type '{}'",
                    item.entity_type
                ),
            )),
        }
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ApplyErrorKind::from_http_status(201), None);
        assert_eq!(
            ApplyErrorKind::from_http_status(409),
            Some(ApplyErrorKind::Duplicate)
        );
        assert_eq!(
            ApplyErrorKind::from_http_status(412),
            Some(ApplyErrorKind::StaleVersion)
        );
        assert_eq!(
            ApplyErrorKind::from_http_status(503),
            Some(ApplyErrorKind::Unavailable)
        );
        assert_eq!(
            ApplyErrorKind::from_http_status(504),
            Some(ApplyErrorKind::Timeout)
        );
        assert_eq!(
            ApplyErrorKind::from_http_status(422),
            Some(ApplyErrorKind::Validation)
        );
        assert_eq!(
            ApplyErrorKind::from_http_status(403),
            Some(ApplyErrorKind::Unauthorized)
        );
        assert_eq!(
            ApplyErrorKind::from_http_status(418),
            Some(ApplyErrorKind::Other)
        );
    }

    #[test]
    fn test_from_http_status_message() {
        let err = ApplyError::from_http_status(429, "slow down");
        assert_eq!(err.kind, ApplyErrorKind::RateLimited);
        assert_eq!(err.message, "HTTP 429: slow down");
    }

    #[test]
    fn test_from_remote_message_keywords() {
        assert_eq!(
            ApplyError::from_remote_message("duplicate key value violates unique constraint").kind,
            ApplyErrorKind::Duplicate
        );
        assert_eq!(
            ApplyError::from_remote_message("Request timed out").kind,
            ApplyErrorKind::Timeout
        );
        assert_eq!(
            ApplyError::from_remote_message("Failed to fetch").kind,
            ApplyErrorKind::Network
        );
        assert_eq!(
            ApplyError::from_remote_message("quantity must be positive").kind,
            ApplyErrorKind::Other
        );
    }

    #[test]
    fn test_apply_error_display() {
        let err = ApplyError::network("connection reset by peer");
        assert_eq!(err.to_string(), "network: connection reset by peer");
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProcessorRegistry::new();
        assert!(registry.is_empty());

        registry.register_fn("sale", |_item| async { Ok::<_, ApplyError>(Ack::default()) });
        registry.register_fn("cash_movement", |_item| async { Ok::<_, ApplyError>(Ack::default()) });

        assert!(registry.is_registered("sale"));
        assert!(!registry.is_registered("refund"));
        assert_eq!(registry.entity_types(), vec!["cash_movement", "sale"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = ProcessorRegistry::new();
        assert!(registry
            .register_fn("sale", |_item| async { Ok::<_, ApplyError>(Ack::default()) })
            .is_none());
        assert!(registry
            .register_fn("sale", |_item| async { Ok::<_, ApplyError>(Ack::default()) })
            .is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_dispatches_by_entity_type() {
        let mut registry = ProcessorRegistry::new();
        registry.register_fn("sale", |item: QueueItem| async move {
            let total = item.payload["total"].as_i64().unwrap_or_default();
            Ok::<_, ApplyError>(Ack::with_remote_id(format!("sale-{total}")))
        });

        let ack = registry
            .apply(&QueueItem::sale(json!({"total": 990})))
            .await
            .unwrap();
        assert_eq!(ack.remote_id.as_deref(), Some("sale-990"));
    }

    #[tokio::test]
    async fn test_apply_unregistered_entity() {
        let registry = ProcessorRegistry::new();
        let err = registry
            .apply(&QueueItem::new("refund", json!({})))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApplyErrorKind::Unregistered);
        assert!(err.message.contains("'refund'"));
    }

    #[tokio::test]
    async fn test_mock_processor() {
        let mut mock = MockProcessor::new();
        mock.expect_apply()
            .times(1)
            .returning(|_| Err(ApplyError::duplicate("sale 42 exists")));

        let mut registry = ProcessorRegistry::new();
        registry.register("sale", mock);

        let err = registry
            .apply(&QueueItem::sale(json!({"id": 42})))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApplyErrorKind::Duplicate);
    }
}
