//! Domain library for the shortlink service.
//!
//! Holds the `Link` entity and its validation rules, the persistence port
//! (`LinkRepository`), the error taxonomy and the `LinkService` use cases.
//! Storage adapters live in their own crates; the in-memory adapter under
//! [`adapters`] exists for tests and local runs.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod adapters;
pub mod link;
pub mod service;
pub mod validate;

pub use link::{Link, LinkRecord, NewLink, UrlChange};

/// A URL-safe slug identifying a short link. Always stored lowercase.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slug(String);

impl Slug {
    /// Validate a raw slug and normalize it to lowercase.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let issues = validate::slug_issues(raw);
        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }
        Ok(Self::from_trusted(raw.to_ascii_lowercase()))
    }

    /// Wrap a value that already passed validation or came back from storage.
    pub(crate) fn from_trusted(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Milliseconds since the Unix epoch; times before the epoch clamp to 0.
pub fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Persistence port for links, keyed by slug.
///
/// Existence checks are part of each write (conditional writes), never a
/// separate read, so uniqueness holds without application-level locking.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Insert a link. Fails with `SlugAlreadyExists` if the slug is taken.
    async fn create(&self, link: &Link) -> Result<Link, LinkError>;
    /// Fetch a link. Fails with `LinkNotFound` if absent.
    async fn get_by_slug(&self, slug: &Slug) -> Result<Link, LinkError>;
    /// All stored links; empty when there are none.
    async fn get_all(&self) -> Result<Vec<Link>, LinkError>;
    /// Replace `url`, `lastUpdateDate` and `visitCount` of an existing link.
    /// Fails with `SlugNotFound` if the record is gone at write time.
    async fn update(&self, link: &Link) -> Result<Link, LinkError>;
    /// Physically remove a link. Fails with `SlugNotFound` if absent.
    async fn delete(&self, slug: &Slug) -> Result<(), LinkError>;
    /// Atomically add one to the visit counter and return the new value.
    /// Fails with `SlugNotFound` if absent.
    async fn increment_visit_count(&self, slug: &Slug) -> Result<u64, LinkError>;
}

#[async_trait]
impl<R: LinkRepository + ?Sized> LinkRepository for Arc<R> {
    async fn create(&self, link: &Link) -> Result<Link, LinkError> {
        (**self).create(link).await
    }

    async fn get_by_slug(&self, slug: &Slug) -> Result<Link, LinkError> {
        (**self).get_by_slug(slug).await
    }

    async fn get_all(&self) -> Result<Vec<Link>, LinkError> {
        (**self).get_all().await
    }

    async fn update(&self, link: &Link) -> Result<Link, LinkError> {
        (**self).update(link).await
    }

    async fn delete(&self, slug: &Slug) -> Result<(), LinkError> {
        (**self).delete(slug).await
    }

    async fn increment_visit_count(&self, slug: &Slug) -> Result<u64, LinkError> {
        (**self).increment_visit_count(slug).await
    }
}

/// One violated validation rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every validation rule the input broke, not just the first.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid link data: {}", describe(.issues))]
pub struct ValidationError {
    issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    /// Whether any issue concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

fn describe(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Core domain errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Slug '{0}' already exists")]
    SlugAlreadyExists(String),
    #[error("Link with slug '{0}' not found")]
    LinkNotFound(String),
    #[error("Slug '{0}' not found")]
    SlugNotFound(String),
    #[error("repository error: {0}")]
    Repository(String),
}

impl LinkError {
    /// Both read misses and conditional-write misses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LinkError::LinkNotFound(_) | LinkError::SlugNotFound(_))
    }
}
