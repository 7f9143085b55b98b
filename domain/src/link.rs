//! The `Link` entity: an immutable value object. Every state transition
//! returns a new `Link`; nothing is mutated in place.

use crate::validate;
use crate::{epoch_millis, Clock, Slug, ValidationError};

/// Client input for a new link, before validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLink {
    pub slug: String,
    pub url: String,
}

/// Flat persisted shape of a link. Timestamps are ms since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRecord {
    pub slug: String,
    pub url: String,
    pub creation_date: u64,
    pub last_update_date: u64,
    pub visit_count: u64,
}

/// A stored short link mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    slug: Slug,
    url: String,
    creation_date: u64,
    last_update_date: u64,
    visit_count: u64,
}

/// Outcome of [`Link::change_url`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UrlChange {
    /// The new URL equals the current one; nothing to persist.
    Unchanged(Link),
    /// A copy carrying the new URL, to be persisted.
    Changed(Link),
}

impl UrlChange {
    pub fn needs_update(&self) -> bool {
        matches!(self, UrlChange::Changed(_))
    }

    pub fn link(&self) -> &Link {
        match self {
            UrlChange::Unchanged(link) | UrlChange::Changed(link) => link,
        }
    }

    pub fn into_link(self) -> Link {
        match self {
            UrlChange::Unchanged(link) | UrlChange::Changed(link) => link,
        }
    }
}

impl Link {
    /// Validate client input and build a fresh link (`visitCount = 0`).
    ///
    /// Fails before any storage is touched, with one issue per violated rule
    /// across both fields.
    pub fn create_for_new<C: Clock + ?Sized>(
        input: &NewLink,
        clock: &C,
    ) -> Result<Self, ValidationError> {
        let mut issues = validate::slug_issues(&input.slug);
        issues.extend(validate::url_issues(&input.url));
        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        let now = epoch_millis(clock.now());
        Ok(Self {
            slug: Slug::from_trusted(input.slug.to_ascii_lowercase()),
            url: input.url.clone(),
            creation_date: now,
            last_update_date: now,
            visit_count: 0,
        })
    }

    /// Rebuild a link from its stored record. No validation: the store only
    /// ever receives validated links.
    pub fn reconstitute(record: LinkRecord) -> Self {
        Self {
            slug: Slug::from_trusted(record.slug),
            url: record.url,
            creation_date: record.creation_date,
            last_update_date: record.last_update_date,
            visit_count: record.visit_count,
        }
    }

    pub fn to_record(&self) -> LinkRecord {
        LinkRecord {
            slug: self.slug.as_str().to_string(),
            url: self.url.clone(),
            creation_date: self.creation_date,
            last_update_date: self.last_update_date,
            visit_count: self.visit_count,
        }
    }

    /// Point the link at `new_url`.
    ///
    /// An identical URL short-circuits to [`UrlChange::Unchanged`] without
    /// validation; otherwise the URL is validated and `lastUpdateDate` moves
    /// to now.
    pub fn change_url<C: Clock + ?Sized>(
        &self,
        new_url: &str,
        clock: &C,
    ) -> Result<UrlChange, ValidationError> {
        if new_url == self.url {
            return Ok(UrlChange::Unchanged(self.clone()));
        }
        validate::validate_url(new_url)?;
        Ok(UrlChange::Changed(Self {
            slug: self.slug.clone(),
            url: new_url.to_string(),
            creation_date: self.creation_date,
            last_update_date: epoch_millis(clock.now()),
            visit_count: self.visit_count,
        }))
    }

    /// A copy with one more visit. The caller persists it.
    pub fn record_visit(&self) -> Self {
        Self {
            visit_count: self.visit_count.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn creation_date(&self) -> u64 {
        self.creation_date
    }

    pub fn last_update_date(&self) -> u64 {
        self.last_update_date
    }

    pub fn visit_count(&self) -> u64 {
        self.visit_count
    }
}
