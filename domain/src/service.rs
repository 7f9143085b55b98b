use tracing::{debug, error, info, warn};

use crate::{Clock, Link, LinkError, LinkRepository, Slug, UrlChange};

/// Result of creating a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedLink {
    pub short_url: String,
}

/// All links plus their count. `total` is always `data.len()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkList {
    pub total: usize,
    pub data: Vec<Link>,
}

/// State of a link after an update request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedLink {
    pub slug: Slug,
    pub url: String,
    pub short_url: String,
}

/// Where a visitor should be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redirect {
    /// The slug resolved; go to its target URL.
    Target(String),
    /// Missing, malformed or unknown slug, or a failed lookup; go to the
    /// fallback URL.
    Fallback(String),
}

impl Redirect {
    pub fn location(&self) -> &str {
        match self {
            Redirect::Target(url) | Redirect::Fallback(url) => url,
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, Redirect::Target(_))
    }
}

/// Application service composing entity rules and persistence calls.
///
/// Expected outcomes (validation, not found, conflict) come back as
/// `Err(LinkError)`; redirects never fail and degrade to the fallback URL.
pub struct LinkService<R: LinkRepository, C: Clock> {
    repo: R,
    clock: C,
    api_base: String,
    fallback_url: String,
}

impl<R: LinkRepository, C: Clock> LinkService<R, C> {
    /// `api_base` prefixes every short URL. The fallback redirect defaults to
    /// `https://portfolio.{host of api_base}`.
    pub fn new(repo: R, clock: C, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let fallback_url = derive_fallback_url(&api_base);
        Self {
            repo,
            clock,
            api_base,
            fallback_url,
        }
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = url.into();
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    pub fn short_url(&self, slug: &Slug) -> String {
        format!("{}/{}", self.api_base, slug)
    }

    /// Persist a validated link and return its short URL.
    pub async fn create_link(&self, link: &Link) -> Result<CreatedLink, LinkError> {
        let created = self.repo.create(link).await?;
        info!(slug = %created.slug(), url = %created.url(), "link created");
        Ok(CreatedLink {
            short_url: self.short_url(created.slug()),
        })
    }

    /// Resolve a slug for a visitor and count the visit.
    ///
    /// Counting is best effort: a failed counter write is logged and the
    /// visitor is still redirected.
    pub async fn redirect_link(&self, slug: Option<&str>) -> Redirect {
        let Some(raw) = slug.map(str::trim).filter(|s| !s.is_empty()) else {
            debug!("redirect without slug");
            return self.fallback();
        };

        let slug = match Slug::parse(raw) {
            Ok(s) => s,
            Err(_) => {
                warn!(slug = %raw, "malformed slug in redirect");
                return self.fallback();
            }
        };

        let link = match self.repo.get_by_slug(&slug).await {
            Ok(link) => link,
            Err(e) if e.is_not_found() => {
                warn!(slug = %slug, "redirect miss");
                return self.fallback();
            }
            Err(e) => {
                error!(slug = %slug, err = %e, "redirect lookup failed");
                return self.fallback();
            }
        };

        let visited = link.record_visit();
        match self.repo.increment_visit_count(&slug).await {
            Ok(count) => info!(
                slug = %slug,
                redirect_to = %visited.url(),
                visit_count = count,
                "redirect ok"
            ),
            Err(e) => warn!(
                slug = %slug,
                expected_visit_count = visited.visit_count(),
                err = %e,
                "visit count update failed"
            ),
        }
        Redirect::Target(visited.url().to_string())
    }

    pub async fn get_all_links(&self) -> Result<LinkList, LinkError> {
        let data = self.repo.get_all().await?;
        Ok(LinkList {
            total: data.len(),
            data,
        })
    }

    pub async fn delete_link(&self, slug: &Slug) -> Result<(), LinkError> {
        self.repo.delete(slug).await?;
        info!(slug = %slug, "link deleted");
        Ok(())
    }

    /// Point an existing link at `new_url`. An unchanged URL skips the write.
    pub async fn update_link(&self, slug: &Slug, new_url: &str) -> Result<UpdatedLink, LinkError> {
        let current = self.repo.get_by_slug(slug).await?;
        match current.change_url(new_url, &self.clock)? {
            UrlChange::Unchanged(link) => {
                debug!(slug = %slug, "url unchanged, skipping write");
                Ok(self.updated(&link))
            }
            UrlChange::Changed(link) => {
                let saved = self.repo.update(&link).await?;
                info!(slug = %slug, url = %saved.url(), "link updated");
                Ok(self.updated(&saved))
            }
        }
    }

    fn updated(&self, link: &Link) -> UpdatedLink {
        UpdatedLink {
            slug: link.slug().clone(),
            url: link.url().to_string(),
            short_url: self.short_url(link.slug()),
        }
    }

    fn fallback(&self) -> Redirect {
        Redirect::Fallback(self.fallback_url.clone())
    }
}

/// `https://portfolio.{host}` where host is taken from `api_base`.
fn derive_fallback_url(api_base: &str) -> String {
    let rest = api_base
        .split_once("://")
        .map_or(api_base, |(_, rest)| rest);
    let host = rest.split('/').next().unwrap_or(rest);
    format!("https://portfolio.{host}")
}
