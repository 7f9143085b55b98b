use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{Link, LinkError, LinkRecord, LinkRepository, Slug};

/// In-memory repository for tests and local runs. Each operation holds the
/// map lock for its whole check-and-write, which gives the same atomicity as
/// a conditional write against a real store.
pub struct InMemoryRepo {
    inner: Mutex<BTreeMap<String, LinkRecord>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, LinkRecord>>, LinkError> {
        self.inner
            .lock()
            .map_err(|_| LinkError::Repository("mutex poisoned".into()))
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkRepository for InMemoryRepo {
    async fn create(&self, link: &Link) -> Result<Link, LinkError> {
        let mut map = self.lock()?;
        let key = link.slug().as_str();
        if map.contains_key(key) {
            return Err(LinkError::SlugAlreadyExists(key.to_string()));
        }
        map.insert(key.to_string(), link.to_record());
        Ok(link.clone())
    }

    async fn get_by_slug(&self, slug: &Slug) -> Result<Link, LinkError> {
        let map = self.lock()?;
        map.get(slug.as_str())
            .cloned()
            .map(Link::reconstitute)
            .ok_or_else(|| LinkError::LinkNotFound(slug.to_string()))
    }

    async fn get_all(&self) -> Result<Vec<Link>, LinkError> {
        let map = self.lock()?;
        Ok(map.values().cloned().map(Link::reconstitute).collect())
    }

    async fn update(&self, link: &Link) -> Result<Link, LinkError> {
        let mut map = self.lock()?;
        match map.get_mut(link.slug().as_str()) {
            Some(stored) => {
                let next = link.to_record();
                stored.url = next.url;
                stored.last_update_date = next.last_update_date;
                stored.visit_count = next.visit_count;
                Ok(Link::reconstitute(stored.clone()))
            }
            None => Err(LinkError::SlugNotFound(link.slug().to_string())),
        }
    }

    async fn delete(&self, slug: &Slug) -> Result<(), LinkError> {
        let mut map = self.lock()?;
        match map.remove(slug.as_str()) {
            Some(_) => Ok(()),
            None => Err(LinkError::SlugNotFound(slug.to_string())),
        }
    }

    async fn increment_visit_count(&self, slug: &Slug) -> Result<u64, LinkError> {
        let mut map = self.lock()?;
        match map.get_mut(slug.as_str()) {
            Some(stored) => {
                stored.visit_count = stored.visit_count.saturating_add(1);
                Ok(stored.visit_count)
            }
            None => Err(LinkError::SlugNotFound(slug.to_string())),
        }
    }
}
