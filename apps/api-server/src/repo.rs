//! Storage selected at startup: in-memory or DynamoDB.

use async_trait::async_trait;
use aws_dynamo::DynamoRepo;
use domain::adapters::memory_repo::InMemoryRepo;
use domain::{Link, LinkError, LinkRepository, Slug};

use crate::config::{Config, ConfigError, StorageProvider};

pub enum AnyRepo {
    Memory(InMemoryRepo),
    Dynamo(DynamoRepo),
}

impl AnyRepo {
    pub fn memory() -> Self {
        AnyRepo::Memory(InMemoryRepo::new())
    }

    /// Construct the repository named by the config.
    pub async fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        match cfg.storage_provider {
            StorageProvider::Memory => Ok(Self::memory()),
            StorageProvider::Dynamo => {
                let table = cfg.table_name.clone().ok_or_else(|| ConfigError {
                    field: "TABLE_NAME",
                    message: "Required when STORAGE_PROVIDER=dynamo".into(),
                })?;
                Ok(AnyRepo::Dynamo(DynamoRepo::new(table).await))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyRepo::Memory(_) => "memory",
            AnyRepo::Dynamo(_) => "dynamo",
        }
    }
}

#[async_trait]
impl LinkRepository for AnyRepo {
    async fn create(&self, link: &Link) -> Result<Link, LinkError> {
        match self {
            AnyRepo::Memory(r) => r.create(link).await,
            AnyRepo::Dynamo(r) => r.create(link).await,
        }
    }

    async fn get_by_slug(&self, slug: &Slug) -> Result<Link, LinkError> {
        match self {
            AnyRepo::Memory(r) => r.get_by_slug(slug).await,
            AnyRepo::Dynamo(r) => r.get_by_slug(slug).await,
        }
    }

    async fn get_all(&self) -> Result<Vec<Link>, LinkError> {
        match self {
            AnyRepo::Memory(r) => r.get_all().await,
            AnyRepo::Dynamo(r) => r.get_all().await,
        }
    }

    async fn update(&self, link: &Link) -> Result<Link, LinkError> {
        match self {
            AnyRepo::Memory(r) => r.update(link).await,
            AnyRepo::Dynamo(r) => r.update(link).await,
        }
    }

    async fn delete(&self, slug: &Slug) -> Result<(), LinkError> {
        match self {
            AnyRepo::Memory(r) => r.delete(slug).await,
            AnyRepo::Dynamo(r) => r.delete(slug).await,
        }
    }

    async fn increment_visit_count(&self, slug: &Slug) -> Result<u64, LinkError> {
        match self {
            AnyRepo::Memory(r) => r.increment_visit_count(slug).await,
            AnyRepo::Dynamo(r) => r.increment_visit_count(slug).await,
        }
    }
}
