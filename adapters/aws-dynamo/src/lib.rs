//! DynamoDB adapter implementing the `LinkRepository` port.
//!
//! - One table with partition key `slug` (string).
//! - Items are flat: `slug`, `url`, `creationDate`, `lastUpdateDate`,
//!   `visitCount` (timestamps in ms since the epoch).
//! - Every existence check is a condition expression on the write itself, so
//!   create/update/delete are single atomic requests.

use std::collections::HashMap;
use std::error::Error;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use domain::{Link, LinkError, LinkRecord, LinkRepository, Slug};
use tracing::warn;

type Item = HashMap<String, AttributeValue>;

const CONDITION_FAILED: &str = "ConditionalCheckFailedException";

/// Repository backed by AWS DynamoDB.
///
/// The SDK client is cheap to clone and holds no request state, so one
/// instance is shared across invocations.
#[derive(Clone)]
pub struct DynamoRepo {
    table: String,
    client: Client,
}

impl DynamoRepo {
    /// Create a repo from an explicit table name and SDK client.
    pub fn with_client(table: impl Into<String>, client: Client) -> Self {
        Self {
            table: table.into(),
            client,
        }
    }

    /// Create a repo with a default SDK client (env, profile or IMDS credentials).
    pub async fn new(table: impl Into<String>) -> Self {
        let conf = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::with_client(table, Client::new(&conf))
    }

    fn key(slug: &str) -> AttributeValue {
        AttributeValue::S(slug.to_string())
    }
}

#[async_trait]
impl LinkRepository for DynamoRepo {
    async fn create(&self, link: &Link) -> Result<Link, LinkError> {
        let slug = link.slug().as_str();
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(&link.to_record())))
            .condition_expression("attribute_not_exists(#s)")
            .expression_attribute_names("#s", "slug")
            .send()
            .await
            .map_err(|e| {
                if condition_failed(&e) {
                    LinkError::SlugAlreadyExists(slug.to_string())
                } else {
                    map_sdk_err(e)
                }
            })?;
        Ok(link.clone())
    }

    async fn get_by_slug(&self, slug: &Slug) -> Result<Link, LinkError> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("slug", Self::key(slug.as_str()))
            .consistent_read(true)
            .send()
            .await
            .map_err(map_sdk_err)?;
        match out.item() {
            Some(item) => item_to_record(item).map(Link::reconstitute),
            None => Err(LinkError::LinkNotFound(slug.to_string())),
        }
    }

    async fn get_all(&self) -> Result<Vec<Link>, LinkError> {
        let mut links = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let out = self
                .client
                .scan()
                .table_name(&self.table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(map_sdk_err)?;
            for item in out.items() {
                match item_to_record(item) {
                    Ok(record) => links.push(Link::reconstitute(record)),
                    Err(e) => warn!(table = %self.table, err = %e, "skipping malformed item"),
                }
            }
            match out.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(links)
    }

    async fn update(&self, link: &Link) -> Result<Link, LinkError> {
        let record = link.to_record();
        let out = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("slug", Self::key(&record.slug))
            .update_expression(
                "SET #url = :url, lastUpdateDate = :updated, visitCount = :visits",
            )
            .condition_expression("attribute_exists(#s)")
            .expression_attribute_names("#url", "url")
            .expression_attribute_names("#s", "slug")
            .expression_attribute_values(":url", AttributeValue::S(record.url.clone()))
            .expression_attribute_values(
                ":updated",
                AttributeValue::N(record.last_update_date.to_string()),
            )
            .expression_attribute_values(
                ":visits",
                AttributeValue::N(record.visit_count.to_string()),
            )
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                if condition_failed(&e) {
                    LinkError::SlugNotFound(record.slug.clone())
                } else {
                    map_sdk_err(e)
                }
            })?;
        match out.attributes() {
            Some(attrs) => item_to_record(attrs).map(Link::reconstitute),
            None => Ok(link.clone()),
        }
    }

    async fn delete(&self, slug: &Slug) -> Result<(), LinkError> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("slug", Self::key(slug.as_str()))
            .condition_expression("attribute_exists(#s)")
            .expression_attribute_names("#s", "slug")
            .send()
            .await
            .map_err(|e| {
                if condition_failed(&e) {
                    LinkError::SlugNotFound(slug.to_string())
                } else {
                    map_sdk_err(e)
                }
            })?;
        Ok(())
    }

    async fn increment_visit_count(&self, slug: &Slug) -> Result<u64, LinkError> {
        let out = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("slug", Self::key(slug.as_str()))
            .update_expression("SET visitCount = if_not_exists(visitCount, :zero) + :inc")
            .condition_expression("attribute_exists(#s)")
            .expression_attribute_names("#s", "slug")
            .expression_attribute_values(":zero", AttributeValue::N("0".into()))
            .expression_attribute_values(":inc", AttributeValue::N("1".into()))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await
            .map_err(|e| {
                if condition_failed(&e) {
                    LinkError::SlugNotFound(slug.to_string())
                } else {
                    map_sdk_err(e)
                }
            })?;
        out.attributes()
            .and_then(|attrs| get_n(attrs, "visitCount"))
            .ok_or_else(|| LinkError::Repository("update returned no visitCount".into()))
    }
}

fn condition_failed<E: ProvideErrorMetadata, R>(e: &SdkError<E, R>) -> bool {
    e.as_service_error().is_some_and(is_condition_failed)
}

fn is_condition_failed<E: ProvideErrorMetadata>(e: &E) -> bool {
    e.code() == Some(CONDITION_FAILED)
}

fn map_sdk_err<E: ProvideErrorMetadata + Error>(e: E) -> LinkError {
    if e.code() == Some("ResourceNotFoundException") {
        return LinkError::Repository("missing table".into());
    }
    LinkError::Repository(format!("dynamo error: {}", DisplayErrorContext(&e)))
}

fn get_s<'a>(item: &'a Item, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
}

fn get_n(item: &Item, key: &str) -> Option<u64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

fn record_to_item(record: &LinkRecord) -> Item {
    let mut m = HashMap::new();
    m.insert("slug".into(), AttributeValue::S(record.slug.clone()));
    m.insert("url".into(), AttributeValue::S(record.url.clone()));
    m.insert(
        "creationDate".into(),
        AttributeValue::N(record.creation_date.to_string()),
    );
    m.insert(
        "lastUpdateDate".into(),
        AttributeValue::N(record.last_update_date.to_string()),
    );
    m.insert(
        "visitCount".into(),
        AttributeValue::N(record.visit_count.to_string()),
    );
    m
}

fn item_to_record(item: &Item) -> Result<LinkRecord, LinkError> {
    let slug = get_s(item, "slug")
        .ok_or_else(|| LinkError::Repository("item missing slug".into()))?;
    let url = get_s(item, "url").ok_or_else(|| LinkError::Repository("item missing url".into()))?;
    let creation_date = get_n(item, "creationDate")
        .ok_or_else(|| LinkError::Repository("item missing creationDate".into()))?;

    // Older items were written without these two attributes
    let last_update_date = get_n(item, "lastUpdateDate").unwrap_or(creation_date);
    let visit_count = get_n(item, "visitCount").unwrap_or(0);

    Ok(LinkRecord {
        slug: slug.to_string(),
        url: url.to_string(),
        creation_date,
        last_update_date,
        visit_count,
    })
}
