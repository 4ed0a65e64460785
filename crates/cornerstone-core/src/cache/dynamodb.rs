use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tokio::sync::OnceCell;
use tracing::debug;

use super::CacheBackend;

/// Partition key attribute.
const KEY_ATTR: &str = "key";

/// Serialized credential attribute.
const VALUE_ATTR: &str = "value";

/// Stores each key as an item `{ key: S, value: S }` in a DynamoDB table,
/// the `key` attribute being `<namespace>/<key>`.
///
/// The AWS client is built on first use from the default credential chain.
pub struct DynamoDbCache {
    region: String,
    table: String,
    namespace: String,
    client: OnceCell<Client>,
}

impl DynamoDbCache {
    pub fn new(region: &str, table: &str, namespace: &str) -> Self {
        Self {
            region: region.to_string(),
            table: table.to_string(),
            namespace: namespace.to_string(),
            client: OnceCell::new(),
        }
    }

    fn item_key(&self, key: &str) -> String {
        format!("{}/{}", self.namespace, key)
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()))
                    .load()
                    .await;
                Client::new(&config)
            })
            .await
    }
}

#[async_trait]
impl CacheBackend for DynamoDbCache {
    fn name(&self) -> &'static str {
        "dynamodb"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let output = self
            .client()
            .await
            .get_item()
            .table_name(&self.table)
            .key(KEY_ATTR, AttributeValue::S(self.item_key(key)))
            .send()
            .await
            .with_context(|| format!("Failed to read {} from table {}", key, self.table))?;

        let value = output
            .item()
            .and_then(|item| item.get(VALUE_ATTR))
            .and_then(|attr| attr.as_s().ok())
            .cloned();
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.client()
            .await
            .put_item()
            .table_name(&self.table)
            .item(KEY_ATTR, AttributeValue::S(self.item_key(key)))
            .item(VALUE_ATTR, AttributeValue::S(value.to_string()))
            .send()
            .await
            .with_context(|| format!("Failed to write {} to table {}", key, self.table))?;
        debug!(key = key, table = %self.table, "Credential written to DynamoDB");
        Ok(())
    }
}
