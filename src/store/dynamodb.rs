//! DynamoDB store backend.
//!
//! Uses the AWS SDK for Rust with the standard credential chain (environment,
//! instance profile, etc.). Scans project only the attributes the pipeline
//! reads, batch deletes go through `BatchWriteItem`, and SDK errors are
//! classified into transient and fatal store errors.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::Blob,
    types::{AttributeValue, DeleteRequest, WriteRequest},
};

use super::{
    error::{StoreError, StoreResult},
    traits::StoreClient,
    types::{ItemKey, Record, ScalarValue, ScanPage, ScanToken},
};

/// Configuration for the DynamoDB client.
#[derive(Debug, Clone)]
pub struct DynamoStoreConfig {
    /// AWS region (e.g., "us-east-1"). `None` uses the environment's default.
    pub region: Option<String>,
    /// Optional endpoint URL for testing with localstack.
    pub endpoint_url: Option<String>,
}

impl DynamoStoreConfig {
    /// Create a new config with the given region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            endpoint_url: None,
        }
    }

    /// Create a new config using the default region from the environment.
    pub fn from_env() -> Self {
        Self {
            region: None,
            endpoint_url: None,
        }
    }

    /// Set a custom endpoint URL (useful for localstack testing).
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }
}

/// DynamoDB-backed [`StoreClient`].
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    /// Connect with the given configuration.
    pub async fn connect(config: DynamoStoreConfig) -> Self {
        let mut aws_config = aws_config::from_env();

        if let Some(region) = &config.region {
            aws_config = aws_config.region(aws_config::Region::new(region.clone()));
        }

        let aws_config = aws_config.load().await;

        let mut ddb_config = aws_sdk_dynamodb::config::Builder::from(&aws_config);

        if let Some(endpoint_url) = &config.endpoint_url {
            ddb_config = ddb_config.endpoint_url(endpoint_url);
        }

        Self {
            client: Client::from_conf(ddb_config.build()),
        }
    }

    /// Wrap an already-configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoreClient for DynamoStore {
    async fn scan_page(
        &self,
        table: &str,
        attributes: &[&str],
        start: Option<ScanToken>,
    ) -> StoreResult<ScanPage> {
        // Attribute names are aliased unconditionally so reserved words
        // ("name", "status", ...) work as key or reference attributes.
        let projection = attributes
            .iter()
            .map(|attribute| format!("#{attribute}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut request = self
            .client
            .scan()
            .table_name(table)
            .projection_expression(projection);
        for attribute in attributes {
            request = request.expression_attribute_names(format!("#{attribute}"), *attribute);
        }
        if let Some(token) = start {
            request = request.set_exclusive_start_key(Some(to_key_map(&token.0)));
        }

        let output = request.send().await.map_err(classify_sdk_error)?;

        let records = output.items().iter().map(from_item).collect();
        let next = output
            .last_evaluated_key()
            .map(|key| ScanToken(from_item(key)));

        Ok(ScanPage { records, next })
    }

    async fn delete_batch(&self, table: &str, keys: Vec<ItemKey>) -> StoreResult<Vec<ItemKey>> {
        let mut requests = Vec::with_capacity(keys.len());
        for key in &keys {
            let delete = DeleteRequest::builder()
                .key(key.attribute.clone(), to_attribute_value(&key.value))
                .build()
                .map_err(|e| StoreError::fatal(format!("malformed delete request for {key}: {e}")))?;
            requests.push(WriteRequest::builder().delete_request(delete).build());
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|tables| tables.get(table))
            .map(|requests| requests.iter().filter_map(write_request_key).collect())
            .unwrap_or_default();

        Ok(unprocessed)
    }
}

fn to_attribute_value(value: &ScalarValue) -> AttributeValue {
    match value {
        ScalarValue::S(s) => AttributeValue::S(s.clone()),
        ScalarValue::N(n) => AttributeValue::N(n.clone()),
        ScalarValue::B(b) => AttributeValue::B(Blob::new(b.clone())),
    }
}

fn from_attribute_value(value: &AttributeValue) -> Option<ScalarValue> {
    match value {
        AttributeValue::S(s) => Some(ScalarValue::S(s.clone())),
        AttributeValue::N(n) => Some(ScalarValue::N(n.clone())),
        AttributeValue::B(b) => Some(ScalarValue::B(b.clone().into_inner())),
        // Non-scalar attributes cannot act as keys, references, or
        // timestamps; projected ones are dropped.
        _ => None,
    }
}

fn from_item(item: &HashMap<String, AttributeValue>) -> Record {
    item.iter()
        .filter_map(|(name, value)| from_attribute_value(value).map(|v| (name.clone(), v)))
        .collect()
}

fn to_key_map(record: &Record) -> HashMap<String, AttributeValue> {
    record
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute_value(value)))
        .collect()
}

fn write_request_key(request: &WriteRequest) -> Option<ItemKey> {
    let key = request.delete_request()?.key();
    let (attribute, value) = key.iter().next()?;
    Some(ItemKey::new(attribute.clone(), from_attribute_value(value)?))
}

fn classify_sdk_error<E>(err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    // Timeouts and connection-level failures never carried a service
    // response; they are transient by definition.
    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return StoreError::transient(DisplayErrorContext(&err).to_string());
    }

    let transient = err.code().is_some_and(is_transient_code);
    let message = DisplayErrorContext(&err).to_string();
    if transient {
        StoreError::transient(message)
    } else {
        // Includes ResourceNotFoundException, ValidationException, and
        // AccessDeniedException: configuration problems a retry cannot fix.
        StoreError::fatal(message)
    }
}

fn is_transient_code(code: &str) -> bool {
    matches!(
        code,
        "ProvisionedThroughputExceededException"
            | "ThrottlingException"
            | "RequestLimitExceeded"
            | "InternalServerError"
            | "ServiceUnavailable"
            | "TransactionConflictException"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = DynamoStoreConfig::new("us-west-2").with_endpoint_url("http://localhost:4566");
        assert_eq!(config.region, Some("us-west-2".to_string()));
        assert_eq!(
            config.endpoint_url,
            Some("http://localhost:4566".to_string())
        );
    }

    #[test]
    fn test_config_from_env() {
        let config = DynamoStoreConfig::from_env();
        assert_eq!(config.region, None);
        assert_eq!(config.endpoint_url, None);
    }

    #[test]
    fn test_transient_codes() {
        assert!(is_transient_code("ProvisionedThroughputExceededException"));
        assert!(is_transient_code("ThrottlingException"));
        assert!(is_transient_code("RequestLimitExceeded"));
        assert!(is_transient_code("InternalServerError"));

        assert!(!is_transient_code("ResourceNotFoundException"));
        assert!(!is_transient_code("ValidationException"));
        assert!(!is_transient_code("AccessDeniedException"));
    }

    #[test]
    fn test_scalar_round_trip() {
        for value in [
            ScalarValue::S("abc".into()),
            ScalarValue::N("42.5".into()),
            ScalarValue::B(vec![1, 2, 3]),
        ] {
            let converted = from_attribute_value(&to_attribute_value(&value));
            assert_eq!(converted, Some(value));
        }
    }

    #[test]
    fn test_non_scalar_attributes_are_dropped() {
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S("a".into()));
        item.insert("flag".to_string(), AttributeValue::Bool(true));

        let record = from_item(&item);
        assert_eq!(record.len(), 1);
        assert!(record.contains_key("id"));
    }
}
