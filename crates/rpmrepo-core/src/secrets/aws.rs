use super::{SecretError, SecretStore};
use async_trait::async_trait;
use aws_sdk_secretsmanager as sm;
use sm::operation::get_secret_value::GetSecretValueError;

/// AWS Secrets Manager. Binary values are preferred over string values.
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: sm::Client,
}

impl AwsSecretStore {
    /// Build a client from the ambient AWS configuration.
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        Self {
            client: sm::Client::new(&loader.load().await),
        }
    }

    /// Wrap an existing client.
    pub fn from_client(client: sm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SecretError> {
        let output = match self.client.get_secret_value().secret_id(id).send().await {
            Ok(output) => output,
            Err(err) => {
                if matches!(
                    err.as_service_error(),
                    Some(GetSecretValueError::ResourceNotFoundException(_))
                ) {
                    return Err(SecretError::NotFound(id.to_string()));
                }
                return Err(SecretError::Backend {
                    id: id.to_string(),
                    source: Box::new(err),
                });
            }
        };

        if let Some(blob) = output.secret_binary {
            return Ok(blob.into_inner());
        }
        output
            .secret_string
            .map(String::into_bytes)
            .ok_or_else(|| SecretError::Empty(id.to_string()))
    }
}
