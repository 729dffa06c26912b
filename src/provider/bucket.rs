//! `storage:bucket` provider backed by local directories.
//!
//! Each bucket is a directory under the provider root holding a
//! `.bucket.json` metadata file next to its objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{Operation, Provider, ProviderRequest};
use crate::error::ProviderError;
use crate::resource::Outputs;
use crate::state::DeploymentId;

/// Type tag of the bucket provider.
pub const BUCKET_TYPE: &str = "storage:bucket";

/// Metadata file name inside each bucket directory.
const METADATA_FILE: &str = ".bucket.json";

/// Canned access control lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketAcl {
    /// Owner-only access.
    #[default]
    Private,
    /// Anyone may read.
    PublicRead,
    /// Anyone may read and write.
    PublicReadWrite,
    /// Any authenticated principal may read.
    AuthenticatedRead,
}

/// Directory-backed bucket provider.
#[derive(Debug, Clone)]
pub struct BucketProvider {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketMetadata {
    bucket: String,
    owner: String,
    acl: BucketAcl,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

/// Properties accepted by the provider.
#[derive(Debug)]
struct BucketProperties {
    bucket: Option<String>,
    acl: BucketAcl,
    tags: BTreeMap<String, String>,
    force_destroy: bool,
}

impl BucketProvider {
    /// Creates a provider storing buckets under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory of a bucket.
    #[must_use]
    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    async fn create(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError> {
        let props = BucketProperties::parse(request)?;
        let bucket = match props.bucket {
            Some(bucket) => bucket,
            None => default_bucket_name(&request.deployment, &request.name),
        };
        validate_bucket_name(&bucket)?;

        let path = self.bucket_path(&bucket);
        let created_at = match read_metadata(&path).await? {
            // A previous attempt may have created the bucket before failing
            Some(existing) if existing.owner == request.name => existing.created_at,
            Some(_) => {
                return Err(ProviderError::terminal(format!(
                    "bucket '{bucket}' already exists"
                )));
            }
            None => {
                fs::create_dir_all(&path)
                    .await
                    .map_err(|e| io_error(&format!("create bucket '{bucket}'"), &e))?;
                Utc::now()
            }
        };

        let metadata = BucketMetadata {
            bucket,
            owner: request.name.clone(),
            acl: props.acl,
            tags: props.tags,
            created_at,
        };
        write_metadata(&path, &metadata).await?;

        info!("Created bucket {} for {}", metadata.bucket, request.name);
        Ok(outputs(&metadata, &path))
    }

    async fn update(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError> {
        let props = BucketProperties::parse(request)?;
        let Some(bucket) = request.prior_str("bucket").map(str::to_string) else {
            return Err(ProviderError::terminal(format!(
                "no recorded bucket for '{}'",
                request.name
            )));
        };

        if let Some(requested) = &props.bucket
            && requested != &bucket
        {
            return Err(ProviderError::terminal(format!(
                "bucket name is immutable (recorded '{bucket}', declared '{requested}')"
            )));
        }

        let path = self.bucket_path(&bucket);
        let Some(existing) = read_metadata(&path).await? else {
            return Err(ProviderError::terminal(format!(
                "bucket '{bucket}' no longer exists"
            )));
        };

        let metadata = BucketMetadata {
            acl: props.acl,
            tags: props.tags,
            ..existing
        };
        write_metadata(&path, &metadata).await?;

        debug!(
            "Updated bucket {} ({})",
            metadata.bucket,
            request.changed_fields.join(", ")
        );
        Ok(outputs(&metadata, &path))
    }

    async fn delete(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError> {
        let props = BucketProperties::parse(request)?;
        let Some(bucket) = request
            .prior_str("bucket")
            .map(str::to_string)
            .or(props.bucket)
        else {
            debug!("No bucket recorded for {}, nothing to delete", request.name);
            return Ok(Outputs::new());
        };

        let path = self.bucket_path(&bucket);
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("Bucket {bucket} already gone");
                return Ok(Outputs::new());
            }
            Err(e) => return Err(io_error(&format!("list bucket '{bucket}'"), &e)),
        };

        let mut objects = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&format!("list bucket '{bucket}'"), &e))?
        {
            if entry.file_name() != METADATA_FILE {
                objects += 1;
            }
        }

        if objects > 0 && !props.force_destroy {
            return Err(ProviderError::terminal(format!(
                "bucket '{bucket}' is not empty ({objects} objects); set force_destroy to delete it"
            )));
        }

        match fs::remove_dir_all(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&format!("delete bucket '{bucket}'"), &e)),
        }

        info!("Deleted bucket {bucket}");
        Ok(Outputs::new())
    }
}

#[async_trait]
impl Provider for BucketProvider {
    async fn apply(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError> {
        match request.operation {
            Operation::Create => self.create(request).await,
            Operation::Update => self.update(request).await,
            Operation::Delete => self.delete(request).await,
        }
    }
}

impl BucketProperties {
    fn parse(request: &ProviderRequest) -> Result<Self, ProviderError> {
        let props = &request.properties;

        let bucket = match props.get("bucket") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(ProviderError::terminal(format!(
                    "'bucket' must be a string, got {other}"
                )));
            }
        };

        let acl = match props.get("acl") {
            None | Some(Value::Null) => BucketAcl::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(ProviderError::terminal(format!(
                    "'acl' must be a string, got {other}"
                )));
            }
        };

        let tags = match props.get("tags") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect(),
            Some(other) => {
                return Err(ProviderError::terminal(format!(
                    "'tags' must be a map, got {other}"
                )));
            }
        };

        let force_destroy = match props.get("force_destroy") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ProviderError::terminal(format!(
                    "'force_destroy' must be a boolean, got {other}"
                )));
            }
        };

        Ok(Self {
            bucket,
            acl,
            tags,
            force_destroy,
        })
    }
}

impl FromStr for BucketAcl {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            other => Err(ProviderError::terminal(format!(
                "unsupported acl '{other}' (expected private, public-read, public-read-write or authenticated-read)"
            ))),
        }
    }
}

impl std::fmt::Display for BucketAcl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let acl = match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
        };
        write!(f, "{acl}")
    }
}

/// Longest bucket name the provider accepts.
const MAX_BUCKET_NAME: usize = 63;

/// Length of the hash suffix on generated names.
const NAME_SUFFIX_LEN: usize = 8;

/// Generated name for a bucket declared without one.
///
/// The suffix is derived from the deployment and logical name, so retries
/// and re-runs of the same create reuse the same directory. The prefix is
/// cut to keep the result within [`MAX_BUCKET_NAME`].
fn default_bucket_name(deployment: &DeploymentId, name: &str) -> String {
    let digest = Sha256::new()
        .chain_update(deployment.project.as_bytes())
        .chain_update([0u8])
        .chain_update(deployment.environment.as_bytes())
        .chain_update([0u8])
        .chain_update(name.as_bytes())
        .finalize();
    let suffix = hex::encode(digest);

    let prefix: String = name
        .to_lowercase()
        .chars()
        .take(MAX_BUCKET_NAME - NAME_SUFFIX_LEN - 1)
        .collect();
    let prefix = prefix.trim_end_matches(['-', '.']);

    format!("{prefix}-{}", &suffix[..NAME_SUFFIX_LEN])
}

fn validate_bucket_name(bucket: &str) -> Result<(), ProviderError> {
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket.ends_with(|c: char| c.is_ascii_alphanumeric());

    if (3..=MAX_BUCKET_NAME).contains(&bucket.len()) && valid_chars && valid_edges {
        Ok(())
    } else {
        Err(ProviderError::terminal(format!(
            "invalid bucket name '{bucket}'"
        )))
    }
}

/// Maps an IO error onto the provider error taxonomy.
fn io_error(action: &str, e: &std::io::Error) -> ProviderError {
    let message = format!("failed to {action}: {e}");
    match e.kind() {
        IoErrorKind::Interrupted | IoErrorKind::WouldBlock | IoErrorKind::TimedOut => {
            ProviderError::retryable(message)
        }
        _ => ProviderError::terminal(message),
    }
}

async fn read_metadata(path: &Path) -> Result<Option<BucketMetadata>, ProviderError> {
    let file = path.join(METADATA_FILE);
    match fs::read_to_string(&file).await {
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
            ProviderError::terminal(format!("corrupted metadata in {}: {e}", file.display()))
        }),
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            if path.exists() {
                Err(ProviderError::terminal(format!(
                    "{} exists but is not a bucket",
                    path.display()
                )))
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(io_error("read bucket metadata", &e)),
    }
}

async fn write_metadata(path: &Path, metadata: &BucketMetadata) -> Result<(), ProviderError> {
    let content = serde_json::to_string_pretty(metadata)
        .map_err(|e| ProviderError::terminal(format!("failed to encode metadata: {e}")))?;
    fs::write(path.join(METADATA_FILE), content)
        .await
        .map_err(|e| io_error("write bucket metadata", &e))
}

fn outputs(metadata: &BucketMetadata, path: &Path) -> Outputs {
    Outputs::from([
        (String::from("id"), Value::String(metadata.bucket.clone())),
        (String::from("bucket"), Value::String(metadata.bucket.clone())),
        (
            String::from("arn"),
            Value::String(format!("arn:cairn:storage:::{}", metadata.bucket)),
        ),
        (String::from("acl"), Value::String(metadata.acl.to_string())),
        (
            String::from("path"),
            Value::String(path.display().to_string()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn request(operation: Operation, properties: Value, prior: Option<Outputs>) -> ProviderRequest {
        ProviderRequest {
            operation,
            deployment: DeploymentId::new("demo", "dev"),
            resource_type: String::from(BUCKET_TYPE),
            name: String::from("my-bucket"),
            properties: serde_json::from_value(properties).expect("properties map"),
            prior_outputs: prior,
            changed_fields: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_defaults_to_private_with_generated_name() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());

        let outputs = provider
            .apply(&request(Operation::Create, json!({}), None))
            .await
            .expect("create");

        let id = outputs["id"].as_str().expect("id is a string");
        assert!(id.starts_with("my-bucket-"));
        assert_eq!(id.len(), "my-bucket-".len() + 8);
        assert_eq!(outputs["acl"], json!("private"));
        assert_eq!(outputs["arn"], json!(format!("arn:cairn:storage:::{id}")));
        assert!(temp.path().join(id).join(METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn test_repeated_create_reuses_generated_bucket() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());
        let create = request(Operation::Create, json!({}), None);

        let first = provider.apply(&create).await.expect("first attempt");
        let second = provider.apply(&create).await.expect("second attempt");

        assert_eq!(first["id"], second["id"]);
        let buckets = std::fs::read_dir(temp.path()).expect("list root").count();
        assert_eq!(buckets, 1);
    }

    #[test]
    fn test_generated_name_is_scoped_to_deployment() {
        let dev = DeploymentId::new("demo", "dev");
        let prod = DeploymentId::new("demo", "prod");

        assert_eq!(default_bucket_name(&dev, "logs"), default_bucket_name(&dev, "logs"));
        assert_ne!(default_bucket_name(&dev, "logs"), default_bucket_name(&prod, "logs"));
    }

    #[test]
    fn test_generated_name_fits_for_long_logical_names() {
        let deployment = DeploymentId::new("demo", "dev");
        let long_name = format!("{}-archive", "a".repeat(60));

        let bucket = default_bucket_name(&deployment, &long_name);
        assert_eq!(bucket.len(), MAX_BUCKET_NAME);
        assert!(validate_bucket_name(&bucket).is_ok());

        // The cut must not leave a hyphen before the suffix separator
        let hyphen_at_cut = format!("{}-b", "a".repeat(53));
        let bucket = default_bucket_name(&deployment, &hyphen_at_cut);
        assert!(!bucket.contains("--"));
        assert!(validate_bucket_name(&bucket).is_ok());
    }

    #[tokio::test]
    async fn test_update_changes_acl_in_place() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());

        let created = provider
            .apply(&request(Operation::Create, json!({ "bucket": "logs", "acl": "private" }), None))
            .await
            .expect("create");

        let updated = provider
            .apply(&request(
                Operation::Update,
                json!({ "bucket": "logs", "acl": "public-read" }),
                Some(created),
            ))
            .await
            .expect("update");

        assert_eq!(updated["acl"], json!("public-read"));
        assert_eq!(updated["id"], json!("logs"));
    }

    #[tokio::test]
    async fn test_bucket_name_is_immutable() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());

        let created = provider
            .apply(&request(Operation::Create, json!({ "bucket": "logs" }), None))
            .await
            .expect("create");

        let err = provider
            .apply(&request(Operation::Update, json!({ "bucket": "other" }), Some(created)))
            .await
            .expect_err("rename rejected");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_existing_bucket_of_other_owner_is_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());

        provider
            .apply(&request(Operation::Create, json!({ "bucket": "shared" }), None))
            .await
            .expect("create");

        let mut second = request(Operation::Create, json!({ "bucket": "shared" }), None);
        second.name = String::from("other");
        assert!(provider.apply(&second).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_non_empty_requires_force() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());

        let created = provider
            .apply(&request(Operation::Create, json!({ "bucket": "data" }), None))
            .await
            .expect("create");
        std::fs::write(temp.path().join("data").join("object.txt"), "x").expect("write object");

        let err = provider
            .apply(&request(Operation::Delete, json!({}), Some(created.clone())))
            .await
            .expect_err("non-empty bucket");
        assert!(err.to_string().contains("not empty"));

        provider
            .apply(&request(Operation::Delete, json!({ "force_destroy": true }), Some(created)))
            .await
            .expect("forced delete");
        assert!(!temp.path().join("data").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_bucket_succeeds() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());
        let prior = Outputs::from([(String::from("bucket"), json!("gone"))]);

        let outputs = provider
            .apply(&request(Operation::Delete, json!({}), Some(prior)))
            .await
            .expect("delete");
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_properties_are_terminal() {
        let temp = TempDir::new().expect("temp dir");
        let provider = BucketProvider::new(temp.path());

        for properties in [
            json!({ "acl": "world-writable" }),
            json!({ "bucket": "UPPER" }),
            json!({ "force_destroy": "yes" }),
        ] {
            let err = provider
                .apply(&request(Operation::Create, properties, None))
                .await
                .expect_err("invalid properties");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_io_error_classification() {
        let timeout = std::io::Error::new(IoErrorKind::TimedOut, "slow disk");
        assert!(io_error("write", &timeout).is_retryable());

        let denied = std::io::Error::new(IoErrorKind::PermissionDenied, "denied");
        assert!(!io_error("write", &denied).is_retryable());
    }
}
