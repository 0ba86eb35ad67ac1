//! Object-created notifications emitted by the upload bucket.
//!
//! Records are parsed leniently: a record with missing or mistyped metadata
//! must not prevent its siblings from being processed, so every field is
//! optional here and validated per record by [`NotificationRecord::location`].

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// A batch of object-created records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectCreatedNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<RawRecord>,
}

impl ObjectCreatedNotification {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One entry of `Records`, or whatever JSON value sat in its place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    Record(NotificationRecord),
    Unrecognized(serde_json::Value),
}

impl RawRecord {
    pub fn location(&self) -> Result<ObjectLocation> {
        match self {
            RawRecord::Record(record) => record.location(),
            RawRecord::Unrecognized(value) => Err(AlertError::MalformedRecord(format!(
                "unrecognized record shape: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "eventTime", default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: Option<BucketRef>,
    #[serde(default)]
    pub object: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Validated address of an uploaded clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
    pub event_time: Option<String>,
}

impl ObjectLocation {
    /// Human-readable `bucket/key` used in reports and logs.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

impl NotificationRecord {
    /// Extract bucket and key, rejecting records where either is missing
    /// or blank.
    pub fn location(&self) -> Result<ObjectLocation> {
        let s3 = self
            .s3
            .as_ref()
            .ok_or_else(|| AlertError::MalformedRecord("missing 's3' entity".into()))?;

        let bucket = s3
            .bucket
            .as_ref()
            .and_then(|b| b.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AlertError::MalformedRecord("missing bucket name".into()))?;

        let key = s3
            .object
            .as_ref()
            .and_then(|o| o.key.as_deref())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AlertError::MalformedRecord("missing object key".into()))?;

        Ok(ObjectLocation {
            bucket: bucket.to_string(),
            key: key.to_string(),
            event_time: self.event_time.clone(),
        })
    }
}
