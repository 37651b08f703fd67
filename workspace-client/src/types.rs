use std::fmt;

use common::error::AppError;
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{Map, Value};

/// A named container of bound documents on the upstream service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    #[serde(default, deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workspace {
    pub fn find_document(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|document| document.id == id)
    }
}

/// A document reference as the upstream reports it inside a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    #[serde(default, alias = "filename")]
    pub name: String,
    /// Path the upstream indexes the document content by.
    #[serde(default, alias = "docpath")]
    pub location: String,
    #[serde(
        default,
        rename = "mimeType",
        alias = "mime_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

struct FlexibleIdVisitor;

impl<'de> Visitor<'de> for FlexibleIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or an integer id")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }
}

fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FlexibleIdVisitor)
}

/// Body of `POST /api/v1/workspace/{slug}/update-embeddings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingUpdate {
    #[serde(default)]
    pub adds: Vec<String>,
    #[serde(default)]
    pub deletes: Vec<String>,
}

impl EmbeddingUpdate {
    pub fn add(location: impl Into<String>) -> Self {
        Self {
            adds: vec![location.into()],
            deletes: Vec::new(),
        }
    }

    pub fn delete(location: impl Into<String>) -> Self {
        Self {
            adds: Vec::new(),
            deletes: vec![location.into()],
        }
    }
}

/// Body of `POST /api/v1/workspace/{slug}/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

/// A request to generate `count` items from a prompt.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewWorkspace<'a> {
    pub name: &'a str,
}

/// Pulls the workspace out of an upstream envelope.
///
/// The upstream wraps the workspace as `{"workspace": {...}}` or, for lookups,
/// `{"workspace": [{...}]}`; an empty array or `null` means the workspace does
/// not exist.
pub fn workspace_from_envelope(body: &Value) -> Result<Option<Workspace>, AppError> {
    let inner = match body.get("workspace") {
        Some(Value::Array(items)) => items.first(),
        Some(Value::Null) | None => None,
        Some(object) => Some(object),
    };

    inner
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
        .map_err(AppError::from)
}
