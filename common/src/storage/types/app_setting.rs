use std::fmt;

use chrono::{DateTime, Utc};
use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use surrealdb::sql::{Datetime, Thing};

use super::StoredObject;

/// One named configuration value, such as the upstream API key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSetting {
    /// The setting name. Doubles as the record key.
    #[serde(deserialize_with = "deserialize_setting_key")]
    pub id: String,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    pub updated_at: DateTime<Utc>,
    pub value: String,
}

impl AppSetting {
    pub fn new(key: &str, value: &str) -> Self {
        let now = Utc::now();
        Self {
            id: key.to_string(),
            created_at: now,
            updated_at: now,
            value: value.to_string(),
        }
    }
}

impl StoredObject for AppSetting {
    fn table_name() -> &'static str {
        "app_setting"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

/// Accepts the bare key we write and the `app_setting:⟨key⟩` record id
/// SurrealDB hands back.
struct SettingKeyVisitor;

impl<'de> Visitor<'de> for SettingKeyVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a setting name or an app_setting record id")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        let record = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
        Ok(record.id.to_raw())
    }
}

fn deserialize_setting_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    deserializer.deserialize_any(SettingKeyVisitor)
}

fn serialize_datetime<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    Datetime::from(*date).serialize(serializer)
}

fn deserialize_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    Datetime::deserialize(deserializer).map(DateTime::<Utc>::from)
}
