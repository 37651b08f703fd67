use serde::{Deserialize, Serialize};

pub mod app_setting;

/// A record persisted in its own SurrealDB table, addressed by a string key.
pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}
