mod cache;
mod schedule;
mod store;

use std::path::Path;

use common::{Chapter, MinifiedMetadata};
use serde_json::{Map, Value};

pub use cache::{
    CacheConfig, CacheEntry, CacheStats, MetadataCache, DEFAULT_MAX_ENTRIES, DEFAULT_SAVE_DELAY,
};
pub use schedule::Debouncer;
pub use store::CacheError;

/// Projects a raw `.info.json` document onto the allow-listed schema.
///
/// Fields are checked one by one: a field with the wrong JSON type is dropped
/// without discarding its siblings, and anything outside the schema is ignored.
pub fn minify(value: &Value) -> MinifiedMetadata {
    let object = match value.as_object() {
        Some(object) => object,
        None => return MinifiedMetadata::default(),
    };

    MinifiedMetadata {
        id: string_field(object, "id"),
        title: string_field(object, "title"),
        fulltitle: string_field(object, "fulltitle"),
        uploader: string_field(object, "uploader"),
        upload_date: string_field(object, "upload_date"),
        uploader_url: string_field(object, "uploader_url"),
        channel_url: string_field(object, "channel_url"),
        duration: object.get("duration").and_then(Value::as_f64),
        chapters: object.get("chapters").and_then(chapters_field),
        timestamp: object.get("timestamp").and_then(integer_value),
    }
}

/// Reads and minifies one sidecar file.
pub async fn read_sidecar(path: &Path) -> Result<MinifiedMetadata, CacheError> {
    let bytes = tokio::fs::read(path).await?;
    let value: Value = serde_json::from_slice(&bytes)?;
    Ok(minify(&value))
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn integer_value(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

fn chapters_field(value: &Value) -> Option<Vec<Chapter>> {
    let items = value.as_array()?;
    let chapters = items
        .iter()
        .filter_map(|item| {
            let object = item.as_object()?;
            Some(Chapter {
                start_time: object.get("start_time")?.as_f64()?,
                end_time: object.get("end_time")?.as_f64()?,
                title: object.get("title")?.as_str()?.to_string(),
            })
        })
        .collect();
    Some(chapters)
}
