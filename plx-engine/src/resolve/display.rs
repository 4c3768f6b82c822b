//! Display window
//!
//! Instances sharing one cached payload keep independent display limits:
//! a positive integer `max_items` option truncates every list field of the
//! merged data, preserving order.

use serde_json::{Map, Value};

use crate::schema::WidgetSchema;

pub const MAX_ITEMS_OPTION: &str = "max_items";

/// The instance's display limit, if it has a usable one
pub fn max_items(options: &Map<String, Value>) -> Option<usize> {
    let value = options.get(MAX_ITEMS_OPTION)?;
    let limit = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })?;

    usize::try_from(limit).ok().filter(|limit| *limit > 0)
}

/// Truncate list fields of `data` to the instance's `max_items`
pub fn apply_display_window(options: &Map<String, Value>, schema: &WidgetSchema, data: &mut Map<String, Value>) {
    let Some(limit) = max_items(options) else {
        return;
    };

    for (name, value) in data.iter_mut() {
        if let Value::Array(entries) = value {
            if schema.is_list_field(name) {
                entries.truncate(limit);
            }
        }
    }
}
