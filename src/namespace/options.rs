//! Per-class registration options and their merge rules.
//!
//! Options configured under `options.classes` are refined by the options
//! a caller passes when registering a class. Merging only ever adds:
//! a key missing from the configured set is inserted as is, and a key
//! present on both sides gets the caller's values appended after the
//! configured ones. Duplicate values are kept.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use super::normalize_namespace;

/// Option key -> values for one class.
pub type OptionSet = IndexMap<String, Vec<JsonValue>>;

/// Fully-qualified class name -> options.
pub type RegisteredClassOptions = IndexMap<String, OptionSet>;

/// Merge caller-supplied options into the configured ones. Class names
/// of the overrides are normalized like [`ClassName`](crate::controller::ClassName).
pub fn merge_class_options(
    mut base: RegisteredClassOptions,
    overrides: RegisteredClassOptions,
) -> RegisteredClassOptions {
    for (class_name, options) in overrides {
        let class_name = normalize_namespace(&class_name);
        match base.get_mut(&class_name) {
            Some(existing) => merge_option_set(existing, options),
            None => {
                base.insert(class_name, options);
            }
        }
    }
    base
}

/// Merge one class's options, key by key.
pub fn merge_option_set(base: &mut OptionSet, overrides: OptionSet) {
    for (key, values) in overrides {
        base.entry(key).or_default().extend(values);
    }
}

/// Decode an `options.classes` mapping. Class names are normalized to
/// their dotted form. Scalar option values become one-element
/// collections; entries that are not mappings are ignored.
pub fn options_from_json(value: &JsonValue) -> RegisteredClassOptions {
    let Some(classes) = value.as_object() else {
        return RegisteredClassOptions::new();
    };

    classes
        .iter()
        .filter_map(|(class_name, options)| {
            let options = options.as_object()?;
            let set = options
                .iter()
                .map(|(key, values)| {
                    let values = match values {
                        JsonValue::Array(items) => items.clone(),
                        JsonValue::Null => Vec::new(),
                        other => vec![other.clone()],
                    };
                    (key.clone(), values)
                })
                .collect();
            Some((normalize_namespace(class_name), set))
        })
        .collect()
}
