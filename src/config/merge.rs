//! Field-by-field merging of configuration tiers.

use serde_json::Value;

/// Merge `overlay` onto `base`. Maps merge per key, everything else
/// (including sequences) is replaced. A null overlay leaves `base` intact,
/// so a YAML key written as `port: ~` means "not specified".
///
/// ```
/// use serde_json::json;
/// use deploy_config_mcp::config::deep_merge;
///
/// let defaults = json!({ "build": { "tick_ms": 250, "steps_per_module": 4 } });
/// let user = json!({ "build": { "tick_ms": 0 } });
/// assert_eq!(
///     deep_merge(defaults, user),
///     json!({ "build": { "tick_ms": 0, "steps_per_module": 4 } })
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Fold tiers lowest priority first.
pub fn deep_merge_all(tiers: impl IntoIterator<Item = Value>) -> Value {
    tiers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_sections_merge_per_key() {
        let base = json!({
            "server": { "db_path": "a.db", "http": { "enabled": false, "port": 8740 } }
        });
        let overlay = json!({ "server": { "http": { "enabled": true } } });

        assert_eq!(
            deep_merge(base, overlay),
            json!({
                "server": { "db_path": "a.db", "http": { "enabled": true, "port": 8740 } }
            })
        );
    }

    #[test]
    fn null_means_unspecified() {
        let base = json!({ "versioning": { "initial_version": "1.0.0" } });
        let overlay = json!({ "versioning": { "initial_version": null } });
        assert_eq!(
            deep_merge(base, overlay),
            json!({ "versioning": { "initial_version": "1.0.0" } })
        );
    }

    #[test]
    fn sequences_and_scalars_are_replaced() {
        assert_eq!(
            deep_merge(json!({ "x": [1, 2, 3] }), json!({ "x": [4] })),
            json!({ "x": [4] })
        );
        assert_eq!(
            deep_merge(json!({ "x": { "y": 1 } }), json!({ "x": 2 })),
            json!({ "x": 2 })
        );
    }

    #[test]
    fn later_tiers_win() {
        let merged = deep_merge_all([
            json!({ "a": 1, "b": 1 }),
            json!({ "b": 2 }),
            json!({ "a": 3, "c": 3 }),
        ]);
        assert_eq!(merged, json!({ "a": 3, "b": 2, "c": 3 }));
    }
}
