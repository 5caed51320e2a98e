//! # Event Parameters
//!
//! Parameters are opaque key/value data attached to every event. Values are
//! JSON values so that strings, numbers, booleans and nested structures can be
//! carried without the dispatcher knowing anything about them.
//!
//! The only operation defined here is [`merge`], which combines the engine's
//! default parameters with the parameters of a single event.

use std::collections::HashMap;

pub use serde_json::Value;

/// Key/value mapping attached to an event.
pub type ParameterSet = HashMap<String, Value>;

/// Combines two optional parameter sets into one.
///
/// * both present: every key from both, `overlay` wins on conflicting keys
/// * only one present: that set is returned as is
/// * neither present: `None`
///
/// `None` means "no parameters" and is not the same as an empty set.
///
/// ```rust
/// # use trackhub::parameters::{merge, ParameterSet, Value};
/// let base: ParameterSet = [("os".to_string(), Value::from("1.0"))].into();
/// let overlay: ParameterSet = [("os".to_string(), Value::from("2.0"))].into();
///
/// let merged = merge(Some(base), Some(overlay)).unwrap();
/// assert_eq!(merged["os"], Value::from("2.0"));
/// assert!(merge(None, None).is_none());
/// ```
pub fn merge(base: Option<ParameterSet>, overlay: Option<ParameterSet>) -> Option<ParameterSet> {
    match (base, overlay) {
        (Some(mut base), Some(overlay)) => {
            base.extend(overlay);
            Some(base)
        }
        (base, overlay) => base.or(overlay),
    }
}

/// Builds a [`ParameterSet`] from anything that yields key/value pairs.
///
/// ```rust
/// # use trackhub::parameters::parameters;
/// let params = parameters([("user", "a"), ("plan", "pro")]);
/// assert_eq!(params.len(), 2);
/// ```
pub fn parameters<K, V, I>(pairs: I) -> ParameterSet
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
