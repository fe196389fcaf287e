//! Property values carried by nodes and the generic diff used to decide
//! whether a component must re-render.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::HostEvent;

/// Ordered property bag. Declaration order is the application order.
pub type Properties = IndexMap<String, PropValue>;

/// Event handler attached through a property or an `events` map.
///
/// Two callbacks are equal only when they share the same allocation.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&HostEvent)>);

impl Callback {
    pub fn new(f: impl Fn(&HostEvent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, event: &HostEvent) {
        (self.0)(event)
    }

    /// Address of the shared closure; stable for the callback's lifetime.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn listener(&self) -> Rc<dyn Fn(&HostEvent)> {
        self.0.clone()
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:#x})", self.identity())
    }
}

#[derive(Clone)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Vec<PropValue>),
    Map(IndexMap<String, PropValue>),
    Callback(Callback),
    Opaque(Rc<dyn Any>),
}

impl PropValue {
    pub fn str(value: impl AsRef<str>) -> Self {
        PropValue::Str(Rc::from(value.as_ref()))
    }

    pub fn callback(f: impl Fn(&HostEvent) + 'static) -> Self {
        PropValue::Callback(Callback::new(f))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            PropValue::Null => false,
            PropValue::Bool(b) => *b,
            PropValue::Int(i) => *i != 0,
            PropValue::Float(f) => *f != 0.0 && !f.is_nan(),
            PropValue::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            PropValue::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, PropValue>> {
        match self {
            PropValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Text form written to the host for scalar values.
    pub fn to_host_string(&self) -> String {
        match self {
            PropValue::Null => String::new(),
            PropValue::Bool(b) => b.to_string(),
            PropValue::Int(i) => i.to_string(),
            PropValue::Float(f) => f.to_string(),
            PropValue::Str(s) => s.to_string(),
            PropValue::List(items) => items
                .iter()
                .map(PropValue::to_host_string)
                .collect::<Vec<_>>()
                .join(","),
            PropValue::Map(_) | PropValue::Callback(_) | PropValue::Opaque(_) => String::new(),
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Null, PropValue::Null) => true,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::List(a), PropValue::List(b)) => a == b,
            (PropValue::Map(a), PropValue::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (PropValue::Callback(a), PropValue::Callback(b)) => a == b,
            (PropValue::Opaque(a), PropValue::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => f.write_str("Null"),
            PropValue::Bool(b) => write!(f, "Bool({b})"),
            PropValue::Int(i) => write!(f, "Int({i})"),
            PropValue::Float(v) => write!(f, "Float({v})"),
            PropValue::Str(s) => write!(f, "Str({s:?})"),
            PropValue::List(items) => f.debug_list().entries(items).finish(),
            PropValue::Map(map) => f.debug_map().entries(map.iter()).finish(),
            PropValue::Callback(cb) => cb.fmt(f),
            PropValue::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::str(value)
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<Callback> for PropValue {
    fn from(value: Callback) -> Self {
        PropValue::Callback(value)
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    fn from(value: Vec<T>) -> Self {
        PropValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropValue::Null)
    }
}

/// Builds a [`Properties`] map from `(name, value)` pairs.
pub fn props<I, K, V>(pairs: I) -> Properties
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Returns `true` as soon as any property in the union of both key sets
/// differs. A missing key compares as [`PropValue::Null`].
pub fn properties_changed(previous: &Properties, next: &Properties) -> bool {
    let next_only = next.keys().filter(|k| !previous.contains_key(*k));
    for name in previous.keys().chain(next_only) {
        let changed = match (previous.get(name), next.get(name)) {
            (Some(before), Some(after)) => before != after,
            (Some(value), None) | (None, Some(value)) => !matches!(value, PropValue::Null),
            (None, None) => false,
        };
        if changed {
            return true;
        }
    }
    false
}

/// Joins a `classes` value into the host `class` string. Lists skip falsy
/// and `true` entries.
pub(crate) fn class_string(value: Option<&PropValue>) -> String {
    match value {
        Some(PropValue::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                PropValue::Str(s) if !s.is_empty() => Some(s.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
        Some(PropValue::Str(s)) => s.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_of_keys_detects_added_and_removed_properties() {
        let a = props([("x", 1)]);
        let b = props([("x", 1), ("y", 2)]);
        assert!(properties_changed(&a, &b));
        assert!(properties_changed(&b, &a));
        assert!(!properties_changed(&b, &b.clone()));
    }

    #[test]
    fn nested_values_compare_deeply_and_callbacks_by_identity() {
        let cb = Callback::new(|_| {});
        let a = props([
            ("list", PropValue::from(vec!["a", "b"])),
            ("cb", PropValue::Callback(cb.clone())),
        ]);
        let b = props([
            ("list", PropValue::from(vec!["a", "b"])),
            ("cb", PropValue::Callback(cb)),
        ]);
        assert!(!properties_changed(&a, &b));

        let c = props([
            ("list", PropValue::from(vec!["a", "b"])),
            ("cb", PropValue::callback(|_| {})),
        ]);
        assert!(properties_changed(&a, &c));
    }

    #[test]
    fn class_lists_skip_empty_entries() {
        let value = PropValue::List(vec![
            PropValue::str("a"),
            PropValue::Bool(true),
            PropValue::str(""),
            PropValue::str("b"),
        ]);
        assert_eq!(class_string(Some(&value)), "a b");
        assert_eq!(class_string(None), "");
    }

    #[test]
    fn truthiness_matches_falsy_set() {
        assert!(!PropValue::Null.is_truthy());
        assert!(!PropValue::str("").is_truthy());
        assert!(!PropValue::Float(f64::NAN).is_truthy());
        assert!(PropValue::Int(3).is_truthy());
        assert!(PropValue::from(vec![1]).is_truthy());
    }
}
