//! Named controller parameters for live tuning.
//!
//! Each controller keeps its parameters in a typed struct. This module is the
//! bridge to the untyped world (tuning consoles, config files): an ordered
//! name → value map, and [`apply_overrides`], which stages a partial update on
//! a copy, validates the merged result, and only then hands it back for commit.

use core::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ControlError, ControlResult};

/// Reserved key: controller sample period (seconds).
pub const SAMPLING_PERIOD: &str = "sampling_period";
/// Reserved key: lower saturation bound.
pub const U_MIN: &str = "u_min";
/// Reserved key: upper saturation bound.
pub const U_MAX: &str = "u_max";

/// Value of a single named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    /// No value, e.g. an absent saturation bound.
    Unset,
}

impl ParamValue {
    /// Numeric value, or a validation error naming `key`.
    pub fn as_number(&self, key: &str) -> ControlResult<f64> {
        match self {
            ParamValue::Number(v) if v.is_finite() => Ok(*v),
            _ => Err(ControlError::validation(key, "must be a finite number")),
        }
    }

    /// Optional bound: `Unset` means unbounded.
    pub fn as_bound(&self, key: &str) -> ControlResult<Option<f64>> {
        match self {
            ParamValue::Unset => Ok(None),
            other => other.as_number(key).map(Some),
        }
    }

    /// Parse free text the way a tuning console would: numbers become
    /// `Number`, `none`/`null`/empty becomes `Unset`, anything else is `Text`.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("none")
            || trimmed.eq_ignore_ascii_case("null")
        {
            return ParamValue::Unset;
        }
        match trimmed.parse::<f64>() {
            Ok(v) => ParamValue::Number(v),
            Err(_) => ParamValue::Text(trimmed.to_string()),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<Option<f64>> for ParamValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(ParamValue::Unset, ParamValue::Number)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Unset => f.write_str("none"),
        }
    }
}

/// Ordered name → value map.
///
/// Order is insertion order; inserting an existing key replaces its value in
/// place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerParameters {
    entries: Vec<(String, ParamValue)>,
}

impl ControllerParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Numeric value for `key`, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(ParamValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ControllerParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl fmt::Display for ControllerParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl Serialize for ControllerParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ControllerParameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ControllerParameters;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut params = ControllerParameters::new();
                while let Some((k, v)) = access.next_entry::<String, ParamValue>()? {
                    params.insert(k, v);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// A typed parameter set that can be viewed and edited by name.
///
/// The key set returned by [`Tunable::parameters`] must be the same for the
/// whole lifetime of a value.
pub trait Tunable: Clone {
    /// Snapshot of all parameters in display order.
    fn parameters(&self) -> ControllerParameters;

    /// Overwrite one parameter. Only type-level checks happen here; joint
    /// invariants are left to [`Tunable::check`].
    fn assign(&mut self, key: &str, value: &ParamValue) -> ControlResult<()>;

    /// Joint invariants over the whole set.
    fn check(&self) -> ControlResult<()>;
}

/// Stage `overrides` on a copy of `current` and validate the merged state.
///
/// Returns the new parameter set for the caller to commit; `current` is never
/// touched, so a failure leaves the controller exactly as it was.
pub fn apply_overrides<T: Tunable>(current: &T, overrides: &ControllerParameters) -> ControlResult<T> {
    let known = current.parameters();
    if let Some(unknown) = overrides.keys().find(|k| !known.contains_key(k)) {
        return Err(ControlError::UnknownParameter {
            key: unknown.to_string(),
            valid: known.keys().map(str::to_string).collect(),
        });
    }

    let mut staged = current.clone();
    for (key, value) in overrides.iter() {
        staged.assign(key, value)?;
    }
    staged.check()?;
    Ok(staged)
}
