//! Lenient field conversions for service data
//!
//! Automations frequently pass numbers as strings (`"50"`) and flags as
//! `"on"`/`"yes"`. The service schemas admit those forms; the helpers here
//! turn them into the typed request fields and enforce ranges the schema
//! cannot check on strings.

use serde::de::Error;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                format!("{:.1}", value)
            }
            Scalar::Float(value) => value.to_string(),
            Scalar::Text(value) => value,
        }
    }

    /// Fractions are truncated toward zero
    fn into_int(self) -> Result<i64, String> {
        match self {
            Scalar::Bool(value) => Ok(i64::from(value)),
            Scalar::Int(value) => Ok(value),
            Scalar::Float(value) if value.is_finite() => Ok(value.trunc() as i64),
            Scalar::Float(value) => Err(format!("invalid integer value: {}", value)),
            Scalar::Text(value) => value
                .trim()
                .parse()
                .map_err(|_| format!("invalid integer value: {:?}", value)),
        }
    }

    fn into_float(self) -> Result<f64, String> {
        match self {
            Scalar::Bool(value) => Ok(f64::from(u8::from(value))),
            Scalar::Int(value) => Ok(value as f64),
            Scalar::Float(value) => Ok(value),
            Scalar::Text(value) => value
                .trim()
                .parse()
                .map_err(|_| format!("invalid number value: {:?}", value)),
        }
    }

    fn into_bool(self) -> Result<bool, String> {
        match self {
            Scalar::Bool(value) => Ok(value),
            Scalar::Int(value) => Ok(value != 0),
            Scalar::Float(value) => Ok(value != 0.0),
            Scalar::Text(value) => match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" | "enable" => Ok(true),
                "0" | "false" | "no" | "off" | "disable" => Ok(false),
                _ => Err(format!("invalid boolean value: {:?}", value)),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(values) => values,
            OneOrMany::One(value) => vec![value],
        }
    }
}

/// Accept either a list or a single item
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    OneOrMany::<T>::deserialize(deserializer).map(Vec::from)
}

/// Text field; numbers and booleans are rendered as text
pub(crate) fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_text))
}

/// One tag or a list of tags, each rendered as text
pub(crate) fn strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<OneOrMany<Scalar>>::deserialize(deserializer)?
        .map(|tags| Vec::from(tags).into_iter().map(Scalar::into_text).collect()))
}

pub(crate) fn boolean<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Scalar>::deserialize(deserializer)?
        .map(|value| value.into_bool().map_err(D::Error::custom))
        .transpose()
}

fn int_between<'de, D>(
    deserializer: D,
    field: &str,
    min: i64,
    max: i64,
) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<Scalar>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let value = value.into_int().map_err(D::Error::custom)?;
    if !(min..=max).contains(&value) {
        return Err(D::Error::custom(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(Some(value))
}

fn float_between<'de, D>(
    deserializer: D,
    field: &str,
    min: f64,
    max: f64,
) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<Scalar>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let value = value.into_float().map_err(D::Error::custom)?;
    if !(min..=max).contains(&value) {
        return Err(D::Error::custom(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(Some(value))
}

pub(crate) fn type_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(int_between(deserializer, "type_id", 0, i64::MAX)?.map(|value| value as u64))
}

pub(crate) fn priority<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(int_between(deserializer, "priority", 0, 100)?.map(|value| value as u8))
}

pub(crate) fn latitude<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    float_between(deserializer, "location_lat", -90.0, 90.0)
}

pub(crate) fn longitude<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    float_between(deserializer, "location_lng", -180.0, 180.0)
}
