use crate::errors::{PricingError, PricingResult};
use serde_json::{Map, Value};

/// Read-only view over a JSON request object with per-field defaults.
///
/// Numbers may arrive as JSON numbers or numeric strings. A missing key takes
/// its default; anything else that is not convertible is `InvalidInput`.
pub struct Params<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(body: &'a Value) -> PricingResult<Self> {
        body.as_object()
            .map(|fields| Self { fields })
            .ok_or_else(|| PricingError::InvalidInput("request body must be a JSON object".into()))
    }

    pub fn real(&self, key: &str, default: f64) -> PricingResult<f64> {
        let Some(value) = self.fields.get(key) else {
            return Ok(default);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| invalid(key, value, "a number"))
    }

    pub fn integer(&self, key: &str, default: i64) -> PricingResult<i64> {
        let Some(value) = self.fields.get(key) else {
            return Ok(default);
        };
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| invalid(key, value, "an integer"))
    }

    /// Step counts: integers >= 1 and <= `max`.
    pub fn steps(&self, key: &str, default: usize, max: usize) -> PricingResult<usize> {
        let n = self.integer(key, default as i64)?;
        if n < 1 || n as u64 > max as u64 {
            return Err(PricingError::InvalidInput(format!(
                "{key} must be between 1 and {max}, got {n}"
            )));
        }
        Ok(n as usize)
    }

    pub fn flag(&self, key: &str, default: bool) -> PricingResult<bool> {
        match self.fields.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(invalid(key, other, "a boolean")),
        }
    }

    pub fn text<'s>(&'s self, key: &str, default: &'s str) -> PricingResult<&'s str> {
        match self.fields.get(key) {
            None => Ok(default),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(invalid(key, other, "a string")),
        }
    }
}

fn invalid(key: &str, value: &Value, expected: &str) -> PricingError {
    PricingError::InvalidInput(format!("{key} must be {expected}, got {value}"))
}
