use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Base path of the receiver's extended control API
pub const API_BASE: &str = "/YamahaExtendedControl/v1";

const SYSTEM_TARGET: &str = "system";

/// Everything except RFC 3986 unreserved characters is escaped
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Device-native request produced by routing a command
///
/// The transport turns this into an actual network call; routing itself never
/// performs any I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeRequest {
    /// Correlation id for the transport
    pub id: Uuid,
    /// Zone the request is qualified with
    pub target: String,
    /// Operation name ("setPower", "setVolume", ...)
    pub operation: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    /// Milliseconds to wait after sending before the next request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_ms: Option<u64>,
}

impl NativeRequest {
    /// Create a zone-qualified request
    pub fn zone(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            operation: operation.into(),
            params: BTreeMap::new(),
            pause_ms: None,
        }
    }

    /// Create a receiver-wide request
    pub fn system(operation: impl Into<String>) -> Self {
        Self::zone(SYSTEM_TARGET, operation)
    }

    /// Add a query parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Get a parameter
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Get a numeric parameter
    pub fn number(&self, name: &str) -> Option<f64> {
        self.param(name).and_then(|v| v.as_f64())
    }

    /// Render the request path, e.g. `/YamahaExtendedControl/v1/main/setVolume?volume=40`
    ///
    /// Path segments, parameter names and values are percent-encoded.
    pub fn path(&self) -> String {
        let mut path = format!(
            "{}/{}/{}",
            API_BASE,
            utf8_percent_encode(&self.target, COMPONENT),
            utf8_percent_encode(&self.operation, COMPONENT)
        );

        let mut separator = '?';
        for (name, value) in &self.params {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            path.push(separator);
            path.extend(utf8_percent_encode(name, COMPONENT));
            path.push('=');
            path.extend(utf8_percent_encode(&value, COMPONENT));
            separator = '&';
        }
        path
    }
}

/// Convert a numeric value to JSON, keeping whole numbers integral
pub(crate) fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
