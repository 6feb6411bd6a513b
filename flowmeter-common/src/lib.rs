//! Shared types for the LoRa flowmeter telemetry system.
//!
//! This crate contains the reading types shared between:
//! - flowmeter-gateway (the bridge that receives radio frames)
//! - flowmeter-server (the receiver that classifies and stores readings)
//!
//! Any changes to the row layout should be made here.

pub mod packet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use packet::{LoraPacket, PacketError, PACKET_LEN};

/// Placeholder substituted when a numeric field is absent
pub const SENTINEL: f64 = -999.0;

/// Device type recorded in every row
pub const DEVICE_TYPE: &str = "flowmeter";

/// Flow rate (L/min) above which a reading is flagged
pub const HIGH_FLOW_THRESHOLD: f64 = 100.0;

/// Payload field names, in row order
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_AVG_FLOW_RATE: &str = "avg_flow_rate";
pub const FIELD_STD_FLOW_RATE: &str = "std_flow_rate";

/// Quality label derived from the two flow measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataQuality {
    #[serde(rename = "Invalid_Numbers")]
    InvalidNumbers,
    #[serde(rename = "Negative_Values")]
    NegativeValues,
    #[serde(rename = "High_Flow_Warning")]
    HighFlowWarning,
    #[serde(rename = "High_Variation")]
    HighVariation,
    #[serde(rename = "Good")]
    Good,
}

impl DataQuality {
    /// Classify a pair of flow measurements.
    ///
    /// Rules are evaluated in order and the first match wins.
    pub fn classify(avg_flow_rate: f64, std_flow_rate: f64) -> Self {
        if avg_flow_rate.is_nan() || std_flow_rate.is_nan() {
            DataQuality::InvalidNumbers
        } else if avg_flow_rate < 0.0 || std_flow_rate < 0.0 {
            DataQuality::NegativeValues
        } else if avg_flow_rate > HIGH_FLOW_THRESHOLD {
            DataQuality::HighFlowWarning
        } else if std_flow_rate > avg_flow_rate && avg_flow_rate > 0.0 {
            DataQuality::HighVariation
        } else {
            DataQuality::Good
        }
    }

    /// Convert to string for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::InvalidNumbers => "Invalid_Numbers",
            DataQuality::NegativeValues => "Negative_Values",
            DataQuality::HighFlowWarning => "High_Flow_Warning",
            DataQuality::HighVariation => "High_Variation",
            DataQuality::Good => "Good",
        }
    }
}

impl std::fmt::Display for DataQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coerce a loosely typed JSON field to a number.
///
/// Absent, `null`, `false` and empty strings yield `default`. Numbers pass
/// through unchanged. Strings are parsed as decimal, `Infinity`, or
/// `0x`/`0o`/`0b` integers; whitespace-only strings are `0` and anything
/// else becomes NaN. `true` is `1`. An empty array is `0`, a one-element
/// array takes the value of its element, any other array or object is NaN.
pub fn coerce_number_or_default(value: Option<&Value>, default: f64) -> f64 {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => default,
        Some(Value::String(s)) if s.is_empty() => default,
        Some(Value::Bool(true)) => 1.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => string_to_number(s),
        Some(Value::Array(items)) => array_to_number(items),
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        0.0
    } else {
        parse_numeric_str(s)
    }
}

// An array reads as its elements joined by commas, so only zero or one
// element can be numeric
fn array_to_number(items: &[Value]) -> f64 {
    match items {
        [] => 0.0,
        [item] => match item {
            Value::Null => 0.0,
            Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            Value::String(s) => string_to_number(s),
            Value::Array(inner) => array_to_number(inner),
            Value::Bool(_) | Value::Object(_) => f64::NAN,
        },
        _ => f64::NAN,
    }
}

fn parse_numeric_str(s: &str) -> f64 {
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let prefixes = [
        ("0x", 16),
        ("0X", 16),
        ("0o", 8),
        ("0O", 8),
        ("0b", 2),
        ("0B", 2),
    ];
    for (prefix, radix) in prefixes {
        if let Some(digits) = s.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }

    // f64::from_str also takes "inf" and "nan", which are not numeric here
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) {
        return f64::NAN;
    }

    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// A single classified reading, alive for the duration of one request
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    /// When the receiver handled the request
    pub server_timestamp: DateTime<Utc>,

    /// Device-supplied timestamp (ms since device boot)
    pub sender_timestamp: f64,

    /// Average flow rate over the sampling window (L/min)
    pub avg_flow_rate: f64,

    /// Standard deviation of the flow rate (L/min)
    pub std_flow_rate: f64,

    /// Derived quality label
    pub data_quality: DataQuality,
}

impl TelemetryReading {
    /// Extract and classify a reading from a parsed JSON payload.
    ///
    /// Non-object payloads carry no fields, so every value takes the sentinel.
    pub fn from_payload(payload: &Value, server_timestamp: DateTime<Utc>) -> Self {
        let field = |name: &str| payload.as_object().and_then(|map| map.get(name));

        let sender_timestamp = coerce_number_or_default(field(FIELD_TIMESTAMP), SENTINEL);
        let avg_flow_rate = coerce_number_or_default(field(FIELD_AVG_FLOW_RATE), SENTINEL);
        let std_flow_rate = coerce_number_or_default(field(FIELD_STD_FLOW_RATE), SENTINEL);

        Self {
            server_timestamp,
            sender_timestamp,
            avg_flow_rate,
            std_flow_rate,
            data_quality: DataQuality::classify(avg_flow_rate, std_flow_rate),
        }
    }

    /// Lay the reading out in storage column order
    pub fn to_row(&self) -> TelemetryRow {
        TelemetryRow(
            self.server_timestamp,
            self.sender_timestamp,
            self.avg_flow_rate,
            self.std_flow_rate,
            self.data_quality,
            DEVICE_TYPE.to_string(),
        )
    }
}

/// One stored row:
/// `[server_timestamp, sender_timestamp, avg_flow_rate, std_flow_rate, data_quality, device_type]`
///
/// Serializes as a six-element JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow(
    pub DateTime<Utc>,
    pub f64,
    pub f64,
    pub f64,
    pub DataQuality,
    pub String,
);

impl TelemetryRow {
    pub fn server_timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn data_quality(&self) -> DataQuality {
        self.4
    }
}

/// Format a timestamp the way it appears in responses
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// JSON body the gateway posts to the receiver
///
/// Non-finite rates are sent as the strings `"NaN"`, `"Infinity"` and
/// `"-Infinity"` because JSON has no literal for them and a `null` would
/// read as a missing field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IngestPayload {
    pub timestamp: u32,
    #[serde(serialize_with = "serialize_rate")]
    pub avg_flow_rate: f32,
    #[serde(serialize_with = "serialize_rate")]
    pub std_flow_rate: f32,
}

fn serialize_rate<S>(rate: &f32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if rate.is_finite() {
        serializer.serialize_f32(*rate)
    } else if rate.is_nan() {
        serializer.serialize_str("NaN")
    } else if rate.is_sign_positive() {
        serializer.serialize_str("Infinity")
    } else {
        serializer.serialize_str("-Infinity")
    }
}
