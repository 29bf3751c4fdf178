//! Event variants, their table schemas, and the aggregate projection.
//!
//! Each variant has a fixed ordered header. A record is mapped onto its
//! table's column order at append time; a missing field becomes a null cell,
//! never an error.

use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Name of the aggregate table that receives a normalized projection of
/// every event variant.
pub const OPERATIONS_TABLE: &str = "operations";

const COMMON_HEADER: [&str; 4] = ["write_time", "timestamp", "session_id", "employee_id"];

/// The six recorded event variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Step,
    Form,
    Upload,
    Complete,
    Close,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Start,
        EventKind::Step,
        EventKind::Form,
        EventKind::Upload,
        EventKind::Complete,
        EventKind::Close,
    ];

    /// Table (and journal file) name for this variant.
    pub fn table(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Step => "step",
            EventKind::Form => "form",
            EventKind::Upload => "upload",
            EventKind::Complete => "complete",
            EventKind::Close => "close",
        }
    }

    /// Declared column order for this variant's table.
    pub fn header(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = COMMON_HEADER.to_vec();
        columns.extend(match self {
            EventKind::Start => &[][..],
            EventKind::Step => &["step_number", "step_name"][..],
            EventKind::Form => &["step_number", "field_name", "field_value"][..],
            EventKind::Upload => &[
                "step_number",
                "field_name",
                "original_filename",
                "saved_path",
                "file_size_bytes",
                "mime_type",
            ][..],
            EventKind::Complete => &["verification_code"][..],
            EventKind::Close => &["step_number"][..],
        });
        columns
    }
}

/// Declared column order for the aggregate operations table.
pub fn operations_header() -> Vec<&'static str> {
    vec![
        "write_time",
        "timestamp",
        "operation",
        "session_id",
        "employee_id",
        "step_number",
        "name",
        "value",
        "extra",
    ]
}

/// Variant-specific payload of one event.
///
/// Step numbers and form values are kept as raw JSON values; clients are
/// free to send numbers or strings and both are stored verbatim.
#[derive(Debug, Clone)]
pub enum EventBody {
    Start,
    Step {
        step_number: Value,
        step_name: String,
    },
    Form {
        step_number: Value,
        field_name: String,
        field_value: Value,
    },
    Upload {
        step_number: Value,
        field_name: Option<String>,
        original_filename: String,
        saved_path: String,
        file_size_bytes: u64,
        mime_type: String,
    },
    Complete {
        verification_code: String,
    },
    Close {
        step_number: Value,
    },
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Start => EventKind::Start,
            EventBody::Step { .. } => EventKind::Step,
            EventBody::Form { .. } => EventKind::Form,
            EventBody::Upload { .. } => EventKind::Upload,
            EventBody::Complete { .. } => EventKind::Complete,
            EventBody::Close { .. } => EventKind::Close,
        }
    }
}

/// One fully-built event, ready to be journaled and appended.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub body: EventBody,
    pub session_id: String,
    pub employee_id: String,
    /// Client-supplied timestamp, defaulted to server now when absent.
    pub timestamp: String,
    /// Server-assigned write time, always now.
    pub write_time: String,
}

impl EventRecord {
    pub fn new(
        body: EventBody,
        session_id: impl Into<String>,
        employee_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            body,
            session_id: session_id.into(),
            employee_id: employee_id.into(),
            timestamp: timestamp.into(),
            write_time: now_iso(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Named fields of this record, keyed to match the variant's header.
    pub fn named_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("write_time".into(), json!(self.write_time));
        fields.insert("timestamp".into(), json!(self.timestamp));
        fields.insert("session_id".into(), json!(self.session_id));
        fields.insert("employee_id".into(), json!(self.employee_id));
        match &self.body {
            EventBody::Start => {}
            EventBody::Step {
                step_number,
                step_name,
            } => {
                fields.insert("step_number".into(), step_number.clone());
                fields.insert("step_name".into(), json!(step_name));
            }
            EventBody::Form {
                step_number,
                field_name,
                field_value,
            } => {
                fields.insert("step_number".into(), step_number.clone());
                fields.insert("field_name".into(), json!(field_name));
                fields.insert("field_value".into(), field_value.clone());
            }
            EventBody::Upload {
                step_number,
                field_name,
                original_filename,
                saved_path,
                file_size_bytes,
                mime_type,
            } => {
                fields.insert("step_number".into(), step_number.clone());
                fields.insert("field_name".into(), json!(field_name));
                fields.insert("original_filename".into(), json!(original_filename));
                fields.insert("saved_path".into(), json!(saved_path));
                fields.insert("file_size_bytes".into(), json!(file_size_bytes));
                fields.insert("mime_type".into(), json!(mime_type));
            }
            EventBody::Complete { verification_code } => {
                fields.insert("verification_code".into(), json!(verification_code));
            }
            EventBody::Close { step_number } => {
                fields.insert("step_number".into(), step_number.clone());
            }
        }
        fields
    }

    /// Normalized projection of this record for the operations table.
    pub fn operation_fields(&self) -> Map<String, Value> {
        let (step_number, name, value, extra) = match &self.body {
            EventBody::Start => (Value::Null, Value::Null, Value::Null, Value::Null),
            EventBody::Step {
                step_number,
                step_name,
            } => (step_number.clone(), json!(step_name), Value::Null, Value::Null),
            EventBody::Form {
                step_number,
                field_name,
                field_value,
            } => (
                step_number.clone(),
                json!(field_name),
                field_value.clone(),
                Value::Null,
            ),
            EventBody::Upload {
                step_number,
                field_name,
                original_filename,
                saved_path,
                file_size_bytes,
                mime_type,
            } => (
                step_number.clone(),
                json!(field_name),
                json!(saved_path),
                json!({
                    "original_filename": original_filename,
                    "file_size_bytes": file_size_bytes,
                    "mime_type": mime_type,
                }),
            ),
            EventBody::Complete { verification_code } => (
                Value::Null,
                json!("verification_code"),
                json!(verification_code),
                Value::Null,
            ),
            EventBody::Close { step_number } => {
                (step_number.clone(), Value::Null, Value::Null, Value::Null)
            }
        };

        let mut fields = Map::new();
        fields.insert("write_time".into(), json!(self.write_time));
        fields.insert("timestamp".into(), json!(self.timestamp));
        fields.insert("operation".into(), json!(self.kind().table()));
        fields.insert("session_id".into(), json!(self.session_id));
        fields.insert("employee_id".into(), json!(self.employee_id));
        fields.insert("step_number".into(), step_number);
        fields.insert("name".into(), name);
        fields.insert("value".into(), value);
        fields.insert("extra".into(), extra);
        fields
    }
}

/// Current server time as an ISO-8601 string.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Best-effort decode of a verification code.
///
/// Codes arrive Base64-encoded; a code that fails to decode (or decodes to
/// non-UTF-8) is stored verbatim. Malformed input never fails the request.
pub fn decode_verification_code(raw: &str) -> String {
    match general_purpose::STANDARD.decode(raw.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(decoded) => decoded,
            Err(_) => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_round_trips_base64() {
        let encoded = general_purpose::STANDARD.encode("OK");
        assert_eq!(decode_verification_code(&encoded), "OK");
    }

    #[test]
    fn decode_passes_raw_value_through() {
        assert_eq!(decode_verification_code("not base64!!"), "not base64!!");
    }

    #[test]
    fn decode_keeps_non_utf8_payload_raw() {
        // 0xFF 0xFE is valid Base64 input but not valid UTF-8 output.
        let encoded = general_purpose::STANDARD.encode([0xFFu8, 0xFE]);
        assert_eq!(decode_verification_code(&encoded), encoded);
    }

    #[test]
    fn headers_start_with_common_columns() {
        for kind in EventKind::ALL {
            let header = kind.header();
            assert_eq!(
                &header[..4],
                &["write_time", "timestamp", "session_id", "employee_id"]
            );
        }
    }

    #[test]
    fn form_projection_carries_name_and_value() {
        let record = EventRecord::new(
            EventBody::Form {
                step_number: json!(2),
                field_name: "email".into(),
                field_value: json!("alice@example.com"),
            },
            "sid",
            "E1",
            "2026-01-01T00:00:00Z",
        );
        let op = record.operation_fields();
        assert_eq!(op["operation"], json!("form"));
        assert_eq!(op["name"], json!("email"));
        assert_eq!(op["value"], json!("alice@example.com"));
        assert_eq!(op["step_number"], json!(2));
    }

    #[test]
    fn start_named_fields_have_no_extra_columns() {
        let record = EventRecord::new(EventBody::Start, "sid", "E1", "2026-01-01T00:00:00Z");
        let fields = record.named_fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields["employee_id"], json!("E1"));
    }
}
