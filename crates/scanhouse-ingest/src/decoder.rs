//! Scan line decoder
//!
//! Turns one NDJSON line from the scanner into a [`ScanRecord`] plus the raw,
//! untransformed product entries found on that line.
//!
//! # Line format
//! ```text
//! {"ip":"1.2.3.4","port":80,"protocol":"tcp","ssl/tls":false,"timestamp":1000,
//!  "used_probes":{...},"scan_tries":1,"sended_probes":3,"banners":{...},
//!  "hex_banners":{...},"banners_hashes":{...},"total_time_spent":"0.52s",
//!  "products":[{"probe":"GetRequest","service":"http","softmatch":0,...}]}
//! ```
//!
//! Every field is optional. Missing scalars become `""`/`0`/`false` and
//! missing mappings become empty mappings.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::document::Document;
use crate::error::DecodeError;
use crate::models::ScanRecord;

/// A decoded line: the scan row and the raw product entries it carried
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    pub record: ScanRecord,
    pub products: Vec<Value>,
}

/// Decode a single non-blank line
pub fn decode_line(line: &str) -> Result<DecodedLine, DecodeError> {
    let mut fields = match serde_json::from_str::<Value>(line)? {
        Value::Object(map) => map,
        other => return Err(DecodeError::NotAnObject(json_type_name(&other))),
    };

    let products = match fields.remove("products") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    let record = scan_record_from(&fields, &products);
    Ok(DecodedLine { record, products })
}

/// Map the top-level fields of a line onto a fully populated scan record
fn scan_record_from(fields: &Map<String, Value>, products: &[Value]) -> ScanRecord {
    let doc = Document::new(fields);

    // The join key keeps the source values even when a column is coerced
    let scan_id = ScanRecord::make_scan_id(
        doc.text_or(&["ip"], ""),
        doc.text_or(&["port"], "0"),
        doc.text_or(&["timestamp"], "0"),
    );

    ScanRecord {
        scan_id,
        ip: doc.string(&["ip"]),
        port: doc.integer(&["port"]),
        protocol: doc.string(&["protocol"]),
        tls_enabled: doc.flag(&["ssl/tls", "tls_enabled"]),
        used_probes: doc.mapping(&["used_probes"]),
        scan_tries: doc.integer(&["scan_tries"]),
        sent_probes: doc.integer(&["sended_probes", "sent_probes"]),
        banners: doc.mapping(&["banners"]),
        timestamp: doc.integer(&["timestamp"]),
        total_time_spent: doc.string(&["total_time_spent"]),
        hex_banners: doc.mapping(&["hex_banners"]),
        banner_hashes: doc.mapping(&["banners_hashes", "banner_hashes"]),
        product_count: u32::try_from(products.len()).unwrap_or(u32::MAX),
        product_services: product_services(products),
    }
}

/// Distinct non-empty `service` values across raw product entries
pub fn product_services(products: &[Value]) -> BTreeSet<String> {
    products
        .iter()
        .filter_map(Value::as_object)
        .map(|fields| Document::new(fields).string(&["service"]))
        .filter(|service| !service.is_empty())
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
