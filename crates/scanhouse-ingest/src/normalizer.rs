//! Product normalization
//!
//! Expands the raw `products` array of a scan line into flat
//! [`ProductEntry`] rows tagged with the owning scan's identifier.

use serde_json::{Map, Value};

use crate::document::Document;
use crate::models::ProductEntry;

/// One row per raw entry, in input order.
///
/// Entries are coerced, never rejected: an entry that is not a JSON object
/// still yields a row with every field at its default.
pub fn normalize_products(scan_id: &str, products: &[Value]) -> Vec<ProductEntry> {
    let empty = Map::new();

    products
        .iter()
        .map(|product| {
            let fields = product.as_object().unwrap_or(&empty);
            product_entry_from(scan_id, Document::new(fields))
        })
        .collect()
}

fn product_entry_from(scan_id: &str, doc: Document<'_>) -> ProductEntry {
    ProductEntry {
        scan_id: scan_id.to_string(),
        probe: doc.string(&["probe"]),
        service: doc.string(&["service"]),
        regex: doc.string(&["regex"]),
        softmatch: u8::from(doc.flag(&["softmatch"])),
        vendor_product_name: doc.opt_string(&["vendorproductname", "vendor_product_name"]),
        info: doc.opt_string(&["info"]),
        os: doc.opt_string(&["os"]),
        device_type: doc.opt_string(&["devicetype", "device_type"]),
        hostname: doc.opt_string(&["hostname"]),
        cpe: doc.string_list(&["cpe"]),
    }
}
