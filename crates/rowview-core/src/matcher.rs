use crate::record::{FieldAccess, FieldValue};

/// Case-insensitive barcode matcher over a fixed set of fields.
pub struct BarcodeMatcher<'a> {
    needle: String,
    fields: &'a [String],
}

impl<'a> BarcodeMatcher<'a> {
    /// Normalize a scanned barcode into a matcher. Returns `None` for blank inputs.
    pub fn new(barcode: &str, fields: &'a [String]) -> Option<Self> {
        let trimmed = barcode.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            needle: trimmed.to_lowercase(),
            fields,
        })
    }

    /// Determine whether any configured field of `row` contains the barcode.
    pub fn matches(&self, row: &impl FieldAccess) -> bool {
        self.fields
            .iter()
            .filter_map(|field| row.field_value(field))
            .any(|value| self.matches_value(value))
    }

    fn matches_value(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Null | FieldValue::Bool(_) => false,
            FieldValue::Int(n) => n.to_string().contains(&self.needle),
            FieldValue::Text(text) => text.to_lowercase().contains(&self.needle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn matcher_skips_blank_barcodes() {
        let names = fields(&["barcode"]);
        assert!(BarcodeMatcher::new("", &names).is_none());
        assert!(BarcodeMatcher::new("   ", &names).is_none());
        assert!(BarcodeMatcher::new("\n", &names).is_none());
    }

    #[test]
    fn matcher_reads_configured_fields_only() {
        let row = Record::builder(1)
            .field("barcode", "PAL-0042")
            .field("note", "pal-9999")
            .field("qty", 1337)
            .build();

        let names = fields(&["barcode", "qty"]);
        let matcher = BarcodeMatcher::new("pal-0042", &names)
            .unwrap_or_else(|| panic!("matcher must exist for non-blank barcodes"));
        assert!(matcher.matches(&row));

        let matcher = BarcodeMatcher::new("33", &names)
            .unwrap_or_else(|| panic!("matcher must exist for non-blank barcodes"));
        assert!(matcher.matches(&row));

        let matcher = BarcodeMatcher::new("9999", &names)
            .unwrap_or_else(|| panic!("matcher must exist for non-blank barcodes"));
        assert!(!matcher.matches(&row));
    }
}
