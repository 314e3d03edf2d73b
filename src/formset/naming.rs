// src/formset/naming.rs

use std::fmt;

/// Pola formularza zarządzającego (management form) wspólne dla każdego prefiksu.
pub const TOTAL_FORMS: &str = "TOTAL_FORMS";
pub const INITIAL_FORMS: &str = "INITIAL_FORMS";
pub const MIN_NUM_FORMS: &str = "MIN_NUM_FORMS";
pub const MAX_NUM_FORMS: &str = "MAX_NUM_FORMS";

/// Sufiks znacznika usunięcia rozpoznawanego przez backend.
pub const DELETE_FIELD: &str = "DELETE";
/// Sufiks pola z tożsamością zapisanego rekordu.
pub const ID_FIELD: &str = "id";

/// Nazwa pola bloku w konwencji `<prefix>-<index>-<field>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldName<'a> {
    pub prefix: &'a str,
    pub index: usize,
    pub field: &'a str,
}

impl<'a> FieldName<'a> {
    pub fn new(prefix: &'a str, index: usize, field: &'a str) -> Self {
        Self {
            prefix,
            index,
            field,
        }
    }

    /// Rozbiera nazwę pola, jeśli należy do bloku o podanym prefiksie.
    /// Nazwy formularza zarządzającego (`imagenes-TOTAL_FORMS`) nie są polami bloków.
    pub fn parse(prefix: &'a str, name: &'a str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
        let (index_str, field) = rest.split_once('-')?;
        if index_str.is_empty() || !index_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if field.is_empty() {
            return None;
        }
        let index = index_str.parse().ok()?;
        Some(Self {
            prefix,
            index,
            field,
        })
    }

    /// Wartość atrybutu `id` (oraz `for` w etykietach).
    pub fn html_id(&self) -> String {
        format!("id_{}", self)
    }
}

impl fmt::Display for FieldName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.prefix, self.index, self.field)
    }
}

/// Nazwa pola formularza zarządzającego, np. `imagenes-TOTAL_FORMS`.
pub fn management_name(prefix: &str, key: &str) -> String {
    format!("{}-{}", prefix, key)
}

pub fn management_id(prefix: &str, key: &str) -> String {
    format!("id_{}-{}", prefix, key)
}

/// Wartości pól typu checkbox, które backend traktuje jako zaznaczone.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("on") || value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_name_and_id() {
        let name = FieldName::new("imagenes", 2, "titulo");
        assert_eq!(name.to_string(), "imagenes-2-titulo");
        assert_eq!(name.html_id(), "id_imagenes-2-titulo");
        assert_eq!(
            management_id("imagenes", TOTAL_FORMS),
            "id_imagenes-TOTAL_FORMS"
        );
        assert_eq!(management_name("tallas", TOTAL_FORMS), "tallas-TOTAL_FORMS");
    }

    #[test]
    fn parses_block_fields_only() {
        let parsed = FieldName::parse("imagenes", "imagenes-10-es_principal").unwrap();
        assert_eq!(parsed.index, 10);
        assert_eq!(parsed.field, "es_principal");

        assert!(FieldName::parse("imagenes", "imagenes-TOTAL_FORMS").is_none());
        assert!(FieldName::parse("imagenes", "tallas-0-talla").is_none());
        assert!(FieldName::parse("imagenes", "imagenes-0-").is_none());
        assert!(FieldName::parse("imagenes", "imagenes--1-titulo").is_none());
        assert!(FieldName::parse("imagenes", "imagenesx-0-titulo").is_none());
    }

    #[test]
    fn field_names_may_contain_dashes() {
        let parsed = FieldName::parse("imagenes", "imagenes-3-alt-text").unwrap();
        assert_eq!(parsed.field, "alt-text");
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy("on"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("1"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("off"));
    }
}
