// src/formset/schema.rs

use strum_macros::AsRefStr;

use super::naming::ID_FIELD;

/// Rodzaj kontrolki, w jakiej renderowane jest pole bloku.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Checkbox,
    File,
    Hidden,
}

/// Wartość początkowa pola w nowo dodanym bloku.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Empty,
    Value(&'static str),
    /// Pozycja bloku w chwili dodania (np. domyślna kolejność zdjęcia).
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub default: FieldDefault,
    pub placeholder: Option<&'static str>,
}

impl FieldSpec {
    pub fn default_value(&self, index: usize) -> String {
        match self.default {
            FieldDefault::Empty => String::new(),
            FieldDefault::Value(v) => v.to_string(),
            FieldDefault::Index => index.to_string(),
        }
    }
}

/// Opis formsetu: prefiks, pola bloku i limity formularza zarządzającego.
#[derive(Debug, PartialEq, Eq)]
pub struct FormsetSchema {
    pub prefix: &'static str,
    pub title: &'static str,
    pub add_label: &'static str,
    pub fields: &'static [FieldSpec],
    /// Liczba pustych bloków na nowym formularzu.
    pub extra: usize,
    pub min_num: usize,
    pub max_num: usize,
    /// Flaga, która może być zaznaczona tylko w jednym bloku naraz.
    pub exclusive_flag: Option<&'static str>,
}

impl FormsetSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// Domyślny limit formularza zarządzającego, gdy backend nie podaje innego.
pub const DEFAULT_MAX_NUM_FORMS: usize = 1000;

pub static IMAGENES: FormsetSchema = FormsetSchema {
    prefix: "imagenes",
    title: "Zdjęcia produktu",
    add_label: "Dodaj zdjęcie",
    fields: &[
        FieldSpec {
            name: ID_FIELD,
            label: "",
            kind: FieldKind::Hidden,
            default: FieldDefault::Empty,
            placeholder: None,
        },
        FieldSpec {
            name: "imagen",
            label: "Zdjęcie",
            kind: FieldKind::File,
            default: FieldDefault::Empty,
            placeholder: None,
        },
        FieldSpec {
            name: "orden",
            label: "Kolejność",
            kind: FieldKind::Number,
            default: FieldDefault::Index,
            placeholder: None,
        },
        FieldSpec {
            name: "es_principal",
            label: "Zdjęcie główne",
            kind: FieldKind::Checkbox,
            default: FieldDefault::Empty,
            placeholder: None,
        },
        FieldSpec {
            name: "titulo",
            label: "Tytuł (opcjonalnie)",
            kind: FieldKind::Text,
            default: FieldDefault::Empty,
            placeholder: Some("Opis zdjęcia"),
        },
    ],
    extra: 1,
    min_num: 0,
    max_num: 8,
    exclusive_flag: Some("es_principal"),
};

pub static TALLAS: FormsetSchema = FormsetSchema {
    prefix: "tallas",
    title: "Rozmiary",
    add_label: "Dodaj rozmiar",
    fields: &[
        FieldSpec {
            name: ID_FIELD,
            label: "",
            kind: FieldKind::Hidden,
            default: FieldDefault::Empty,
            placeholder: None,
        },
        FieldSpec {
            name: "talla",
            label: "Rozmiar",
            kind: FieldKind::Text,
            default: FieldDefault::Empty,
            placeholder: Some("np. M, 38"),
        },
        FieldSpec {
            name: "stock",
            label: "Stan magazynowy",
            kind: FieldKind::Number,
            default: FieldDefault::Value("0"),
            placeholder: None,
        },
    ],
    extra: 1,
    min_num: 0,
    max_num: DEFAULT_MAX_NUM_FORMS,
    exclusive_flag: None,
};

pub static ALL: [&FormsetSchema; 2] = [&IMAGENES, &TALLAS];

pub fn schema_for(prefix: &str) -> Option<&'static FormsetSchema> {
    ALL.iter().copied().find(|s| s.prefix == prefix)
}
