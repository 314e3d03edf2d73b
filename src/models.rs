// src/models.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Marka w postaci zwracanej przez endpoint listy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Marca {
    pub id: i64,
    pub nombre: String,
    #[serde(default)]
    pub productos_count: u32,
}

impl Marca {
    /// Markę można usunąć tylko wtedy, gdy nie ma przypisanych produktów.
    pub fn can_delete(&self) -> bool {
        self.productos_count == 0
    }
}

#[derive(Debug, Deserialize)]
pub struct MarcaListResponse {
    pub success: bool,
    #[serde(default)]
    pub marcas: Vec<Marca>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarcaCreateResponse {
    pub success: bool,
    pub id: Option<i64>,
    pub nombre: Option<String>,
    #[serde(default)]
    pub existed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarcaDeleteResponse {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Wynik utworzenia marki (lub wybrania istniejącej o tej samej nazwie).
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedMarca {
    pub id: i64,
    pub nombre: String,
    pub existed: bool,
}

#[derive(Debug, Validate)]
pub struct CreateMarcaPayload {
    #[validate(length(min = 1, max = 100, message = "Nazwa marki musi mieć od 1 do 100 znaków"))]
    pub nombre: String,
}

impl CreateMarcaPayload {
    pub fn new(nombre: &str) -> Self {
        Self {
            nombre: nombre.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Categoria {
    pub id: i64,
    pub nombre: String,
}

/// Podstawowe pola produktu w odpowiedzi endpointu danych formularza.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProductFields {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub precio: Value,
    pub categoria: Option<i64>,
    pub marca: Option<i64>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub disponible: bool,
}

fn default_true() -> bool {
    true
}

/// Dane potrzebne do zbudowania formularza: produkt, jego zapisane formsety i kategorie.
#[derive(Debug, Deserialize, Default)]
pub struct ProductFormData {
    pub success: bool,
    pub producto: Option<ProductFields>,
    #[serde(default)]
    pub imagenes: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub tallas: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub categorias: Vec<Categoria>,
    pub error: Option<String>,
}

/// Odpowiedź backendu na zapis w trybie `aplicar_cambios`.
#[derive(Debug, Deserialize)]
pub struct ProductSaveResponse {
    pub success: bool,
    pub message: Option<String>,
    pub producto_id: Option<i64>,
    pub error: Option<String>,
}

/// Zamienia wartość JSON na tekst pola formularza (jak przy renderowaniu przez backend).
pub fn value_to_form_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "on".to_string(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wiersze formsetu z JSON na mapy pól tekstowych.
pub fn rows_to_fields(rows: Vec<BTreeMap<String, Value>>) -> Vec<BTreeMap<String, String>> {
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| {
                    let text = value_to_form_string(&v);
                    (k, text)
                })
                .collect()
        })
        .collect()
}
