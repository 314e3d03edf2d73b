// src/products.rs

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, header};
use thiserror::Error;
use url::Url;

use crate::csrf::{CsrfToken, with_token};
use crate::formset::FieldValue;
use crate::models::{ProductFormData, ProductSaveResponse};
use crate::state::AdminConfig;

/// Ukryte pola ustawiane przez przyciski zapisu.
pub const APPLY_CHANGES_FIELD: &str = "aplicar_cambios";
pub const REDIRECT_FIELD: &str = "redirigir";

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Błąd połączenia: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serwer odpowiedział statusem {0}")]
    Status(StatusCode),

    #[error("{0}")]
    Rejected(String),

    #[error("Nieprawidłowy adres: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Sposób zapisu wybrany przyciskiem formularza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Zapis bez opuszczania strony; backend odpowiada JSON-em.
    ApplyChanges,
    /// Zwykły zapis zakończony przekierowaniem.
    SaveAndExit,
}

impl SubmitMode {
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut mode = SubmitMode::SaveAndExit;
        for (name, value) in fields {
            if value != "true" {
                continue;
            }
            match name {
                APPLY_CHANGES_FIELD => mode = SubmitMode::ApplyChanges,
                REDIRECT_FIELD => return SubmitMode::SaveAndExit,
                _ => {}
            }
        }
        mode
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Backend przyjął zmiany i zwrócił JSON.
    Saved {
        message: Option<String>,
        producto_id: Option<i64>,
    },
    /// Backend przekierował; adres jest już bezwzględny.
    Redirect(Url),
}

#[derive(Clone)]
pub struct ProductClient {
    http: Client,
    create_url: Url,
    backend_url: Url,
    edit_path: String,
    data_url: Url,
}

impl ProductClient {
    pub fn new(http: Client, config: &AdminConfig) -> Self {
        Self {
            http,
            create_url: config.product_create_url.clone(),
            backend_url: config.backend_url.clone(),
            edit_path: config.product_edit_path.clone(),
            data_url: config.product_data_url.clone(),
        }
    }

    fn target_url(&self, product_id: Option<i64>) -> Result<Url, ProductError> {
        match product_id {
            Some(id) => Ok(self
                .backend_url
                .join(&self.edit_path.replace("{id}", &id.to_string()))?),
            None => Ok(self.create_url.clone()),
        }
    }

    /// Dane formularza: kategorie, a przy edycji także produkt z zapisanymi zdjęciami i rozmiarami.
    pub async fn fetch_form_data(
        &self,
        product_id: Option<i64>,
    ) -> Result<ProductFormData, ProductError> {
        let mut request = self
            .http
            .get(self.data_url.clone())
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(id) = product_id {
            request = request.query(&[("id", id)]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                "Dane formularza produktu {:?}: backend zwrócił status {}",
                product_id,
                status
            );
            return Err(ProductError::Status(status));
        }
        let data: ProductFormData = response.json().await?;
        if !data.success {
            return Err(ProductError::Rejected(
                data.error.unwrap_or_else(|| "Nieznany błąd".to_string()),
            ));
        }
        Ok(data)
    }

    /// Przesyła formularz jako multipart do endpointu tworzenia lub edycji.
    pub async fn submit(
        &self,
        fields: Vec<(String, FieldValue)>,
        product_id: Option<i64>,
        mode: SubmitMode,
        csrf: Option<&CsrfToken>,
    ) -> Result<SubmitOutcome, ProductError> {
        let url = self.target_url(product_id)?;
        let field_count = fields.len();
        let mut form = Form::new();
        for (name, value) in fields {
            form = match value {
                FieldValue::Text(text) => form.text(name, text),
                FieldValue::File(file) => {
                    let part = Part::bytes(file.bytes.to_vec()).file_name(file.filename);
                    let part = match file.content_type {
                        Some(ct) => part.mime_str(&ct)?,
                        None => part,
                    };
                    form.part(name, part)
                }
            };
        }
        tracing::info!(
            "Wysyłanie formularza produktu ({} pól, tryb {:?}) do {}",
            field_count,
            mode,
            url
        );

        let mut request = self.http.post(url.clone()).multipart(form);
        if mode == SubmitMode::ApplyChanges {
            request = request
                .header("X-Requested-With", "XMLHttpRequest")
                .header(header::ACCEPT, "application/json");
        }
        let response = with_token(request, csrf).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(ProductError::Status(status))?;
            let target = url.join(location)?;
            tracing::info!("Backend przekierował po zapisie do {}", target);
            return Ok(SubmitOutcome::Redirect(target));
        }
        if !status.is_success() {
            tracing::error!("Zapis produktu: backend zwrócił status {}", status);
            return Err(ProductError::Status(status));
        }

        let body = response.text().await?;
        let parsed: ProductSaveResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Strona HTML zamiast JSON oznacza zwykle błędy walidacji formularza po stronie backendu.
                tracing::warn!("Odpowiedź zapisu nie jest JSON-em: {}", e);
                return Err(ProductError::Rejected(
                    "Serwer nie potwierdził zapisu. Sprawdź poprawność formularza.".to_string(),
                ));
            }
        };
        if parsed.success {
            Ok(SubmitOutcome::Saved {
                message: parsed.message,
                producto_id: parsed.producto_id.or(product_id),
            })
        } else {
            Err(ProductError::Rejected(
                parsed.error.unwrap_or_else(|| "Nieznany błąd".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Multipart, Query, State};
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Redirect, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::formset::UploadedFile;

    #[derive(Default)]
    struct Received {
        fields: Vec<(String, String)>,
        files: Vec<(String, String, usize)>,
        csrf: Option<String>,
    }

    type Shared = Arc<Mutex<Received>>;

    async fn datos(Query(q): Query<HashMap<String, String>>) -> Response {
        match q.get("id").map(String::as_str) {
            None => Json(json!({
                "success": true,
                "categorias": [{"id": 1, "nombre": "Kurtki"}]
            }))
            .into_response(),
            Some("5") => Json(json!({
                "success": true,
                "producto": {"id": 5, "nombre": "Parka", "precio": "199.00", "marca": 2},
                "imagenes": [{"id": 11, "orden": 0, "es_principal": true, "url": "https://cdn/a.jpg"}],
                "tallas": [{"id": 3, "talla": "M", "stock": 2}],
                "categorias": []
            }))
            .into_response(),
            Some(_) => Json(json!({"success": false, "error": "Produkt nie istnieje"})).into_response(),
        }
    }

    async fn record(shared: &Shared, headers: &HeaderMap, mut multipart: Multipart) {
        shared.lock().unwrap().csrf = headers
            .get("X-CSRFToken")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let len = field.bytes().await.unwrap().len();
                    shared.lock().unwrap().files.push((name, filename, len));
                }
                None => {
                    let text = field.text().await.unwrap();
                    shared.lock().unwrap().fields.push((name, text));
                }
            }
        }
    }

    async fn crear(State(shared): State<Shared>, headers: HeaderMap, multipart: Multipart) -> Response {
        let ajax = headers.contains_key("X-Requested-With");
        record(&shared, &headers, multipart).await;
        if ajax {
            Json(json!({"success": true, "message": "Zapisano", "producto_id": 77})).into_response()
        } else {
            Redirect::to("/admin/productos/").into_response()
        }
    }

    async fn editar(State(shared): State<Shared>, headers: HeaderMap, multipart: Multipart) -> Response {
        record(&shared, &headers, multipart).await;
        Json(json!({"success": false, "error": "Cena musi być dodatnia"})).into_response()
    }

    async fn spawn_backend(shared: Shared) -> ProductClient {
        let app = Router::new()
            .route("/admin/productos/datos/", get(datos))
            .route("/admin/productos/crear/", post(crear))
            .route("/admin/productos/{id}/editar/", post(editar))
            .with_state(shared);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let base = format!("http://{}/", addr);
        let config = AdminConfig::from_lookup(|k| (k == "BACKEND_URL").then(|| base.clone())).unwrap();
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        ProductClient::new(http, &config)
    }

    #[test]
    fn mode_comes_from_hidden_flags() {
        assert_eq!(
            SubmitMode::from_fields([("nombre", "x"), (APPLY_CHANGES_FIELD, "true")]),
            SubmitMode::ApplyChanges
        );
        assert_eq!(
            SubmitMode::from_fields([(REDIRECT_FIELD, "true")]),
            SubmitMode::SaveAndExit
        );
        assert_eq!(
            SubmitMode::from_fields([(APPLY_CHANGES_FIELD, "false")]),
            SubmitMode::SaveAndExit
        );
        assert_eq!(SubmitMode::from_fields([]), SubmitMode::SaveAndExit);
    }

    #[tokio::test]
    async fn fetches_form_data_for_new_and_existing_products() {
        let client = spawn_backend(Shared::default()).await;

        let fresh = client.fetch_form_data(None).await.unwrap();
        assert!(fresh.producto.is_none());
        assert_eq!(fresh.categorias.len(), 1);

        let existing = client.fetch_form_data(Some(5)).await.unwrap();
        assert_eq!(existing.producto.unwrap().nombre, "Parka");
        assert_eq!(existing.imagenes.len(), 1);
        assert_eq!(existing.tallas[0]["talla"], "M");

        let err = client.fetch_form_data(Some(9)).await.unwrap_err();
        assert_eq!(err.to_string(), "Produkt nie istnieje");
    }

    #[tokio::test]
    async fn apply_changes_forwards_text_and_files() {
        let shared = Shared::default();
        let client = spawn_backend(shared.clone()).await;
        let token = CsrfToken::new("tok").unwrap();
        let fields = vec![
            ("nombre".to_string(), FieldValue::text("Parka")),
            ("imagenes-TOTAL_FORMS".to_string(), FieldValue::text("1")),
            (
                "imagenes-0-imagen".to_string(),
                FieldValue::File(UploadedFile {
                    filename: "a.jpg".into(),
                    content_type: Some("image/jpeg".into()),
                    bytes: axum::body::Bytes::from_static(b"\xff\xd8\xff"),
                }),
            ),
        ];

        let outcome = client
            .submit(fields, None, SubmitMode::ApplyChanges, Some(&token))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Saved {
                message: Some("Zapisano".into()),
                producto_id: Some(77)
            }
        );

        let received = shared.lock().unwrap();
        assert_eq!(received.csrf.as_deref(), Some("tok"));
        assert!(received.fields.contains(&("imagenes-TOTAL_FORMS".into(), "1".into())));
        assert_eq!(
            received.files,
            vec![("imagenes-0-imagen".into(), "a.jpg".into(), 3)]
        );
    }

    #[tokio::test]
    async fn save_and_exit_relays_backend_redirect() {
        let client = spawn_backend(Shared::default()).await;
        let outcome = client
            .submit(
                vec![("nombre".into(), FieldValue::text("Parka"))],
                None,
                SubmitMode::SaveAndExit,
                None,
            )
            .await
            .unwrap();
        match outcome {
            SubmitOutcome::Redirect(url) => assert_eq!(url.path(), "/admin/productos/"),
            other => panic!("oczekiwano przekierowania, jest {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejected_edit_surfaces_server_error() {
        let client = spawn_backend(Shared::default()).await;
        let err = client
            .submit(
                vec![("nombre".into(), FieldValue::text("Parka"))],
                Some(5),
                SubmitMode::ApplyChanges,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProductError::Rejected(ref m) if m == "Cena musi być dodatnia"));
    }
}
