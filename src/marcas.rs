// src/marcas.rs

use std::sync::Arc;

use moka::future::Cache;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;
use validator::Validate;

use crate::csrf::{CSRF_FIELD, CsrfToken, with_token};
use crate::models::{
    CreateMarcaPayload, CreatedMarca, Marca, MarcaCreateResponse, MarcaDeleteResponse,
    MarcaListResponse,
};
use crate::state::AdminConfig;

const UNKNOWN_ERROR: &str = "Nieznany błąd";

#[derive(Debug, Error)]
pub enum MarcaError {
    /// Błąd sieci lub odpowiedzi, której nie da się odczytać. Treść trafia do użytkownika bez zmian.
    #[error("Błąd połączenia: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serwer odpowiedział statusem {0}")]
    Status(StatusCode),

    /// Backend odpowiedział `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Invalid(String),
}

/// Klient endpointów marek backendu (lista, tworzenie, usuwanie).
#[derive(Clone)]
pub struct MarcaClient {
    http: Client,
    list_url: Url,
    create_url: Url,
    delete_url: Url,
    cache: Option<Cache<String, Arc<Vec<Marca>>>>,
}

impl MarcaClient {
    pub fn new(http: Client, config: &AdminConfig) -> Self {
        let cache = (!config.marcas_cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(config.marcas_cache_ttl)
                .build()
        });
        Self {
            http,
            list_url: config.marcas_list_url.clone(),
            create_url: config.marcas_create_url.clone(),
            delete_url: config.marcas_delete_url.clone(),
            cache,
        }
    }

    /// Pobiera listę marek; wynik trzymany jest krótko w cache'u.
    pub async fn list(&self) -> Result<Arc<Vec<Marca>>, MarcaError> {
        let key = self.list_url.to_string();
        if let Some(cache) = &self.cache {
            if let Some(marcas) = cache.get(&key).await {
                tracing::debug!("Cache HIT dla listy marek");
                return Ok(marcas);
            }
        }

        tracing::debug!("Pobieranie listy marek z {}", self.list_url);
        let response = self
            .http
            .get(self.list_url.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!("Lista marek: backend zwrócił status {}", status);
            return Err(MarcaError::Status(status));
        }
        let body: MarcaListResponse = response.json().await?;
        if !body.success {
            let message = body.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            tracing::warn!("Backend odrzucił pobranie listy marek: {}", message);
            return Err(MarcaError::Rejected(message));
        }

        let marcas = Arc::new(body.marcas);
        if let Some(cache) = &self.cache {
            cache.insert(key, marcas.clone()).await;
        }
        Ok(marcas)
    }

    /// Tworzy markę. Gdy marka o tej nazwie już istnieje, backend zwraca ją z `existed = true`.
    pub async fn create(
        &self,
        nombre: &str,
        csrf: Option<&CsrfToken>,
    ) -> Result<CreatedMarca, MarcaError> {
        let payload = CreateMarcaPayload::new(nombre);
        if let Err(errors) = payload.validate() {
            let message = errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .next()
                .unwrap_or_else(|| "Nazwa marki jest wymagana".to_string());
            return Err(MarcaError::Invalid(message));
        }

        let mut form = vec![("nombre", payload.nombre.as_str())];
        if let Some(token) = csrf {
            form.push((CSRF_FIELD, token.as_str()));
        }
        let request = self
            .http
            .post(self.create_url.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&form);
        let response = with_token(request, csrf).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!("Tworzenie marki: backend zwrócił status {}", status);
            return Err(MarcaError::Status(status));
        }
        let body: MarcaCreateResponse = response.json().await?;
        self.invalidate().await;

        match body {
            MarcaCreateResponse {
                success: true,
                id: Some(id),
                nombre,
                existed,
                ..
            } => {
                let nombre = nombre.unwrap_or(payload.nombre);
                tracing::info!(
                    "Marka '{}' (id {}) {}",
                    nombre,
                    id,
                    if existed { "już istniała" } else { "utworzona" }
                );
                Ok(CreatedMarca {
                    id,
                    nombre,
                    existed,
                })
            }
            MarcaCreateResponse {
                success: true,
                id: None,
                ..
            } => Err(MarcaError::Rejected(
                "Odpowiedź backendu nie zawiera identyfikatora marki".to_string(),
            )),
            MarcaCreateResponse { error, .. } => Err(MarcaError::Rejected(
                error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            )),
        }
    }

    /// Usuwa markę. Zwraca komunikat backendu, jeśli go podał.
    pub async fn delete(
        &self,
        id: i64,
        csrf: Option<&CsrfToken>,
    ) -> Result<Option<String>, MarcaError> {
        let id_str = id.to_string();
        let mut form = vec![("id", id_str.as_str())];
        if let Some(token) = csrf {
            form.push((CSRF_FIELD, token.as_str()));
        }
        let request = self
            .http
            .post(self.delete_url.clone())
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&form);
        let response = with_token(request, csrf).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!("Usuwanie marki {}: backend zwrócił status {}", id, status);
            return Err(MarcaError::Status(status));
        }
        let body: MarcaDeleteResponse = response.json().await?;
        self.invalidate().await;

        if body.success {
            tracing::info!("Usunięto markę o id {}", id);
            Ok(body.message)
        } else {
            Err(MarcaError::Rejected(
                body.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            ))
        }
    }

    /// Każda zmiana po stronie backendu unieważnia listę; następne pobranie buduje ją od nowa.
    pub async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&self.list_url.to_string()).await;
        }
    }
}

/// Filtr wyszukiwarki: dopasowanie fragmentu nazwy bez względu na wielkość liter.
pub fn filter_marcas<'a>(marcas: &'a [Marca], query: &str) -> Vec<&'a Marca> {
    let needle = query.trim().to_lowercase();
    marcas
        .iter()
        .filter(|m| needle.is_empty() || m.nombre.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Form, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        list_calls: AtomicUsize,
        marcas: Mutex<Vec<Marca>>,
        last_form: Mutex<HashMap<String, String>>,
        last_csrf_header: Mutex<Option<String>>,
    }

    async fn list(State(b): State<Arc<FakeBackend>>) -> Json<Value> {
        b.list_calls.fetch_add(1, Ordering::SeqCst);
        let marcas = b.marcas.lock().unwrap().clone();
        Json(json!({ "success": true, "marcas": marcas }))
    }

    async fn create(
        State(b): State<Arc<FakeBackend>>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        *b.last_csrf_header.lock().unwrap() = headers
            .get("X-CSRFToken")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *b.last_form.lock().unwrap() = form.clone();
        let nombre = form.get("nombre").cloned().unwrap_or_default();
        let mut marcas = b.marcas.lock().unwrap();
        if let Some(existing) = marcas.iter().find(|m| m.nombre.eq_ignore_ascii_case(&nombre)) {
            return Json(
                json!({ "success": true, "id": existing.id, "nombre": existing.nombre, "existed": true }),
            );
        }
        let id = marcas.len() as i64 + 1;
        marcas.push(Marca {
            id,
            nombre: nombre.clone(),
            productos_count: 0,
        });
        Json(json!({ "success": true, "id": id, "nombre": nombre, "existed": false }))
    }

    async fn delete(
        State(b): State<Arc<FakeBackend>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        let id: i64 = form.get("id").and_then(|v| v.parse().ok()).unwrap_or(-1);
        let mut marcas = b.marcas.lock().unwrap();
        match marcas.iter().position(|m| m.id == id) {
            Some(pos) if marcas[pos].productos_count > 0 => Json(
                json!({ "success": false, "error": "Marka ma przypisane produkty" }),
            ),
            Some(pos) => {
                marcas.remove(pos);
                Json(json!({ "success": true, "message": "Usunięto" }))
            }
            None => Json(json!({ "success": false })),
        }
    }

    async fn spawn_backend(backend: Arc<FakeBackend>) -> String {
        let app = Router::new()
            .route("/admin/marcas/listar/", get(list))
            .route("/admin/marcas/crear/", post(create))
            .route("/admin/marcas/eliminar/", post(delete))
            .with_state(backend);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn client_for(base: &str, ttl_secs: &str) -> MarcaClient {
        let vars = HashMap::from([
            ("BACKEND_URL".to_string(), base.to_string()),
            ("MARCAS_CACHE_TTL_SECS".to_string(), ttl_secs.to_string()),
        ]);
        let config = AdminConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        MarcaClient::new(Client::new(), &config)
    }

    #[tokio::test]
    async fn list_is_cached_until_a_mutation() {
        let backend = Arc::new(FakeBackend::default());
        backend.marcas.lock().unwrap().push(Marca {
            id: 1,
            nombre: "Zara".into(),
            productos_count: 3,
        });
        let base = spawn_backend(backend.clone()).await;
        let client = client_for(&base, "60");

        assert_eq!(client.list().await.unwrap().len(), 1);
        assert_eq!(client.list().await.unwrap().len(), 1);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);

        let created = client.create("Mango", None).await.unwrap();
        assert!(!created.existed);
        let marcas = client.list().await.unwrap();
        assert_eq!(marcas.len(), 2);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn create_sends_csrf_and_reports_existing() {
        let backend = Arc::new(FakeBackend::default());
        backend.marcas.lock().unwrap().push(Marca {
            id: 7,
            nombre: "Zara".into(),
            productos_count: 0,
        });
        let base = spawn_backend(backend.clone()).await;
        let client = client_for(&base, "0");
        let token = CsrfToken::new("tok-1").unwrap();

        let created = client.create("  zara ", Some(&token)).await.unwrap();
        assert_eq!(
            created,
            CreatedMarca {
                id: 7,
                nombre: "Zara".into(),
                existed: true
            }
        );
        let form = backend.last_form.lock().unwrap().clone();
        assert_eq!(form.get("nombre").map(String::as_str), Some("zara"));
        assert_eq!(form.get(CSRF_FIELD).map(String::as_str), Some("tok-1"));
        assert_eq!(
            backend.last_csrf_header.lock().unwrap().as_deref(),
            Some("tok-1")
        );
    }

    #[tokio::test]
    async fn empty_name_is_rejected_before_any_request() {
        let client = client_for("http://127.0.0.1:9/", "0");
        let err = client.create("   ", None).await.unwrap_err();
        assert!(matches!(err, MarcaError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_surfaces_backend_errors() {
        let backend = Arc::new(FakeBackend::default());
        backend.marcas.lock().unwrap().extend([
            Marca {
                id: 1,
                nombre: "Zara".into(),
                productos_count: 2,
            },
            Marca {
                id: 2,
                nombre: "Mango".into(),
                productos_count: 0,
            },
        ]);
        let base = spawn_backend(backend.clone()).await;
        let client = client_for(&base, "0");

        let err = client.delete(1, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Marka ma przypisane produkty");

        let err = client.delete(99, None).await.unwrap_err();
        assert_eq!(err.to_string(), UNKNOWN_ERROR);

        assert_eq!(
            client.delete(2, None).await.unwrap().as_deref(),
            Some("Usunięto")
        );
        assert_eq!(client.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn network_failure_is_a_transport_error() {
        let client = client_for("http://127.0.0.1:9/", "0");
        let err = client.list().await.unwrap_err();
        assert!(matches!(err, MarcaError::Transport(_)));
        assert!(err.to_string().starts_with("Błąd połączenia"));
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let marcas = vec![
            Marca {
                id: 1,
                nombre: "Zara Home".into(),
                productos_count: 0,
            },
            Marca {
                id: 2,
                nombre: "Mango".into(),
                productos_count: 0,
            },
        ];
        let hits: Vec<i64> = filter_marcas(&marcas, "HOME").iter().map(|m| m.id).collect();
        assert_eq!(hits, vec![1]);
        assert_eq!(filter_marcas(&marcas, "  ").len(), 2);
        assert!(filter_marcas(&marcas, "levi").is_empty());
    }
}
