// src/state.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::marcas::MarcaClient;
use crate::products::ProductClient;

#[derive(Clone)]
pub struct AppState {
    pub config: AdminConfig,
    pub marca_client: MarcaClient,
    pub product_client: ProductClient,
}

impl AppState {
    pub fn new(config: AdminConfig) -> Result<Self, ConfigError> {
        // Bez podążania za przekierowaniami: przekierowanie backendu po zapisie
        // przekazujemy przeglądarce.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            marca_client: MarcaClient::new(http.clone(), &config),
            product_client: ProductClient::new(http, &config),
            config,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Zmienna środowiskowa {0} musi być ustawiona")]
    Missing(&'static str),

    #[error("Nieprawidłowy adres URL w {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },

    #[error("Nieprawidłowa wartość {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("Nie można zbudować klienta HTTP: {0}")]
    HttpClient(reqwest::Error),
}

/// Konfiguracja usługi: adres nasłuchu, backend i ścieżki jego endpointów.
#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub bind_addr: SocketAddr,
    pub backend_url: Url,
    pub marcas_list_url: Url,
    pub marcas_create_url: Url,
    pub marcas_delete_url: Url,
    pub product_create_url: Url,
    /// Ścieżka z `{id}`, np. `admin/productos/{id}/editar/`.
    pub product_edit_path: String,
    pub product_data_url: Url,
    pub marcas_cache_ttl: Duration,
    pub request_timeout: Duration,
    pub shell_template: PathBuf,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MARCAS_LIST_PATH: &str = "admin/marcas/listar/";
const DEFAULT_MARCAS_CREATE_PATH: &str = "admin/marcas/crear/";
const DEFAULT_MARCAS_DELETE_PATH: &str = "admin/marcas/eliminar/";
const DEFAULT_PRODUCT_CREATE_PATH: &str = "admin/productos/crear/";
const DEFAULT_PRODUCT_EDIT_PATH: &str = "admin/productos/{id}/editar/";
const DEFAULT_PRODUCT_DATA_PATH: &str = "admin/productos/datos/";
const DEFAULT_MARCAS_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SHELL_TEMPLATE: &str = "static/admin.html";

impl AdminConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Buduje konfigurację z dowolnego źródła zmiennych (środowisko, mapa w testach).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &'static str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let raw_backend = lookup("BACKEND_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("BACKEND_URL"))?;
        // Url::join traktuje ostatni segment bez '/' jak plik, więc dopinamy ukośnik.
        let backend_base = if raw_backend.ends_with('/') {
            raw_backend
        } else {
            format!("{}/", raw_backend)
        };
        let backend_url = Url::parse(&backend_base).map_err(|source| ConfigError::InvalidUrl {
            name: "BACKEND_URL",
            source,
        })?;

        let join = |name: &'static str, default: &str| -> Result<Url, ConfigError> {
            let path = get(name, default);
            backend_url
                .join(path.trim_start_matches('/'))
                .map_err(|source| ConfigError::InvalidUrl { name, source })
        };

        let bind_raw = get("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: "BIND_ADDR",
                value: bind_raw.clone(),
            })?;

        let secs = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            let raw = get(name, &default.to_string());
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue { name, value: raw })
        };

        let product_edit_path = get("PRODUCT_EDIT_PATH", DEFAULT_PRODUCT_EDIT_PATH);
        if !product_edit_path.contains("{id}") {
            return Err(ConfigError::InvalidValue {
                name: "PRODUCT_EDIT_PATH",
                value: product_edit_path,
            });
        }

        Ok(Self {
            bind_addr,
            marcas_list_url: join("MARCAS_LIST_PATH", DEFAULT_MARCAS_LIST_PATH)?,
            marcas_create_url: join("MARCAS_CREATE_PATH", DEFAULT_MARCAS_CREATE_PATH)?,
            marcas_delete_url: join("MARCAS_DELETE_PATH", DEFAULT_MARCAS_DELETE_PATH)?,
            product_create_url: join("PRODUCT_CREATE_PATH", DEFAULT_PRODUCT_CREATE_PATH)?,
            product_edit_path: product_edit_path.trim_start_matches('/').to_string(),
            product_data_url: join("PRODUCT_DATA_PATH", DEFAULT_PRODUCT_DATA_PATH)?,
            marcas_cache_ttl: secs("MARCAS_CACHE_TTL_SECS", DEFAULT_MARCAS_CACHE_TTL_SECS)?,
            request_timeout: secs("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            shell_template: PathBuf::from(get("SHELL_TEMPLATE", DEFAULT_SHELL_TEMPLATE)),
            backend_url,
        })
    }
}
