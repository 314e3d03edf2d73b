// src/handlers.rs

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use maud::html;
use serde_json::json;

use crate::csrf::CsrfToken;
use crate::errors::AppError;
use crate::formset::schema::{ALL, IMAGENES, TALLAS};
use crate::formset::{FieldValue, FormsetController, FormsetState, UploadedFile, belongs_to};
use crate::htmx_handlers::{ProductFormView, render_product_form_maud};
use crate::models::{ProductFields, rows_to_fields};
use crate::notify::{Notification, deliver, is_htmx};
use crate::products::{ProductError, SubmitMode, SubmitOutcome};
use crate::response::build_response;
use crate::state::AppState;

fn edit_page_path(product_id: i64) -> String {
    format!("/admin/productos/{}/editar", product_id)
}

pub async fn new_product_page_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AppError> {
    tracing::info!("Obsłużono zapytanie GET /admin/productos/nuevo");
    render_product_page(&app_state, &headers, &jar, None).await
}

pub async fn edit_product_page_handler(
    State(app_state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AppError> {
    tracing::info!("Obsłużono zapytanie GET /admin/productos/{}/editar", product_id);
    render_product_page(&app_state, &headers, &jar, Some(product_id)).await
}

async fn render_product_page(
    app_state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
    product_id: Option<i64>,
) -> Result<Response, AppError> {
    let data = match app_state.product_client.fetch_form_data(product_id).await {
        Err(ProductError::Status(status)) if status == StatusCode::NOT_FOUND => {
            return Err(AppError::NotFound);
        }
        Err(e) => {
            tracing::error!("Nie można pobrać danych formularza produktu: {}", e);
            let page = html! {
                section ."product-form-unavailable p-6 text-gray-600" {
                    p { "Nie można wczytać formularza produktu. Spróbuj ponownie później." }
                }
            };
            let mut response_headers = HeaderMap::new();
            let body = deliver(headers, &mut response_headers, &Notification::error(e.to_string()), page);
            let mut response = build_response(headers, &app_state.config.shell_template, body).await?;
            response.headers_mut().extend(response_headers);
            return Ok(response);
        }
        Ok(data) => data,
    };

    let producto = match (product_id, data.producto) {
        (Some(_), None) => {
            tracing::warn!("Backend nie zwrócił produktu {:?}", product_id);
            return Err(AppError::NotFound);
        }
        (_, producto) => producto.unwrap_or_else(|| ProductFields {
            disponible: true,
            ..ProductFields::default()
        }),
    };

    // Formsety nowego produktu zaczynają od pustych bloków, edycji od zapisanych rekordów.
    let (imagenes, tallas) = match product_id {
        Some(_) => (
            FormsetState::from_persisted(&IMAGENES, rows_to_fields(data.imagenes)),
            FormsetState::from_persisted(&TALLAS, rows_to_fields(data.tallas)),
        ),
        None => (
            FormsetState::with_extra(&IMAGENES),
            FormsetState::with_extra(&TALLAS),
        ),
    };

    let (marcas, notice) = match app_state.marca_client.list().await {
        Ok(marcas) => (marcas, None),
        Err(e) => {
            tracing::error!("Nie można pobrać listy marek: {}", e);
            (Arc::default(), Some(Notification::error(e.to_string())))
        }
    };

    let csrf = CsrfToken::from_cookies(jar);
    if csrf.is_none() {
        tracing::warn!("Brak ciasteczka CSRF, formularz zostanie wysłany bez tokenu");
    }

    let page = render_product_form_maud(&ProductFormView {
        product_id,
        producto: &producto,
        categorias: &data.categorias,
        marcas: &marcas,
        imagenes: &imagenes,
        tallas: &tallas,
        csrf: csrf.as_ref(),
    });

    let mut response_headers = HeaderMap::new();
    let body = match notice {
        Some(notification) => deliver(headers, &mut response_headers, &notification, page),
        None => page,
    };
    let mut response = build_response(headers, &app_state.config.shell_template, body).await?;
    response.headers_mut().extend(response_headers);
    Ok(response)
}

/// Czyta formularz multipart w kolejności pól; puste pola plików są pomijane.
async fn read_multipart(mut multipart: Multipart) -> Result<Vec<(String, FieldValue)>, AppError> {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            tracing::warn!("Odebrano pole multipart bez nazwy, pomijam");
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if filename.is_empty() || bytes.is_empty() {
                    tracing::debug!("Puste pole pliku '{}', pomijam", name);
                    continue;
                }
                tracing::debug!("Plik w polu {}: {} ({} bajtów)", name, filename, bytes.len());
                fields.push((
                    name,
                    FieldValue::File(UploadedFile {
                        filename,
                        content_type,
                        bytes,
                    }),
                ));
            }
            None => {
                let text = field.text().await?;
                fields.push((name, FieldValue::Text(text)));
            }
        }
    }
    Ok(fields)
}

/// Przenumerowuje wszystkie formsety formularza przed wysłaniem do backendu.
///
/// Zwraca pola w kolejności: pola produktu, potem każdy podpięty formset.
/// Formset bez licznika zostaje przekazany bez zmian.
pub fn normalize_formsets(fields: Vec<(String, FieldValue)>) -> (Vec<(String, FieldValue)>, Vec<String>) {
    let mut issues = Vec::new();
    let mut normalized = Vec::new();
    for schema in ALL {
        let mut controller = FormsetController::attach(schema, &fields);
        controller.reindex();
        let Some(state) = controller.detach() else {
            continue;
        };
        tracing::debug!(
            "Formset '{}' po normalizacji: {} bloków",
            schema.prefix,
            state.total_forms()
        );
        issues.extend(
            state
                .validate()
                .into_iter()
                .map(|issue| format!("{}: {}", schema.title, issue)),
        );
        normalized.push(state);
    }

    let mut out: Vec<(String, FieldValue)> = fields
        .into_iter()
        .filter(|(name, _)| !normalized.iter().any(|s| belongs_to(s.prefix(), name)))
        .collect();
    for state in &normalized {
        out.extend(state.to_pairs());
    }
    (out, issues)
}

/// Błąd zapisu: toast dla HTMX, strona z komunikatem przy zwykłym wysłaniu.
fn submission_failed(headers: &HeaderMap, message: String) -> Result<Response, AppError> {
    let notification = Notification::error(message);
    if is_htmx(headers) {
        let mut response_headers = HeaderMap::new();
        deliver(headers, &mut response_headers, &notification, html! {});
        response_headers.insert("HX-Reswap", HeaderValue::from_static("none"));
        return Ok((StatusCode::OK, response_headers).into_response());
    }
    Err(AppError::UnprocessableEntityWithHtml(html! {
        (notification.render_alert())
        a href="javascript:history.back()" ."text-pink-600 underline" { "Wróć do formularza" }
    }))
}

fn insert_json_header(headers: &mut HeaderMap, name: &'static str, value: serde_json::Value) {
    match HeaderValue::from_str(&value.to_string()) {
        Ok(val) => {
            headers.insert(name, val);
        }
        Err(e) => tracing::warn!("Nie można ustawić nagłówka {}: {}", name, e),
    }
}

pub async fn save_product_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, AppError> {
    tracing::info!("Obsłużono zapytanie POST /admin/productos/guardar");
    let fields = read_multipart(multipart).await?;
    process_submission(&app_state, &headers, &jar, fields).await
}

async fn process_submission(
    app_state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
    fields: Vec<(String, FieldValue)>,
) -> Result<Response, AppError> {
    let mode = SubmitMode::from_fields(
        fields
            .iter()
            .filter(|(_, v)| matches!(v, FieldValue::Text(_)))
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );
    let csrf = CsrfToken::from_fields(
        fields
            .iter()
            .filter(|(_, v)| matches!(v, FieldValue::Text(_)))
            .map(|(k, v)| (k.as_str(), v.as_str())),
    )
    .or_else(|| CsrfToken::from_cookies(jar));

    let product_id = match fields
        .iter()
        .find(|(k, _)| k == "producto_id")
        .map(|(_, v)| v.as_str().trim())
    {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            AppError::BadRequest(format!("Nieprawidłowy identyfikator produktu: '{}'", raw))
        })?),
    };

    let (fields, issues) = normalize_formsets(fields);
    if !issues.is_empty() {
        tracing::info!("Formularz produktu odrzucony przed wysłaniem: {:?}", issues);
        return submission_failed(headers, issues.join("; "));
    }

    let outcome = match app_state
        .product_client
        .submit(fields, product_id, mode, csrf.as_ref())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Zapis produktu {:?} nie powiódł się: {}", product_id, e);
            return submission_failed(headers, e.to_string());
        }
    };

    let htmx = is_htmx(headers);
    match (outcome, mode) {
        (SubmitOutcome::Redirect(target), _) => {
            if htmx {
                let mut response_headers = HeaderMap::new();
                if let Ok(val) = HeaderValue::from_str(target.as_str()) {
                    response_headers.insert("HX-Redirect", val);
                }
                Ok((StatusCode::OK, response_headers).into_response())
            } else {
                Ok(Redirect::to(target.as_str()).into_response())
            }
        }
        (
            SubmitOutcome::Saved {
                message,
                producto_id,
            },
            SubmitMode::ApplyChanges,
        ) => {
            let notification =
                Notification::success(message.unwrap_or_else(|| "Zmiany zostały zapisane".to_string()));
            let mut response_headers = HeaderMap::new();
            let body = deliver(headers, &mut response_headers, &notification, html! {});
            if let Some(id) = producto_id {
                let path = edit_page_path(id);
                if product_id.is_none() {
                    if let Ok(val) = HeaderValue::from_str(&path) {
                        response_headers.insert("HX-Replace-Url", val);
                    }
                }
                // Formsety trzeba wczytać od nowa: nowe bloki mają już identyfikatory z backendu.
                insert_json_header(
                    &mut response_headers,
                    "HX-Location",
                    json!({ "path": path, "target": "#content", "swap": "innerHTML" }),
                );
                if !htmx {
                    return Ok(Redirect::to(&edit_page_path(id)).into_response());
                }
            }
            Ok((StatusCode::OK, response_headers, body).into_response())
        }
        (SubmitOutcome::Saved { producto_id, .. }, SubmitMode::SaveAndExit) => {
            let target = producto_id
                .map(edit_page_path)
                .unwrap_or_else(|| "/admin/productos/nuevo".to_string());
            if htmx {
                let mut response_headers = HeaderMap::new();
                if let Ok(val) = HeaderValue::from_str(&target) {
                    response_headers.insert("HX-Redirect", val);
                }
                Ok((StatusCode::OK, response_headers).into_response())
            } else {
                Ok(Redirect::to(&target).into_response())
            }
        }
    }
}
