// src/htmx_handlers.rs

use std::sync::Arc;

use axum::{
    Form,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use maud::{Markup, html};
use serde::Deserialize;

use crate::csrf::{CSRF_FIELD, CsrfToken};
use crate::errors::AppError;
use crate::formset::naming::is_truthy;
use crate::formset::render::{
    render_added_block, render_block, render_exclusive_flags, render_formset,
};
use crate::formset::{FieldValue, FormsetController, FormsetState, RemoveOutcome, schema_for};
use crate::marcas::filter_marcas;
use crate::models::{Categoria, Marca, ProductFields, value_to_form_string};
use crate::notify::{Notification, deliver};
use crate::products::{APPLY_CHANGES_FIELD, REDIRECT_FIELD};
use crate::state::AppState;

pub const MARCA_PANEL_ID: &str = "marca-panel";
pub const MARCA_SELECT_WRAPPER_ID: &str = "marca-select-wrapper";

#[derive(Debug, Deserialize, Default)]
pub struct MarcaSearchParams {
    #[serde(default)]
    pub q: String,
}

fn to_field_values(fields: Vec<(String, String)>) -> Vec<(String, FieldValue)> {
    fields
        .into_iter()
        .map(|(k, v)| (k, FieldValue::Text(v)))
        .collect()
}

fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Podpina kontroler formsetu do przesłanego formularza; nieznany prefiks to 404.
fn attach_controller(prefix: &str, fields: Vec<(String, String)>) -> Result<FormsetController, AppError> {
    let schema = schema_for(prefix).ok_or_else(|| {
        tracing::warn!("Nieznany prefiks formsetu: {}", prefix);
        AppError::NotFound
    })?;
    Ok(FormsetController::attach(schema, &to_field_values(fields)))
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

// --- Formsety ---

pub async fn formset_add_htmx_handler(
    Path(prefix): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let mut controller = attach_controller(&prefix, fields)?;
    let Some(block) = controller.add_block().cloned() else {
        return Ok(no_content());
    };
    let Some(state) = controller.state() else {
        return Ok(no_content());
    };
    Ok(render_added_block(state, &block).into_response())
}

pub async fn formset_remove_htmx_handler(
    Path((prefix, index)): Path<(String, usize)>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let mut controller = attach_controller(&prefix, fields)?;
    let outcome = controller.remove_block(index);
    let Some(state) = controller.state() else {
        return Ok(no_content());
    };
    match outcome {
        RemoveOutcome::Removed => Ok(render_formset(state).into_response()),
        RemoveOutcome::MarkedForDeletion => match state.block(index) {
            Some(block) => Ok(render_block(state, block).into_response()),
            None => Err(AppError::NotFound),
        },
        RemoveOutcome::NotFound => Err(AppError::NotFound),
        RemoveOutcome::Disabled => Ok(no_content()),
    }
}

pub async fn formset_restore_htmx_handler(
    Path((prefix, index)): Path<(String, usize)>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let mut controller = attach_controller(&prefix, fields)?;
    controller.restore_block(index);
    let Some(state) = controller.state() else {
        return Ok(no_content());
    };
    let block = state.block(index).ok_or(AppError::NotFound)?;
    Ok(render_block(state, block).into_response())
}

/// Zmiana flagi zdjęcia głównego. Stan pola klikniętego bloku przychodzi w formularzu.
pub async fn formset_principal_htmx_handler(
    Path((prefix, index)): Path<(String, usize)>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let flag = schema_for(&prefix)
        .and_then(|s| s.exclusive_flag)
        .ok_or(AppError::NotFound)?;
    let checked = field(&fields, &format!("{}-{}-{}", prefix, index, flag))
        .is_some_and(is_truthy);

    let mut controller = attach_controller(&prefix, fields)?;
    if !controller.is_attached() {
        return Ok(no_content());
    }
    if !controller.set_exclusive(index, checked) {
        return Err(AppError::NotFound);
    }
    match controller.state() {
        Some(state) => Ok(render_exclusive_flags(state).into_response()),
        None => Ok(no_content()),
    }
}

// --- Marki ---

fn csrf_from(fields: &[(String, String)], jar: &CookieJar) -> Option<CsrfToken> {
    CsrfToken::from_fields(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .or_else(|| CsrfToken::from_cookies(jar))
}

fn selected_marca(fields: &[(String, String)]) -> Option<i64> {
    field(fields, "marca").and_then(|v| v.trim().parse().ok())
}

/// Panel marek po zmianie: zawsze budowany od nowa z aktualnej listy.
async fn reload_panel(
    app_state: &AppState,
    query: &str,
    csrf: Option<&CsrfToken>,
    selected: Option<i64>,
) -> Result<Markup, Notification> {
    let marcas = app_state
        .marca_client
        .list()
        .await
        .map_err(|e| Notification::error(e.to_string()))?;
    let visible = filter_marcas(&marcas, query);
    Ok(html! {
        (render_marca_panel(&visible, query, csrf))
        (render_marca_select(&marcas, selected, true))
    })
}

fn with_notification(
    request_headers: &HeaderMap,
    notification: &Notification,
    body: Markup,
) -> Response {
    let mut response_headers = HeaderMap::new();
    let body = deliver(request_headers, &mut response_headers, notification, body);
    (response_headers, body).into_response()
}

pub async fn marca_panel_htmx_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<MarcaSearchParams>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let csrf = CsrfToken::from_cookies(&jar);
    match app_state.marca_client.list().await {
        Ok(marcas) => {
            let visible = filter_marcas(&marcas, &params.q);
            Ok(render_marca_panel(&visible, &params.q, csrf.as_ref()).into_response())
        }
        Err(e) => {
            tracing::error!("Nie można pobrać listy marek: {}", e);
            Ok(with_notification(
                &headers,
                &Notification::error(e.to_string()),
                render_marca_panel(&[], &params.q, csrf.as_ref()),
            ))
        }
    }
}

pub async fn create_marca_htmx_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let csrf = csrf_from(&fields, &jar);
    let nombre = field(&fields, "nombre").unwrap_or_default();
    let query = field(&fields, "q").unwrap_or_default();

    let (notification, selected) = match app_state.marca_client.create(nombre, csrf.as_ref()).await {
        Ok(created) if created.existed => (
            Notification::info(format!(
                "Marka '{}' już istnieje i została wybrana",
                created.nombre
            )),
            Some(created.id),
        ),
        Ok(created) => (
            Notification::success(format!("Dodano markę '{}'", created.nombre)),
            Some(created.id),
        ),
        Err(e) => {
            tracing::warn!("Nie udało się utworzyć marki '{}': {}", nombre, e);
            (Notification::error(e.to_string()), selected_marca(&fields))
        }
    };

    match reload_panel(&app_state, query, csrf.as_ref(), selected).await {
        Ok(body) => Ok(with_notification(&headers, &notification, body)),
        Err(reload_error) => Ok(with_notification(
            &headers,
            &reload_error,
            render_marca_panel(&[], query, csrf.as_ref()),
        )),
    }
}

pub async fn delete_marca_htmx_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<MarcaSearchParams>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let csrf = csrf_from(&fields, &jar);
    let current = selected_marca(&fields);

    let (notification, selected) = match app_state.marca_client.delete(id, csrf.as_ref()).await {
        Ok(message) => (
            Notification::success(message.unwrap_or_else(|| "Marka została usunięta".to_string())),
            current.filter(|selected| *selected != id),
        ),
        Err(e) => {
            tracing::warn!("Nie udało się usunąć marki {}: {}", id, e);
            (Notification::error(e.to_string()), current)
        }
    };

    match reload_panel(&app_state, &params.q, csrf.as_ref(), selected).await {
        Ok(body) => Ok(with_notification(&headers, &notification, body)),
        Err(reload_error) => Ok(with_notification(
            &headers,
            &reload_error,
            render_marca_panel(&[], &params.q, csrf.as_ref()),
        )),
    }
}

/// Wybór marki z panelu: podmienia pole wyboru w formularzu produktu.
pub async fn select_marca_htmx_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (notification, body) = match app_state.marca_client.list().await {
        Ok(marcas) => {
            let marca = marcas.iter().find(|m| m.id == id).ok_or(AppError::NotFound)?;
            (
                Notification::info(format!("Wybrano markę '{}'", marca.nombre)),
                render_marca_select(&marcas, Some(id), true),
            )
        }
        Err(e) => {
            tracing::warn!("Nie udało się pobrać listy marek: {}", e);
            (Notification::error(e.to_string()), html! {})
        }
    };
    let mut response = with_notification(&headers, &notification, body);
    response
        .headers_mut()
        .insert("HX-Reswap", HeaderValue::from_static("none"));
    Ok(response)
}

// --- Renderowanie ---

pub fn render_marca_select(marcas: &[Marca], selected: Option<i64>, oob: bool) -> Markup {
    html! {
        div id=(MARCA_SELECT_WRAPPER_ID) hx-swap-oob=[oob.then_some("true")] {
            label for="id_marca" ."block text-sm font-medium text-gray-700 mb-1" { "Marka" }
            select name="marca" id="id_marca" class="admin-filter-select" {
                option value="" selected[selected.is_none()] { "Wybierz markę" }
                @for marca in marcas {
                    option value=(marca.id) selected[selected == Some(marca.id)] { (marca.nombre) }
                }
            }
        }
    }
}

pub fn render_marca_panel(marcas: &[&Marca], query: &str, csrf: Option<&CsrfToken>) -> Markup {
    let panel_target = format!("#{}", MARCA_PANEL_ID);
    let include = format!("#{}, #id_marca", MARCA_PANEL_ID);
    html! {
        div id=(MARCA_PANEL_ID) class="marca-panel bg-white border rounded-lg p-4" {
            h4 ."text-lg font-semibold text-gray-700 mb-3" { "Marki" }
            @if let Some(token) = csrf {
                input type="hidden" name=(CSRF_FIELD) value=(token.as_str());
            }
            input type="search" name="q" value=(query) placeholder="Szukaj marki..."
                  hx-get="/htmx/admin/marcas"
                  hx-trigger="input changed delay:300ms, search"
                  hx-target=(panel_target)
                  hx-swap="outerHTML"
                  class="admin-filter-input mb-3";
            div ."flex gap-2 mb-3" {
                input type="text" name="nombre" maxlength="100" placeholder="Nazwa nowej marki"
                      class="admin-filter-input flex-1";
                button type="button"
                       hx-post="/htmx/admin/marcas"
                       hx-include=(include)
                       hx-target=(panel_target)
                       hx-swap="outerHTML"
                       class="px-3 py-1.5 text-sm text-white bg-pink-600 rounded-md hover:bg-pink-700" {
                    "Dodaj markę"
                }
            }
            @if marcas.is_empty() {
                p ."marca-empty text-sm text-gray-500" {
                    @if query.trim().is_empty() { "Brak marek" } @else { "Brak marek pasujących do wyszukiwania" }
                }
            } @else {
                ul ."marca-list divide-y" {
                    @for marca in marcas {
                        li ."flex items-center justify-between py-2" "data-marca-id"=(marca.id) {
                            span {
                                (marca.nombre)
                                span ."ml-2 text-xs text-gray-500" { "(" (marca.productos_count) ")" }
                            }
                            div ."flex gap-2" {
                                button type="button"
                                       hx-post=(format!("/htmx/admin/marcas/{}/wybierz", marca.id))
                                       hx-swap="none"
                                       class="btn-usar px-2 py-1 text-xs text-pink-700 border border-pink-300 rounded-md" {
                                    "Użyj"
                                }
                                @if marca.can_delete() {
                                    button type="button"
                                           hx-post=(format!("/htmx/admin/marcas/{}/eliminar?q={}", marca.id, urlencoding::encode(query)))
                                           hx-include=(include)
                                           hx-target=(panel_target)
                                           hx-swap="outerHTML"
                                           hx-confirm=(format!("Usunąć markę '{}'?", marca.nombre))
                                           class="btn-eliminar px-2 py-1 text-xs text-white bg-red-600 rounded-md" {
                                        "Usuń"
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Dane potrzebne do wyrenderowania formularza produktu.
pub struct ProductFormView<'a> {
    pub product_id: Option<i64>,
    pub producto: &'a ProductFields,
    pub categorias: &'a [Categoria],
    pub marcas: &'a [Marca],
    pub imagenes: &'a FormsetState,
    pub tallas: &'a FormsetState,
    pub csrf: Option<&'a CsrfToken>,
}

pub fn render_product_form_maud(view: &ProductFormView<'_>) -> Markup {
    let producto = view.producto;
    let title = if view.product_id.is_some() {
        "Edycja produktu"
    } else {
        "Nowy produkt"
    };
    let all_marcas: Vec<&Marca> = view.marcas.iter().collect();

    html! {
        div id="product-editor" class="grid grid-cols-1 lg:grid-cols-3 gap-6" {
            form id="product-form" method="post" action="/admin/productos/guardar"
                 enctype="multipart/form-data"
                 hx-post="/admin/productos/guardar"
                 hx-swap="none"
                 class="lg:col-span-2 space-y-6 bg-white p-6 rounded-lg shadow" {
                h2 ."text-2xl font-semibold text-gray-800" { (title) }
                @if let Some(token) = view.csrf {
                    input type="hidden" name=(CSRF_FIELD) value=(token.as_str());
                }
                input type="hidden" name="producto_id"
                      value=(view.product_id.map(|id| id.to_string()).unwrap_or_default());

                div ."form-group" {
                    label for="id_nombre" ."block text-sm font-medium text-gray-700 mb-1" { "Nazwa" }
                    input type="text" name="nombre" id="id_nombre" value=(producto.nombre) required maxlength="200" class="admin-filter-input";
                }
                div ."form-group" {
                    label for="id_descripcion" ."block text-sm font-medium text-gray-700 mb-1" { "Opis" }
                    textarea name="descripcion" id="id_descripcion" rows="4" class="admin-filter-input" { (producto.descripcion) }
                }
                div ."grid grid-cols-2 gap-4" {
                    div ."form-group" {
                        label for="id_precio" ."block text-sm font-medium text-gray-700 mb-1" { "Cena" }
                        input type="number" name="precio" id="id_precio" step="0.01" min="0"
                              value=(value_to_form_string(&producto.precio)) class="admin-filter-input";
                    }
                    div ."form-group" {
                        label for="id_stock" ."block text-sm font-medium text-gray-700 mb-1" { "Stan magazynowy" }
                        input type="number" name="stock" id="id_stock" min="0" value=(producto.stock) class="admin-filter-input";
                    }
                }
                div ."grid grid-cols-2 gap-4" {
                    div ."form-group" {
                        label for="id_categoria" ."block text-sm font-medium text-gray-700 mb-1" { "Kategoria" }
                        select name="categoria" id="id_categoria" class="admin-filter-select" {
                            option value="" selected[producto.categoria.is_none()] { "Wybierz kategorię" }
                            @for categoria in view.categorias {
                                option value=(categoria.id) selected[producto.categoria == Some(categoria.id)] { (categoria.nombre) }
                            }
                        }
                    }
                    div ."form-group" {
                        (render_marca_select(view.marcas, producto.marca, false))
                    }
                }
                div ."form-check" {
                    input type="checkbox" name="disponible" id="id_disponible" checked[producto.disponible]
                          class="h-4 w-4 rounded border-gray-300 text-pink-600";
                    label for="id_disponible" ."ml-2 text-sm text-gray-700" { "Dostępny" }
                }

                (render_formset(view.imagenes))
                (render_formset(view.tallas))

                div ."flex justify-end gap-3 pt-4 border-t" {
                    button type="submit" name=(APPLY_CHANGES_FIELD) value="true"
                           class="px-4 py-2 text-sm font-medium text-pink-700 border border-pink-300 rounded-lg hover:bg-pink-50" {
                        "Zastosuj zmiany"
                    }
                    button type="submit" name=(REDIRECT_FIELD) value="true"
                           class="px-4 py-2 text-sm font-medium text-white bg-pink-600 rounded-lg hover:bg-pink-700" {
                        "Zapisz i wyjdź"
                    }
                }
            }
            aside {
                (render_marca_panel(&all_marcas, "", view.csrf))
            }
        }
    }
}
