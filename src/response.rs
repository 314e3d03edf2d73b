// src/response.rs

use std::path::Path;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use lol_html::html_content::ContentType;
use lol_html::{HtmlRewriter, Settings, element};
use maud::Markup;
use tokio::fs;

use crate::errors::AppError;
use crate::notify::is_htmx;

/// Wczytuje szablon panelu i wstawia treść w miejsce `#content`.
/// Atrybuty HTMX ładujące treść po starcie strony są usuwane, bo treść jest już na miejscu.
async fn serve_full_page(shell: &Path, content_markup: Markup) -> Result<Response, AppError> {
    let shell_content = fs::read(shell).await.map_err(|e| {
        tracing::error!("Nie można wczytać pliku szablonu {}: {}", shell.display(), e);
        AppError::InternalServerError("Błąd wczytywania szablonu strony".to_string())
    })?;

    let content_string = content_markup.into_string();
    let mut response_body = Vec::new();

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("#content", |el| {
                el.set_inner_content(&content_string, ContentType::Html);
                el.remove_attribute("hx-trigger");
                el.remove_attribute("hx-get");
                Ok(())
            })],
            ..Settings::default()
        },
        |c: &[u8]| response_body.extend_from_slice(c),
    );

    rewriter
        .write(&shell_content)
        .and_then(|_| rewriter.end())
        .map_err(|e| {
            tracing::error!("Błąd przetwarzania szablonu {}: {}", shell.display(), e);
            AppError::InternalServerError("Błąd budowania strony".to_string())
        })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Body::from(response_body),
    )
        .into_response())
}

/// Fragment dla HTMX, pełna strona przy zwykłej nawigacji (np. F5).
pub async fn build_response(
    headers: &HeaderMap,
    shell: &Path,
    page_content: Markup,
) -> Result<Response, AppError> {
    if is_htmx(headers) {
        Ok(page_content.into_response())
    } else {
        serve_full_page(shell, page_content).await
    }
}
