// src/errors.rs

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use maud::Markup;
use serde_json::json;
use thiserror::Error;

use crate::marcas::MarcaError;
use crate::products::ProductError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Nie znaleziono zasobu")]
    NotFound,

    #[error("Nieprawidłowe dane wejściowe: {0}")]
    UnprocessableEntity(String),

    #[error("Wewnętrzny błąd serwera")]
    InternalServerError(String),

    #[error("Niepoprawne żądanie")]
    BadRequest(String),

    #[error("Błąd usługi marek: {0}")]
    Marca(#[from] MarcaError),

    #[error("Błąd usługi produktów: {0}")]
    Product(#[from] ProductError),

    #[error("Nieprawidłowe dane formularza")]
    UnprocessableEntityWithHtml(Markup),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Nie znaleziono zasobu".to_string()),
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            AppError::InternalServerError(message) => {
                tracing::error!("Wewnętrzny błąd serwera: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Marca(e) => {
                tracing::error!("Błąd usługi marek: {:?}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::Product(e) => {
                tracing::error!("Błąd usługi produktów: {:?}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::UnprocessableEntityWithHtml(markup) => {
                return (StatusCode::UNPROCESSABLE_ENTITY, markup).into_response();
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        tracing::error!("Błąd przetwarzania Multipart: {:?}", err);
        AppError::UnprocessableEntity(format!("Błąd przetwarzania danych formularza: {}", err))
    }
}
