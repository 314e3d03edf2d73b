// src/csrf.rs

use axum_extra::extract::cookie::CookieJar;
use reqwest::RequestBuilder;

/// Ukryte pole formularza, z którego pobieramy token.
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";
pub const CSRF_HEADER: &str = "X-CSRFToken";
pub const CSRF_COOKIE: &str = "csrftoken";

/// Token CSRF wydany przez backend. Usługa go nie generuje, tylko przekazuje dalej.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Szuka tokenu w przesłanych polach formularza.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<Self> {
        fields
            .into_iter()
            .find(|(name, _)| *name == CSRF_FIELD)
            .and_then(|(_, value)| Self::new(value))
    }

    /// Token z ciasteczka backendu, używany do wypełnienia ukrytego pola przy renderowaniu.
    pub fn from_cookies(jar: &CookieJar) -> Option<Self> {
        jar.get(CSRF_COOKIE).and_then(|c| Self::new(c.value()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dokleja token do żądania wychodzącego: nagłówek i ciasteczko.
    /// Pole formularza dodaje wywołujący, bo zna postać treści żądania.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(CSRF_HEADER, self.as_str())
            .header(
                reqwest::header::COOKIE,
                format!("{}={}", CSRF_COOKIE, self.as_str()),
            )
    }
}

/// Dokleja token, jeśli jest; brak tokenu jest tylko logowany, backend zdecyduje sam.
pub fn with_token(request: RequestBuilder, token: Option<&CsrfToken>) -> RequestBuilder {
    match token {
        Some(token) => token.apply(request),
        None => {
            tracing::warn!("Brak tokenu CSRF w żądaniu do backendu");
            request
        }
    }
}
