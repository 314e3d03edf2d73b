// src/notify.rs

use axum::http::{HeaderMap, HeaderValue};
use maud::{Markup, html};
use serde_json::json;
use strum_macros::AsRefStr;

/// Typ powiadomienia, zgodny z nazwami klas/typów używanych przez toasty w szablonie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
        }
    }

    /// Wartość nagłówka `HX-Trigger` wywołującego toast `showMessage` po stronie klienta.
    pub fn hx_trigger(&self) -> Option<HeaderValue> {
        let payload = json!({
            "showMessage": {
                "message": self.message,
                "type": self.kind.as_ref(),
            }
        });
        HeaderValue::from_str(&ascii_json(&payload.to_string())).ok()
    }

    /// Zastępczy komunikat w treści strony, gdy toast nie jest dostępny.
    pub fn render_alert(&self) -> Markup {
        let class = match self.kind {
            NotificationKind::Success => "bg-green-50 text-green-800 border-green-300",
            NotificationKind::Error => "bg-red-50 text-red-800 border-red-300",
            NotificationKind::Info => "bg-blue-50 text-blue-800 border-blue-300",
        };
        html! {
            div role="alert" class=(format!("notification notification-{} border rounded-lg p-3 text-sm {}", self.kind.as_ref(), class)) {
                (self.message)
            }
        }
    }
}

/// Czy żądanie pochodzi od HTMX (a więc strona ma obsługę toastów).
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("HX-Request")
}

/// Dostarcza powiadomienie: toast przez `HX-Trigger` dla żądań HTMX, w przeciwnym
/// razie komunikat trafia do treści. Zwraca treść do wyrenderowania.
pub fn deliver(
    request_headers: &HeaderMap,
    response_headers: &mut HeaderMap,
    notification: &Notification,
    body: Markup,
) -> Markup {
    if is_htmx(request_headers) {
        if let Some(value) = notification.hx_trigger() {
            response_headers.insert("HX-Trigger", value);
            return body;
        }
        tracing::warn!("Nie można zakodować powiadomienia w nagłówku HX-Trigger");
    }
    html! {
        (notification.render_alert())
        (body)
    }
}

/// Nagłówki HTTP dopuszczają tylko widoczne ASCII, więc znaki spoza ASCII
/// (polskie litery w komunikatach) zamieniamy na sekwencje `\uXXXX`.
fn ascii_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
