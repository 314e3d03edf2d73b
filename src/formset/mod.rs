// src/formset/mod.rs
//
// Zarządzanie indeksami formsetów (zdjęcia, rozmiary) formularza produktu.

pub mod binding;
pub mod controller;
pub mod naming;
pub mod render;
pub mod schema;
pub mod state;

pub use binding::belongs_to;
pub use controller::FormsetController;
pub use schema::schema_for;
pub use state::{FieldValue, FormsetState, RemoveOutcome, UploadedFile};
