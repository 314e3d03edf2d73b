// src/formset/render.rs

use maud::{Markup, html};

use super::naming::{DELETE_FIELD, FieldName, management_id};
use super::schema::{FieldKind, FieldSpec};
use super::state::{FormBlock, FormsetState};

pub fn section_id(prefix: &str) -> String {
    format!("{}-formset", prefix)
}

pub fn container_id(prefix: &str) -> String {
    format!("{}-container", prefix)
}

pub fn block_id(prefix: &str, index: usize) -> String {
    format!("{}-block-{}", prefix, index)
}

fn management_wrapper_id(prefix: &str) -> String {
    format!("{}-management", prefix)
}

fn action_url(prefix: &str, action: &str, index: usize) -> String {
    format!("/htmx/admin/formset/{}/{}/{}", prefix, action, index)
}

/// Ukryte pola licznika. Przy `oob` fragment podmienia istniejący licznik (hx-swap-oob).
pub fn render_management(state: &FormsetState, oob: bool) -> Markup {
    let prefix = state.prefix();
    html! {
        div id=(management_wrapper_id(prefix)) hx-swap-oob=[oob.then_some("true")] {
            @for (name, value) in state.management().pairs(prefix) {
                @let key = name.rsplit_once('-').map_or(name.as_str(), |(_, k)| k).to_string();
                input type="hidden" name=(name) id=(management_id(prefix, &key)) value=(value);
            }
        }
    }
}

/// Cała sekcja formsetu: nagłówek, licznik, kontener bloków i przycisk dodawania.
pub fn render_formset(state: &FormsetState) -> Markup {
    let schema = state.schema();
    let prefix = schema.prefix;
    html! {
        section id=(section_id(prefix)) class="formset" "data-prefix"=(prefix) {
            h3 ."text-xl font-semibold text-gray-700 mb-4 pb-2 border-b border-gray-200" { (schema.title) }
            (render_management(state, false))
            div id=(container_id(prefix)) class="formset-container space-y-4" {
                @for block in state.blocks() {
                    (render_block(state, block))
                }
            }
            button type="button"
                   hx-post=(format!("/htmx/admin/formset/{}/add", prefix))
                   hx-include="closest form"
                   hx-target=(format!("#{}", container_id(prefix)))
                   hx-swap="beforeend"
                   class="mt-3 px-4 py-2 text-sm font-medium text-pink-600 border border-pink-300 rounded-lg hover:bg-pink-50" {
                (schema.add_label)
            }
        }
    }
}

/// Odpowiedź na dodanie bloku: nowy blok plus licznik podmieniany out-of-band.
pub fn render_added_block(state: &FormsetState, block: &FormBlock) -> Markup {
    html! {
        (render_block(state, block))
        (render_management(state, true))
    }
}

/// Pola flagi wyłącznej wszystkich bloków jako podmiany out-of-band.
pub fn render_exclusive_flags(state: &FormsetState) -> Markup {
    let Some(field) = state.schema().exclusive_flag else {
        return html! {};
    };
    let Some(spec) = state.schema().field(field) else {
        return html! {};
    };
    html! {
        @for block in state.blocks() {
            (render_checkbox(state, block, spec, true))
        }
    }
}

pub fn render_block(state: &FormsetState, block: &FormBlock) -> Markup {
    let schema = state.schema();
    let prefix = schema.prefix;
    let index = block.index();
    let marked = block.is_marked_for_deletion();
    let persisted = block.is_persisted();

    let mut class = format!("{}-form formset-block relative border rounded-lg p-4", prefix);
    if marked {
        class.push_str(" marked-for-deletion opacity-50");
    }
    if schema
        .exclusive_flag
        .is_some_and(|flag| block.is_checked(flag))
    {
        class.push_str(" is-principal");
    }

    // Nowy blok znika z DOM i zmienia indeksy pozostałych, więc podmieniamy całą sekcję.
    let remove_target = if persisted {
        format!("#{}", block_id(prefix, index))
    } else {
        format!("#{}", section_id(prefix))
    };

    let preview_url = block.value("url");
    let extra_fields: Vec<(&str, &str)> = block
        .fields()
        .filter(|(name, _)| schema.field(name).is_none())
        .map(|(name, value)| (name, value.as_str()))
        .collect();

    html! {
        div id=(block_id(prefix, index)) class=(class) "data-index"=(index) {
            @if !preview_url.is_empty() {
                div ."image-preview mb-3" {
                    img src=(preview_url) alt=(block.value("titulo")) class="w-32 h-32 object-cover rounded-md";
                }
            }
            @for spec in schema.fields {
                (render_field(state, block, spec))
            }
            @for (name, value) in &extra_fields {
                input type="hidden" name=(FieldName::new(prefix, index, name).to_string()) value=(value);
            }
            @let delete = FieldName::new(prefix, index, DELETE_FIELD);
            input type="checkbox" name=(delete.to_string()) id=(delete.html_id()) checked[marked] hidden;

            div ."formset-actions mt-3 flex justify-end" {
                @if marked {
                    span ."text-xs text-red-600 mr-3 self-center" { "Zostanie usunięte po zapisaniu" }
                    button type="button"
                           hx-post=(action_url(prefix, "restore", index))
                           hx-include="closest form"
                           hx-target=(format!("#{}", block_id(prefix, index)))
                           hx-swap="outerHTML"
                           class="btn-restaurar px-3 py-1.5 text-sm text-yellow-800 bg-yellow-100 rounded-md hover:bg-yellow-200" {
                        "Przywróć"
                    }
                } @else {
                    button type="button"
                           hx-post=(action_url(prefix, "remove", index))
                           hx-include="closest form"
                           hx-target=(remove_target)
                           hx-swap="outerHTML"
                           hx-confirm="Czy na pewno usunąć tę pozycję?"
                           class="btn-eliminar px-3 py-1.5 text-sm text-white bg-red-600 rounded-md hover:bg-red-700" {
                        "Usuń"
                    }
                }
            }
        }
    }
}

fn render_field(state: &FormsetState, block: &FormBlock, spec: &FieldSpec) -> Markup {
    let name = FieldName::new(state.prefix(), block.index(), spec.name);
    let id = name.html_id();
    match spec.kind {
        FieldKind::Hidden => html! {
            input type="hidden" name=(name.to_string()) id=(id) value=(block.value(spec.name));
        },
        FieldKind::Checkbox => render_checkbox(state, block, spec, false),
        FieldKind::File => html! {
            div ."form-group" {
                label for=(id) ."block text-sm font-medium text-gray-700 mb-1" { (spec.label) }
                input type="file" name=(name.to_string()) id=(id) accept="image/jpeg,image/png,image/webp" class="form-control";
            }
        },
        FieldKind::Text | FieldKind::Number => html! {
            div ."form-group" {
                label for=(id) ."block text-sm font-medium text-gray-700 mb-1" { (spec.label) }
                input type=(spec.kind.as_ref()) name=(name.to_string()) id=(id)
                      value=(block.value(spec.name))
                      placeholder=[spec.placeholder]
                      min=[(spec.kind == FieldKind::Number).then_some("0")]
                      class="admin-filter-input";
            }
        },
    }
}

fn render_checkbox(state: &FormsetState, block: &FormBlock, spec: &FieldSpec, oob: bool) -> Markup {
    let prefix = state.prefix();
    let name = FieldName::new(prefix, block.index(), spec.name);
    let id = name.html_id();
    let exclusive = state.schema().exclusive_flag == Some(spec.name);
    let checked = block.is_checked(spec.name);

    if exclusive {
        html! {
            input type="checkbox" name=(name.to_string()) id=(id)
                  checked[checked]
                  hx-post=(action_url(prefix, "principal", block.index()))
                  hx-include="closest form"
                  hx-trigger="change"
                  hx-swap="none"
                  hx-swap-oob=[oob.then_some("true")]
                  class="principal-checkbox h-4 w-4 rounded border-gray-300 text-pink-600";
            @if !oob {
                label for=(id) ."ml-2 text-sm text-gray-700" { (spec.label) }
            }
        }
    } else {
        html! {
            div ."form-check" {
                input type="checkbox" name=(name.to_string()) id=(id) checked[checked]
                      class="h-4 w-4 rounded border-gray-300 text-pink-600";
                label for=(id) ."ml-2 text-sm text-gray-700" { (spec.label) }
            }
        }
    }
}
