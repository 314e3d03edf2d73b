// src/formset/binding.rs

use std::collections::BTreeMap;

use thiserror::Error;

use super::naming::{
    DELETE_FIELD, FieldName, INITIAL_FORMS, MAX_NUM_FORMS, MIN_NUM_FORMS, TOTAL_FORMS, is_truthy,
    management_name,
};
use super::schema::FormsetSchema;
use super::state::{FieldValue, FormBlock, FormsetState, ManagementForm};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("Brak pola licznika '{0}'")]
    MissingManagementForm(String),

    #[error("Nieprawidłowa wartość pola '{name}': '{value}'")]
    InvalidManagementValue { name: String, value: String },
}

/// Czy pole należy do formsetu o danym prefiksu (blok lub formularz zarządzający).
pub fn belongs_to(prefix: &str, name: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('-'))
}

fn lookup<'a>(pairs: &'a [(String, FieldValue)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn management_value(
    pairs: &[(String, FieldValue)],
    prefix: &str,
    key: &str,
    default: usize,
) -> Result<usize, BindError> {
    let name = management_name(prefix, key);
    match lookup(pairs, &name) {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| BindError::InvalidManagementValue {
                name,
                value: v.to_string(),
            }),
    }
}

/// Odtwarza stan formsetu z przesłanych par nazwa/wartość (w kolejności z DOM).
///
/// Bloki wyznaczają ciągi pól o tym samym indeksie, więc dwa bloki, które
/// przypadkiem dostały ten sam indeks, pozostają osobnymi blokami. Na końcu
/// zawsze wykonywane jest `reindex`.
pub fn bind(
    schema: &'static FormsetSchema,
    pairs: &[(String, FieldValue)],
) -> Result<FormsetState, BindError> {
    let prefix = schema.prefix;
    let total_name = management_name(prefix, TOTAL_FORMS);
    let Some(total_raw) = lookup(pairs, &total_name) else {
        return Err(BindError::MissingManagementForm(total_name));
    };
    let declared_total: usize =
        total_raw
            .trim()
            .parse()
            .map_err(|_| BindError::InvalidManagementValue {
                name: total_name.clone(),
                value: total_raw.to_string(),
            })?;

    let management = ManagementForm {
        total_forms: declared_total,
        initial_forms: management_value(pairs, prefix, INITIAL_FORMS, 0)?,
        min_num: management_value(pairs, prefix, MIN_NUM_FORMS, schema.min_num)?,
        max_num: management_value(pairs, prefix, MAX_NUM_FORMS, schema.max_num)?,
    };

    // DELETE zamyka blok, a powtórzone pole otwiera kolejny blok o tym samym indeksie.
    let mut runs: Vec<(usize, BTreeMap<String, FieldValue>, Option<bool>)> = Vec::new();
    for (name, value) in pairs {
        let Some(parsed) = FieldName::parse(prefix, name) else {
            continue;
        };
        let starts_new_run = runs.last().is_none_or(|(idx, fields, delete)| {
            *idx != parsed.index || delete.is_some() || fields.contains_key(parsed.field)
        });
        if starts_new_run {
            runs.push((parsed.index, BTreeMap::new(), None));
        }
        let Some((_, fields, delete)) = runs.last_mut() else {
            continue;
        };
        if parsed.field == DELETE_FIELD {
            *delete = Some(is_truthy(value.as_str()));
        } else {
            fields.insert(parsed.field.to_string(), value.clone());
        }
    }

    let mut blocks = Vec::with_capacity(runs.len());
    for (index, fields, delete) in runs {
        let delete = delete.unwrap_or(false);
        let block = FormBlock::new(index, fields, delete);
        if delete && !block.is_persisted() {
            tracing::debug!(
                "Pomijam niezapisany blok {}-{} oznaczony do usunięcia",
                prefix,
                index
            );
            continue;
        }
        blocks.push(block);
    }

    if declared_total != blocks.len() {
        tracing::debug!(
            "Licznik {} = {}, ale znaleziono {} bloków; naprawiam przez reindex",
            total_name,
            declared_total,
            blocks.len()
        );
    }

    let mut state = FormsetState::from_parts(schema, blocks, management);
    state.reindex();
    Ok(state)
}
