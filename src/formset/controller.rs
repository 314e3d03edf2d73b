// src/formset/controller.rs

use super::binding::bind;
use super::schema::FormsetSchema;
use super::state::{FieldValue, FormBlock, FormsetState, RemoveOutcome};

/// Zarządca indeksów jednego formsetu.
///
/// Kontroler jest podpinany (`attach`) do konkretnego formularza przy
/// konstrukcji i oddaje końcowy stan przy `detach`. Gdy strona nie ma licznika
/// dla prefiksu, kontroler jest odpięty: każda operacja jest zalogowanym no-opem.
#[derive(Debug)]
pub struct FormsetController {
    schema: &'static FormsetSchema,
    state: Option<FormsetState>,
}

impl FormsetController {
    /// Podpina kontroler do przesłanego formularza.
    pub fn attach(schema: &'static FormsetSchema, pairs: &[(String, FieldValue)]) -> Self {
        match bind(schema, pairs) {
            Ok(state) => Self {
                schema,
                state: Some(state),
            },
            Err(e) => {
                tracing::warn!(
                    "Formset '{}' wyłączony, nie można go podpiąć: {}",
                    schema.prefix,
                    e
                );
                Self {
                    schema,
                    state: None,
                }
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&FormsetState> {
        self.state.as_ref()
    }

    fn attached_mut(&mut self, operation: &str) -> Option<&mut FormsetState> {
        if self.state.is_none() {
            tracing::warn!(
                "Operacja '{}' pominięta: formset '{}' nie jest podpięty",
                operation,
                self.schema.prefix
            );
        }
        self.state.as_mut()
    }

    pub fn add_block(&mut self) -> Option<&FormBlock> {
        let prefix = self.schema.prefix;
        let state = self.attached_mut("add")?;
        let block = state.add_block();
        tracing::debug!("Dodano blok {}-{}", prefix, block.index());
        Some(block)
    }

    pub fn remove_block(&mut self, index: usize) -> RemoveOutcome {
        let prefix = self.schema.prefix;
        let Some(state) = self.attached_mut("remove") else {
            return RemoveOutcome::Disabled;
        };
        let outcome = state.remove_block(index);
        match outcome {
            RemoveOutcome::NotFound => {
                tracing::warn!("Brak bloku {}-{} do usunięcia", prefix, index)
            }
            _ => tracing::debug!("Blok {}-{}: {:?}", prefix, index, outcome),
        }
        outcome
    }

    pub fn restore_block(&mut self, index: usize) -> bool {
        let prefix = self.schema.prefix;
        let Some(state) = self.attached_mut("restore") else {
            return false;
        };
        let restored = state.restore_block(index);
        if !restored {
            tracing::debug!("Blok {}-{} nie był oznaczony do usunięcia", prefix, index);
        }
        restored
    }

    /// Zaznacza lub odznacza flagę wyłączną schematu w bloku `index`.
    pub fn set_exclusive(&mut self, index: usize, checked: bool) -> bool {
        let Some(field) = self.schema.exclusive_flag else {
            tracing::warn!("Formset '{}' nie ma flagi wyłącznej", self.schema.prefix);
            return false;
        };
        let Some(state) = self.attached_mut("exclusive") else {
            return false;
        };
        state.set_exclusive(field, index, checked)
    }

    pub fn reindex(&mut self) {
        if let Some(state) = self.attached_mut("reindex") {
            state.reindex();
        }
    }

    /// Odpina kontroler, zwracając końcowy stan.
    pub fn detach(self) -> Option<FormsetState> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formset::schema::{IMAGENES, TALLAS};

    fn form(raw: &[(&str, &str)]) -> Vec<(String, FieldValue)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), FieldValue::text(*v)))
            .collect()
    }

    #[test]
    fn detached_controller_is_a_no_op() {
        let mut controller = FormsetController::attach(&IMAGENES, &form(&[("nombre", "x")]));
        assert!(!controller.is_attached());
        assert!(controller.add_block().is_none());
        assert_eq!(controller.remove_block(0), RemoveOutcome::Disabled);
        assert!(!controller.restore_block(0));
        assert!(!controller.set_exclusive(0, true));
        controller.reindex();
        assert!(controller.detach().is_none());
    }

    #[test]
    fn persisted_scenario_keeps_indices_and_appends() {
        let mut controller = FormsetController::attach(
            &IMAGENES,
            &form(&[
                ("imagenes-TOTAL_FORMS", "3"),
                ("imagenes-INITIAL_FORMS", "3"),
                ("imagenes-0-id", "1"),
                ("imagenes-1-id", "2"),
                ("imagenes-2-id", "3"),
            ]),
        );

        assert_eq!(controller.remove_block(1), RemoveOutcome::MarkedForDeletion);
        let added = controller.add_block().map(FormBlock::index);
        assert_eq!(added, Some(3));

        let state = controller.detach().unwrap();
        assert_eq!(state.total_forms(), 4);
        assert!(state.blocks()[1].is_marked_for_deletion());
        let indices: Vec<usize> = state.blocks().iter().map(FormBlock::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn new_blocks_scenario_collapses() {
        let mut controller = FormsetController::attach(
            &IMAGENES,
            &form(&[
                ("imagenes-TOTAL_FORMS", "2"),
                ("imagenes-0-titulo", "pierwszy"),
                ("imagenes-1-titulo", "drugi"),
            ]),
        );
        assert_eq!(controller.remove_block(0), RemoveOutcome::Removed);
        let state = controller.detach().unwrap();
        assert_eq!(state.total_forms(), 1);
        assert_eq!(state.blocks()[0].index(), 0);
        assert_eq!(state.blocks()[0].value("titulo"), "drugi");
    }

    #[test]
    fn exclusive_flag_requires_schema_support() {
        let mut controller = FormsetController::attach(
            &TALLAS,
            &form(&[("tallas-TOTAL_FORMS", "1"), ("tallas-0-talla", "M")]),
        );
        assert!(!controller.set_exclusive(0, true));

        let mut images = FormsetController::attach(
            &IMAGENES,
            &form(&[("imagenes-TOTAL_FORMS", "1"), ("imagenes-0-orden", "0")]),
        );
        assert!(images.set_exclusive(0, true));
        assert!(images.state().unwrap().blocks()[0].is_checked("es_principal"));
    }
}
