// src/formset/state.rs

use std::collections::BTreeMap;

use axum::body::Bytes;

use super::naming::{
    DELETE_FIELD, FieldName, ID_FIELD, INITIAL_FORMS, MAX_NUM_FORMS, MIN_NUM_FORMS, TOTAL_FORMS,
    is_truthy, management_name,
};
use super::schema::{FieldKind, FormsetSchema};

/// Plik przesłany w polu bloku (np. `imagenes-0-imagen`).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    File(UploadedFile),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Text(s) => s,
            FieldValue::File(f) => &f.filename,
        }
    }
}

/// Pojedynczy blok formsetu: pola o wspólnym prefiksie i indeksie.
#[derive(Debug, Clone, PartialEq)]
pub struct FormBlock {
    index: usize,
    fields: BTreeMap<String, FieldValue>,
    marked_for_deletion: bool,
}

impl FormBlock {
    pub(super) fn new(
        index: usize,
        fields: BTreeMap<String, FieldValue>,
        marked_for_deletion: bool,
    ) -> Self {
        Self {
            index,
            fields,
            marked_for_deletion,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Tekstowa wartość pola; brakujące pole to pusty ciąg.
    pub fn value(&self, field: &str) -> &str {
        self.fields.get(field).map_or("", FieldValue::as_str)
    }

    pub fn is_checked(&self, field: &str) -> bool {
        is_truthy(self.value(field))
    }

    /// Blok jest zapisany, jeśli ma niepustą tożsamość w polu `id`.
    pub fn is_persisted(&self) -> bool {
        !self.value(ID_FIELD).trim().is_empty()
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_value(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_string(), value);
    }
}

/// Odpowiednik ukrytych pól `<prefix>-TOTAL_FORMS` i pokrewnych.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagementForm {
    pub total_forms: usize,
    pub initial_forms: usize,
    pub min_num: usize,
    pub max_num: usize,
}

impl ManagementForm {
    pub fn pairs(&self, prefix: &str) -> [(String, String); 4] {
        [
            (management_name(prefix, TOTAL_FORMS), self.total_forms.to_string()),
            (management_name(prefix, INITIAL_FORMS), self.initial_forms.to_string()),
            (management_name(prefix, MIN_NUM_FORMS), self.min_num.to_string()),
            (management_name(prefix, MAX_NUM_FORMS), self.max_num.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Nowy blok usunięty z sekwencji, pozostałe przenumerowane.
    Removed,
    /// Zapisany blok oznaczony do usunięcia przy następnym zapisie.
    MarkedForDeletion,
    NotFound,
    /// Formset niedostępny na stronie (brak licznika).
    Disabled,
}

/// Problemy wykryte przy walidacji formsetu przed wysłaniem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormsetIssue {
    TooFew { min: usize, live: usize },
    TooMany { max: usize, live: usize },
    ExclusiveConflict { field: &'static str, count: usize },
}

impl std::fmt::Display for FormsetIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormsetIssue::TooFew { min, live } => {
                write!(f, "Wymagane co najmniej {} pozycji (jest {})", min, live)
            }
            FormsetIssue::TooMany { max, live } => {
                write!(f, "Dozwolone najwyżej {} pozycji (jest {})", max, live)
            }
            FormsetIssue::ExclusiveConflict { field, count } => {
                write!(f, "Pole '{}' może być zaznaczone tylko raz (jest {})", field, count)
            }
        }
    }
}

/// Uporządkowana lista bloków jednego prefiksu wraz z licznikiem.
///
/// Kolejność bloków to kolejność wyświetlania. Po każdej mutacji
/// `management.total_forms == blocks.len()`, a indeksy tworzą ciąg `0..total_forms`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormsetState {
    schema: &'static FormsetSchema,
    blocks: Vec<FormBlock>,
    management: ManagementForm,
}

impl FormsetState {
    pub fn new(schema: &'static FormsetSchema) -> Self {
        Self {
            schema,
            blocks: Vec::new(),
            management: ManagementForm {
                total_forms: 0,
                initial_forms: 0,
                min_num: schema.min_num,
                max_num: schema.max_num,
            },
        }
    }

    /// Stan nowego formularza: `extra` pustych bloków.
    pub fn with_extra(schema: &'static FormsetSchema) -> Self {
        let mut state = Self::new(schema);
        for _ in 0..schema.extra {
            state.add_block();
        }
        state
    }

    /// Stan formularza edycji zbudowany z rekordów zapisanych w backendzie.
    pub fn from_persisted(
        schema: &'static FormsetSchema,
        rows: Vec<BTreeMap<String, String>>,
    ) -> Self {
        let mut state = Self::new(schema);
        state.blocks = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let fields = row
                    .into_iter()
                    .map(|(k, v)| (k, FieldValue::Text(v)))
                    .collect();
                FormBlock::new(index, fields, false)
            })
            .collect();
        state.management.initial_forms = state.blocks.len();
        state.reindex();
        state
    }

    pub(super) fn from_parts(
        schema: &'static FormsetSchema,
        blocks: Vec<FormBlock>,
        management: ManagementForm,
    ) -> Self {
        Self {
            schema,
            blocks,
            management,
        }
    }

    pub fn schema(&self) -> &'static FormsetSchema {
        self.schema
    }

    pub fn prefix(&self) -> &'static str {
        self.schema.prefix
    }

    pub fn blocks(&self) -> &[FormBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&FormBlock> {
        self.blocks.get(index)
    }

    pub fn total_forms(&self) -> usize {
        self.management.total_forms
    }

    pub fn management(&self) -> ManagementForm {
        self.management
    }

    /// Dopisuje nowy blok na końcu, z indeksem równym bieżącemu licznikowi.
    pub fn add_block(&mut self) -> &FormBlock {
        let index = self.management.total_forms;
        let fields = self
            .schema
            .fields
            .iter()
            .filter(|f| f.kind != FieldKind::File)
            .map(|f| (f.name.to_string(), FieldValue::Text(f.default_value(index))))
            .collect();
        self.blocks.push(FormBlock::new(index, fields, false));
        self.management.total_forms = self.blocks.len();
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn remove_block(&mut self, index: usize) -> RemoveOutcome {
        let Some(block) = self.blocks.get_mut(index) else {
            return RemoveOutcome::NotFound;
        };
        if block.is_persisted() {
            // Zapisany blok zostaje na swoim miejscu, backend usunie go przy zapisie.
            block.marked_for_deletion = true;
            return RemoveOutcome::MarkedForDeletion;
        }
        self.blocks.remove(index);
        self.reindex();
        RemoveOutcome::Removed
    }

    /// Cofa oznaczenie do usunięcia. Zwraca `false`, gdy nie było czego cofać.
    pub fn restore_block(&mut self, index: usize) -> bool {
        match self.blocks.get_mut(index) {
            Some(block) if block.marked_for_deletion => {
                block.marked_for_deletion = false;
                true
            }
            _ => false,
        }
    }

    /// Ustawia flagę wyłączną (np. zdjęcie główne): zaznaczenie w jednym bloku
    /// odznacza ją we wszystkich pozostałych.
    pub fn set_exclusive(&mut self, field: &str, index: usize, checked: bool) -> bool {
        if index >= self.blocks.len() {
            return false;
        }
        for (pos, block) in self.blocks.iter_mut().enumerate() {
            if pos == index {
                let value = if checked { "on" } else { "" };
                block.set_value(field, FieldValue::text(value));
            } else if checked && block.is_checked(field) {
                block.set_value(field, FieldValue::text(""));
            }
        }
        true
    }

    /// Nadaje każdemu blokowi indeks równy jego pozycji i synchronizuje licznik.
    /// Wywołanie dwa razy z rzędu daje ten sam wynik.
    pub fn reindex(&mut self) {
        for (pos, block) in self.blocks.iter_mut().enumerate() {
            block.index = pos;
        }
        self.management.total_forms = self.blocks.len();
    }

    /// Liczba bloków, które przetrwają zapis (bez oznaczonych do usunięcia).
    pub fn live_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.marked_for_deletion).count()
    }

    pub fn validate(&self) -> Vec<FormsetIssue> {
        let mut issues = Vec::new();
        let live = self.live_count();
        if live < self.management.min_num {
            issues.push(FormsetIssue::TooFew {
                min: self.management.min_num,
                live,
            });
        }
        if live > self.management.max_num {
            issues.push(FormsetIssue::TooMany {
                max: self.management.max_num,
                live,
            });
        }
        if let Some(field) = self.schema.exclusive_flag {
            let count = self
                .blocks
                .iter()
                .filter(|b| !b.marked_for_deletion && b.is_checked(field))
                .count();
            if count > 1 {
                issues.push(FormsetIssue::ExclusiveConflict { field, count });
            }
        }
        issues
    }

    /// Pary nazwa/wartość w kolejności, w jakiej przesłałaby je przeglądarka:
    /// najpierw formularz zarządzający, potem bloki. Niezaznaczone checkboxy są pomijane.
    pub fn to_pairs(&self) -> Vec<(String, FieldValue)> {
        let prefix = self.prefix();
        let mut pairs: Vec<(String, FieldValue)> = self
            .management
            .pairs(prefix)
            .into_iter()
            .map(|(k, v)| (k, FieldValue::Text(v)))
            .collect();

        for block in &self.blocks {
            let name = |field: &str| FieldName::new(prefix, block.index, field).to_string();

            for spec in self.schema.fields {
                match (spec.kind, block.fields.get(spec.name)) {
                    (FieldKind::Checkbox, Some(v)) if is_truthy(v.as_str()) => {
                        pairs.push((name(spec.name), v.clone()));
                    }
                    (FieldKind::Checkbox, _) => {}
                    (FieldKind::File, Some(FieldValue::File(f))) => {
                        pairs.push((name(spec.name), FieldValue::File(f.clone())));
                    }
                    (FieldKind::File, _) => {}
                    (_, Some(v)) => pairs.push((name(spec.name), v.clone())),
                    (_, None) => pairs.push((name(spec.name), FieldValue::text(""))),
                }
            }
            // Pola spoza schematu przechodzą bez zmian, żeby backend dostał wszystko.
            for (field, value) in &block.fields {
                if field != DELETE_FIELD && self.schema.field(field).is_none() {
                    pairs.push((name(field), value.clone()));
                }
            }
            if block.marked_for_deletion {
                pairs.push((name(DELETE_FIELD), FieldValue::text("on")));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formset::schema::{IMAGENES, TALLAS};

    fn persisted(ids: &[&str]) -> FormsetState {
        let rows = ids
            .iter()
            .map(|id| {
                BTreeMap::from([
                    ("id".to_string(), id.to_string()),
                    ("titulo".to_string(), format!("zdjęcie {}", id)),
                ])
            })
            .collect();
        FormsetState::from_persisted(&IMAGENES, rows)
    }

    fn indices(state: &FormsetState) -> Vec<usize> {
        state.blocks().iter().map(FormBlock::index).collect()
    }

    #[test]
    fn add_block_appends_at_total_count_with_defaults() {
        let mut state = FormsetState::new(&IMAGENES);
        state.add_block();
        let block = state.add_block().clone();
        assert_eq!(block.index(), 1);
        assert_eq!(block.value("orden"), "1");
        assert_eq!(block.value("titulo"), "");
        assert!(!block.is_checked("es_principal"));
        assert!(!block.is_persisted());
        assert_eq!(state.total_forms(), 2);
    }

    #[test]
    fn removing_new_block_collapses_indices() {
        let mut state = FormsetState::new(&IMAGENES);
        state.add_block();
        state.add_block();
        state.blocks[1].set_value("titulo", FieldValue::text("drugi"));

        assert_eq!(state.remove_block(0), RemoveOutcome::Removed);

        assert_eq!(state.total_forms(), 1);
        assert_eq!(indices(&state), vec![0]);
        assert_eq!(state.blocks()[0].value("titulo"), "drugi");
    }

    #[test]
    fn removing_persisted_block_only_marks_it() {
        let mut state = persisted(&["11", "12", "13"]);

        assert_eq!(state.remove_block(1), RemoveOutcome::MarkedForDeletion);

        assert_eq!(state.total_forms(), 3);
        assert_eq!(indices(&state), vec![0, 1, 2]);
        assert!(state.blocks()[1].is_marked_for_deletion());
        assert!(!state.blocks()[0].is_marked_for_deletion());

        let added = state.add_block().clone();
        assert_eq!(added.index(), 3);
        assert_eq!(state.total_forms(), 4);
    }

    #[test]
    fn restore_clears_only_the_marker() {
        let mut state = persisted(&["5", "6"]);
        let before = state.clone();
        state.remove_block(0);
        assert!(state.restore_block(0));
        assert_eq!(state, before);
        assert!(!state.restore_block(0));
        assert!(!state.restore_block(9));
    }

    #[test]
    fn remove_out_of_range_is_not_found() {
        let mut state = FormsetState::with_extra(&TALLAS);
        assert_eq!(state.remove_block(4), RemoveOutcome::NotFound);
        assert_eq!(state.total_forms(), 1);
    }

    #[test]
    fn reindex_is_idempotent() {
        let mut state = persisted(&["1", "2"]);
        state.add_block();
        state.add_block();
        state.remove_block(2);
        state.reindex();
        let first = state.to_pairs();
        state.reindex();
        assert_eq!(state.to_pairs(), first);
    }

    fn assert_contiguous(state: &FormsetState) {
        let expected: Vec<usize> = (0..state.blocks().len()).collect();
        assert_eq!(indices(state), expected);
        assert_eq!(state.total_forms(), state.blocks().len());
    }

    #[test]
    fn mutations_keep_indices_contiguous_without_reindex() {
        let starts: [fn() -> FormsetState; 3] = [
            || FormsetState::new(&TALLAS),
            || FormsetState::with_extra(&IMAGENES),
            || persisted(&["1", "2", "3"]),
        ];
        for (seed, start) in (1u64..=6).zip(starts.iter().cycle()) {
            let mut state = start();
            let mut rng = seed * 0x9E37_79B9;
            for _ in 0..40 {
                rng ^= rng << 13;
                rng ^= rng >> 7;
                rng ^= rng << 17;
                let len = state.blocks().len();
                match rng % 4 {
                    0 | 1 => {
                        state.add_block();
                    }
                    2 if len > 0 => {
                        state.remove_block((rng / 4) as usize % len);
                    }
                    3 if len > 0 => {
                        state.restore_block((rng / 4) as usize % len);
                    }
                    _ => {
                        assert_eq!(state.remove_block(len), RemoveOutcome::NotFound);
                    }
                }
                assert_contiguous(&state);
            }
            let before = state.clone();
            state.reindex();
            assert_eq!(state, before);
        }
    }

    #[test]
    fn exclusive_flag_unchecks_other_blocks() {
        let mut state = FormsetState::new(&IMAGENES);
        state.add_block();
        state.add_block();
        state.add_block();

        assert!(state.set_exclusive("es_principal", 0, true));
        assert!(state.set_exclusive("es_principal", 2, true));
        assert!(!state.blocks()[0].is_checked("es_principal"));
        assert!(state.blocks()[2].is_checked("es_principal"));

        assert!(state.set_exclusive("es_principal", 2, false));
        assert!(state.blocks().iter().all(|b| !b.is_checked("es_principal")));
        assert!(!state.set_exclusive("es_principal", 7, true));
    }

    #[test]
    fn pairs_carry_management_form_and_delete_marker() {
        let mut state = persisted(&["40"]);
        state.add_block();
        state.remove_block(0);
        let pairs: Vec<(String, String)> = state
            .to_pairs()
            .into_iter()
            .map(|(k, v)| (k, v.as_str().to_string()))
            .collect();

        assert!(pairs.contains(&("imagenes-TOTAL_FORMS".into(), "2".into())));
        assert!(pairs.contains(&("imagenes-INITIAL_FORMS".into(), "1".into())));
        assert!(pairs.contains(&("imagenes-MAX_NUM_FORMS".into(), "8".into())));
        assert!(pairs.contains(&("imagenes-0-id".into(), "40".into())));
        assert!(pairs.contains(&("imagenes-0-DELETE".into(), "on".into())));
        assert!(pairs.contains(&("imagenes-1-orden".into(), "1".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "imagenes-1-DELETE"));
        assert!(!pairs.iter().any(|(k, _)| k == "imagenes-1-es_principal"));
    }

    #[test]
    fn validation_reports_limits_and_conflicts() {
        let mut state = FormsetState::new(&IMAGENES);
        for _ in 0..9 {
            state.add_block();
        }
        state.blocks[0].set_value("es_principal", FieldValue::text("on"));
        state.blocks[3].set_value("es_principal", FieldValue::text("on"));

        let issues = state.validate();
        assert!(issues.contains(&FormsetIssue::TooMany { max: 8, live: 9 }));
        assert!(issues.contains(&FormsetIssue::ExclusiveConflict {
            field: "es_principal",
            count: 2
        }));
    }
}
