//! Field-level component state.
//!
//! A [`ComponentStateManager`] owns the state of one payment component and
//! publishes every change on a `watch` channel. Fields are read and written
//! through a [`StateUpdaterRegistry`], so the manager works with any state
//! shape.

use crate::domain::field::{ComponentFieldState, FieldId, FieldValue, Validation};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

pub trait ComponentStateFactory<S>: Send + Sync {
    fn create_default_state(&self) -> S;
}

pub trait FieldValidatorRegistry<S, F>: Send + Sync {
    fn validate(&self, field: F, value: &FieldValue, state: &S) -> Validation;
}

/// Normalizes raw input before validation, e.g. strips spaces from a card number.
pub trait FieldTransformerRegistry<F>: Send + Sync {
    fn transform(&self, field: F, value: FieldValue) -> FieldValue;
}

pub trait StateUpdaterRegistry<S, F>: Send + Sync {
    fn field_state(&self, state: &S, field: F) -> ComponentFieldState;

    fn update_field_state(&self, state: &S, field: F, field_state: ComponentFieldState) -> S;
}

/// Keeps every value as entered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransformation;

impl<F> FieldTransformerRegistry<F> for NoTransformation {
    fn transform(&self, _field: F, value: FieldValue) -> FieldValue {
        value
    }
}

pub struct ComponentStateManager<S, F> {
    state: watch::Sender<S>,
    validators: Arc<dyn FieldValidatorRegistry<S, F>>,
    updaters: Arc<dyn StateUpdaterRegistry<S, F>>,
    transformers: Arc<dyn FieldTransformerRegistry<F>>,
}

impl<S, F> ComponentStateManager<S, F>
where
    S: Clone + Send + Sync + 'static,
    F: FieldId,
{
    pub fn new(
        factory: &dyn ComponentStateFactory<S>,
        validators: Arc<dyn FieldValidatorRegistry<S, F>>,
        updaters: Arc<dyn StateUpdaterRegistry<S, F>>,
        transformers: Arc<dyn FieldTransformerRegistry<F>>,
    ) -> Self {
        let (state, _) = watch::channel(factory.create_default_state());
        Self {
            state,
            validators,
            updaters,
            transformers,
        }
    }

    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    pub fn field_state(&self, field: F) -> ComponentFieldState {
        self.updaters.field_state(&self.state.borrow(), field)
    }

    /// Replaces the state with `update(current)`, then re-validates the
    /// fields that were already validated.
    pub fn update_state(&self, update: impl FnOnce(&S) -> S) {
        self.state.send_modify(|state| {
            let mut updated = update(state);
            for &field in F::all() {
                let field_state = self.updaters.field_state(&updated, field);
                if field_state.validation.is_none() {
                    continue;
                }
                let validation = self.validators.validate(field, &field_state.value, &updated);
                updated = self.updaters.update_field_state(
                    &updated,
                    field,
                    ComponentFieldState {
                        validation: Some(validation),
                        ..field_state
                    },
                );
            }
            *state = updated;
        });
    }

    /// Sets a field's value. `None` leaves the value and its validation as they are.
    pub fn update_field_value(&self, field: F, value: Option<FieldValue>) {
        self.update_field(field, value, None, None);
    }

    pub fn update_field_focus(&self, field: F, has_focus: bool) {
        self.update_field(field, None, Some(has_focus), None);
    }

    /// Validates every field and highlights all of them. Focus moves to the
    /// first invalid field, if any.
    pub fn highlight_all_field_validation_errors(&self) {
        self.state.send_modify(|state| {
            let mut updated = state.clone();
            let mut first_invalid = None;
            for &field in F::all() {
                let field_state = self.updaters.field_state(&updated, field);
                let validation = self.validators.validate(field, &field_state.value, &updated);
                if first_invalid.is_none() && !validation.is_valid() {
                    first_invalid = Some(field);
                }
                updated = self.updaters.update_field_state(
                    &updated,
                    field,
                    ComponentFieldState {
                        validation: Some(validation),
                        should_highlight_validation_error: true,
                        ..field_state
                    },
                );
            }
            if let Some(invalid) = first_invalid {
                trace!(field = ?invalid, "Focusing first invalid field");
                for &field in F::all() {
                    let field_state = self.updaters.field_state(&updated, field);
                    updated = self.updaters.update_field_state(
                        &updated,
                        field,
                        ComponentFieldState {
                            has_focus: field == invalid,
                            ..field_state
                        },
                    );
                }
            }
            *state = updated;
        });
    }

    /// Whether every field is valid. Fields never validated are validated now.
    pub fn is_valid(&self) -> bool {
        let mut all_valid = true;
        self.state.send_if_modified(|state| {
            let mut modified = false;
            for &field in F::all() {
                let field_state = self.updaters.field_state(state, field);
                if field_state.validation.is_none() {
                    let validation = self.validators.validate(field, &field_state.value, state);
                    *state = self.updaters.update_field_state(
                        state,
                        field,
                        ComponentFieldState {
                            validation: Some(validation),
                            ..field_state
                        },
                    );
                    modified = true;
                }
                all_valid &= self.updaters.field_state(state, field).is_valid();
            }
            modified
        });
        all_valid
    }

    fn update_field(
        &self,
        field: F,
        value: Option<FieldValue>,
        has_focus: Option<bool>,
        should_highlight_validation_error: Option<bool>,
    ) {
        self.state.send_modify(|state| {
            let mut field_state = self.updaters.field_state(state, field);
            if let Some(value) = value {
                let value = self.transformers.transform(field, value);
                field_state.validation = Some(self.validators.validate(field, &value, state));
                field_state.value = value;
            }
            if let Some(has_focus) = has_focus {
                field_state.has_focus = has_focus;
            }
            if let Some(highlight) = should_highlight_validation_error {
                field_state.should_highlight_validation_error = highlight;
            }
            *state = self.updaters.update_field_state(state, field, field_state);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestField {
        Number,
        Holder,
        Code,
    }

    impl FieldId for TestField {
        fn all() -> &'static [Self] {
            &[TestField::Number, TestField::Holder, TestField::Code]
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct TestState {
        fields: HashMap<TestField, ComponentFieldState>,
        strict: bool,
    }

    struct Factory(TestState);

    impl ComponentStateFactory<TestState> for Factory {
        fn create_default_state(&self) -> TestState {
            self.0.clone()
        }
    }

    /// Valid unless the text is empty or "invalid"; in strict mode "lenient" is invalid too.
    #[derive(Default)]
    struct Validators {
        validated: Mutex<Vec<TestField>>,
    }

    impl FieldValidatorRegistry<TestState, TestField> for Validators {
        fn validate(&self, field: TestField, value: &FieldValue, state: &TestState) -> Validation {
            self.validated.lock().unwrap().push(field);
            match value.as_text() {
                Some("") | Some("invalid") | None => Validation::Invalid("invalid".into()),
                Some("lenient") if state.strict => Validation::Invalid("strict".into()),
                Some(_) => Validation::Valid,
            }
        }
    }

    struct Updaters;

    impl StateUpdaterRegistry<TestState, TestField> for Updaters {
        fn field_state(&self, state: &TestState, field: TestField) -> ComponentFieldState {
            state
                .fields
                .get(&field)
                .cloned()
                .unwrap_or_else(|| ComponentFieldState::new(""))
        }

        fn update_field_state(
            &self,
            state: &TestState,
            field: TestField,
            field_state: ComponentFieldState,
        ) -> TestState {
            let mut state = state.clone();
            state.fields.insert(field, field_state);
            state
        }
    }

    struct Uppercase;

    impl FieldTransformerRegistry<TestField> for Uppercase {
        fn transform(&self, _field: TestField, value: FieldValue) -> FieldValue {
            match value {
                FieldValue::Text(text) => FieldValue::Text(text.to_uppercase()),
                other => other,
            }
        }
    }

    fn manager(
        initial: TestState,
        validators: Arc<Validators>,
    ) -> ComponentStateManager<TestState, TestField> {
        ComponentStateManager::new(
            &Factory(initial),
            validators,
            Arc::new(Updaters),
            Arc::new(NoTransformation),
        )
    }

    fn with_fields(fields: &[(TestField, ComponentFieldState)]) -> TestState {
        TestState {
            fields: fields.iter().cloned().collect(),
            strict: false,
        }
    }

    #[test]
    fn test_update_state_revalidates_only_validated_fields() {
        let validators = Arc::new(Validators::default());
        let manager = manager(
            with_fields(&[
                (
                    TestField::Number,
                    ComponentFieldState::new("lenient").with_validation(Validation::Valid),
                ),
                (TestField::Holder, ComponentFieldState::new("lenient")),
            ]),
            validators.clone(),
        );

        manager.update_state(|state| TestState {
            strict: true,
            ..state.clone()
        });

        assert_eq!(*validators.validated.lock().unwrap(), vec![TestField::Number]);
        assert!(!manager.field_state(TestField::Number).is_valid());
        assert_eq!(manager.field_state(TestField::Holder).validation, None);
        assert!(manager.state().strict);
    }

    #[test]
    fn test_update_field_value_transforms_then_validates() {
        let validators = Arc::new(Validators::default());
        let manager: ComponentStateManager<TestState, TestField> = ComponentStateManager::new(
            &Factory(TestState::default()),
            validators.clone(),
            Arc::new(Updaters),
            Arc::new(Uppercase),
        );

        manager.update_field_value(TestField::Holder, Some("jane".into()));

        let field = manager.field_state(TestField::Holder);
        assert_eq!(field.value, FieldValue::from("JANE"));
        assert_eq!(field.validation, Some(Validation::Valid));
        assert!(!field.has_focus);
    }

    #[test]
    fn test_missing_value_is_not_validated() {
        let validators = Arc::new(Validators::default());
        let manager = manager(TestState::default(), validators.clone());

        manager.update_field_value(TestField::Number, None);
        manager.update_field_focus(TestField::Number, true);

        assert!(validators.validated.lock().unwrap().is_empty());
        let field = manager.field_state(TestField::Number);
        assert!(field.has_focus);
        assert_eq!(field.validation, None);
    }

    #[test]
    fn test_highlight_focuses_first_invalid_field() {
        let manager = manager(
            with_fields(&[
                (TestField::Number, ComponentFieldState::new("4111")),
                (TestField::Holder, ComponentFieldState::new("invalid")),
                (TestField::Code, ComponentFieldState::new("")),
            ]),
            Arc::new(Validators::default()),
        );
        manager.update_field_focus(TestField::Number, true);

        manager.highlight_all_field_validation_errors();

        let number = manager.field_state(TestField::Number);
        let holder = manager.field_state(TestField::Holder);
        let code = manager.field_state(TestField::Code);
        assert!(number.should_highlight_validation_error && !number.has_focus);
        assert!(holder.should_highlight_validation_error && holder.has_focus);
        assert!(code.should_highlight_validation_error && !code.has_focus);
        assert!(!code.is_valid());
    }

    #[test]
    fn test_highlight_focuses_only_the_first_of_two_invalid_fields() {
        let manager = manager(
            with_fields(&[
                (TestField::Number, ComponentFieldState::new("invalid")),
                (TestField::Holder, ComponentFieldState::new("Jane")),
                (TestField::Code, ComponentFieldState::new("")),
            ]),
            Arc::new(Validators::default()),
        );
        manager.update_field_focus(TestField::Code, true);

        manager.highlight_all_field_validation_errors();

        let number = manager.field_state(TestField::Number);
        let holder = manager.field_state(TestField::Holder);
        let code = manager.field_state(TestField::Code);
        assert!(number.has_focus && !number.is_valid());
        assert!(!holder.has_focus && holder.is_valid());
        assert!(!code.has_focus && !code.is_valid());
        assert!(number.should_highlight_validation_error);
        assert!(code.should_highlight_validation_error);
    }

    #[test]
    fn test_is_valid_validates_pending_fields() {
        let validators = Arc::new(Validators::default());
        let manager = manager(
            with_fields(&[
                (TestField::Number, ComponentFieldState::new("4111")),
                (TestField::Holder, ComponentFieldState::new("Jane")),
                (
                    TestField::Code,
                    ComponentFieldState::new("737").with_validation(Validation::Valid),
                ),
            ]),
            validators.clone(),
        );
        let mut rx = manager.subscribe();

        assert!(manager.is_valid());
        assert_eq!(
            *validators.validated.lock().unwrap(),
            vec![TestField::Number, TestField::Holder]
        );
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        assert!(manager.is_valid());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_subscribers_see_updates() {
        let manager = manager(TestState::default(), Arc::new(Validators::default()));
        let rx = manager.subscribe();

        manager.update_field_value(TestField::Code, Some("737".into()));

        assert!(rx.borrow().fields[&TestField::Code].is_valid());
    }
}
