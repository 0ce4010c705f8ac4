use async_trait::async_trait;
use shared::{
    domain::FormId,
    error::StoreError,
    protocol::{Form, FormSummary, NewForm},
};

pub mod autosave;
pub mod cache;
pub mod config;
pub mod driver;
mod durable_store;
pub mod history;
pub mod logic;
pub mod questions;
pub mod reconcile;
pub mod session;

pub use autosave::{AutosaveCoordinator, SaveState};
pub use config::{load_settings, EditorSettings};
pub use driver::AutosaveDriver;
pub use durable_store::DurableFormStore;
pub use history::History;
pub use logic::{Answers, Evaluator};
pub use reconcile::{reconcile, Reconciler};
pub use session::{FormSession, SaveOutcome, SessionEvent, SessionView, SkipReason};

#[async_trait]
pub trait FormStore: Send + Sync {
    async fn load_form(&self, form_id: &FormId) -> Result<Form, StoreError>;
    async fn create_form(&self, new_form: NewForm) -> Result<Form, StoreError>;
    async fn save_form(&self, form_id: &FormId, form: &Form) -> Result<(), StoreError>;
    async fn delete_form(&self, form_id: &FormId) -> Result<(), StoreError>;
    async fn list_forms(&self) -> Result<Vec<FormSummary>, StoreError>;
}

pub struct MissingFormStore;

#[async_trait]
impl FormStore for MissingFormStore {
    async fn load_form(&self, form_id: &FormId) -> Result<Form, StoreError> {
        Err(StoreError::io(format!(
            "form store is unavailable; cannot load form {form_id}"
        )))
    }

    async fn create_form(&self, _new_form: NewForm) -> Result<Form, StoreError> {
        Err(StoreError::io("form store is unavailable"))
    }

    async fn save_form(&self, form_id: &FormId, _form: &Form) -> Result<(), StoreError> {
        Err(StoreError::io(format!(
            "form store is unavailable; cannot save form {form_id}"
        )))
    }

    async fn delete_form(&self, form_id: &FormId) -> Result<(), StoreError> {
        Err(StoreError::io(format!(
            "form store is unavailable; cannot delete form {form_id}"
        )))
    }

    async fn list_forms(&self) -> Result<Vec<FormSummary>, StoreError> {
        Err(StoreError::io("form store is unavailable"))
    }
}

#[cfg(test)]
#[path = "tests/test_store.rs"]
pub(crate) mod test_store;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
