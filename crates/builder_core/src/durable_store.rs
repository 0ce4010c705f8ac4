use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{
    domain::FormId,
    error::StoreError,
    protocol::{Form, FormSummary, NewForm},
};
use storage::Storage;
use tracing::debug;

use crate::FormStore;

pub struct DurableFormStore {
    storage: Storage,
}

impl DurableFormStore {
    pub async fn initialize(database_url: &str) -> Result<Arc<Self>> {
        let storage = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to initialize form storage at '{database_url}'"))?;
        Ok(Arc::new(Self::new(storage)))
    }

    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

fn io_error(err: anyhow::Error) -> StoreError {
    StoreError::io(format!("{err:#}"))
}

#[async_trait]
impl FormStore for DurableFormStore {
    async fn load_form(&self, form_id: &FormId) -> Result<Form, StoreError> {
        self.storage
            .load_form(form_id)
            .await
            .map_err(io_error)?
            .ok_or_else(|| StoreError::NotFound(form_id.clone()))
    }

    async fn create_form(&self, new_form: NewForm) -> Result<Form, StoreError> {
        let form = self.storage.create_form(&new_form).await.map_err(io_error)?;
        debug!("durable store: created form {}", form.id);
        Ok(form)
    }

    async fn save_form(&self, form_id: &FormId, form: &Form) -> Result<(), StoreError> {
        if &form.id != form_id {
            return Err(StoreError::Conflict(format!(
                "payload id {} does not match form {form_id}",
                form.id
            )));
        }
        if self.storage.save_form(form).await.map_err(io_error)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(form_id.clone()))
        }
    }

    async fn delete_form(&self, form_id: &FormId) -> Result<(), StoreError> {
        if self.storage.delete_form(form_id).await.map_err(io_error)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(form_id.clone()))
        }
    }

    async fn list_forms(&self) -> Result<Vec<FormSummary>, StoreError> {
        self.storage.list_forms().await.map_err(io_error)
    }
}

#[cfg(test)]
#[path = "tests/durable_store_tests.rs"]
mod tests;
