use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{FormId, Question},
    protocol::{Form, FormSummary, NewForm},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        // Every in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_form(&self, new_form: &NewForm) -> Result<Form> {
        let now = Utc::now();
        let form = Form {
            id: FormId::generate(),
            title: new_form.title.clone(),
            description: new_form.description.clone(),
            settings: new_form.settings.clone(),
            published: new_form.published,
            questions: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO forms (id, title, description, settings_json, published,
                               questions_json, question_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, '[]', 0, ?, ?)
            "#,
        )
        .bind(form.id.as_str())
        .bind(&form.title)
        .bind(&form.description)
        .bind(serde_json::to_string(&form.settings)?)
        .bind(form.published)
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert form '{}'", form.title))?;

        debug!("storage: created form id={}", form.id);
        Ok(form)
    }

    pub async fn load_form(&self, form_id: &FormId) -> Result<Option<Form>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, settings_json, published, questions_json,
                   created_at, updated_at
            FROM forms
            WHERE id = ?
            "#,
        )
        .bind(form_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load form {form_id}"))?;

        row.map(|row| form_from_row(&row)).transpose()
    }

    /// Overwrites the stored record. Returns false when no form has this id.
    pub async fn save_form(&self, form: &Form) -> Result<bool> {
        let questions_json = serde_json::to_string(&form.questions)
            .with_context(|| format!("failed to encode questions for form {}", form.id))?;
        let result = sqlx::query(
            r#"
            UPDATE forms
            SET title = ?, description = ?, settings_json = ?, published = ?,
                questions_json = ?, question_count = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&form.title)
        .bind(&form.description)
        .bind(serde_json::to_string(&form.settings)?)
        .bind(form.published)
        .bind(questions_json)
        .bind(form.questions.len() as i64)
        .bind(Utc::now())
        .bind(form.id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update form {}", form.id))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_form(&self, form_id: &FormId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM forms WHERE id = ?")
            .bind(form_id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete form {form_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_forms(&self) -> Result<Vec<FormSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, published, question_count, created_at, updated_at
            FROM forms
            ORDER BY updated_at DESC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list forms")?;

        rows.iter()
            .map(|row| -> Result<FormSummary> {
                let question_count: i64 = row.try_get("question_count")?;
                Ok(FormSummary {
                    id: FormId(row.try_get("id")?),
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    published: row.try_get("published")?,
                    question_count: usize::try_from(question_count).unwrap_or_default(),
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                    updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
                })
            })
            .collect()
    }
}

fn form_from_row(row: &SqliteRow) -> Result<Form> {
    let id = FormId(row.try_get("id")?);
    let settings_json: String = row.try_get("settings_json")?;
    let questions_json: String = row.try_get("questions_json")?;
    let questions: Vec<Question> = serde_json::from_str(&questions_json)
        .with_context(|| format!("corrupt questions payload for form {id}"))?;

    Ok(Form {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        settings: serde_json::from_str(&settings_json)
            .with_context(|| format!("corrupt settings payload for form {id}"))?,
        published: row.try_get("published")?,
        questions,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        id,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
