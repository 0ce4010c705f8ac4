use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use builder_core::{
    load_settings, logic, reconcile, Answers, DurableFormStore, Evaluator, FormStore,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use shared::{
    domain::{FormId, Question},
    protocol::NewForm,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "form-tools", about = "Inspect and move forms in the builder database")]
struct Cli {
    /// Overrides the configured database URL.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists stored forms, most recently updated first.
    List,
    /// Prints a form's questions with their visibility rules.
    Show { form_id: String },
    /// Prints the questions visible for the answers in a JSON object file.
    Preview { form_id: String, answers: PathBuf },
    /// Writes a form as JSON to a file, or stdout when no path is given.
    Export {
        form_id: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Creates a form from a JSON document, assigning permanent question ids.
    Import {
        path: PathBuf,
        #[arg(long)]
        title: Option<String>,
    },
    Delete { form_id: String },
}

#[derive(Debug, Deserialize)]
struct FormDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    settings: serde_json::Value,
    #[serde(default)]
    published: bool,
    #[serde(default)]
    questions: Vec<Question>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    let store = DurableFormStore::initialize(&settings.database_url).await?;

    match cli.command {
        Command::List => {
            for form in store.list_forms().await? {
                println!(
                    "{}\t{}\t{} questions\t{}\tupdated {}",
                    form.id,
                    form.title,
                    form.question_count,
                    if form.published { "published" } else { "draft" },
                    form.updated_at.to_rfc3339()
                );
            }
        }
        Command::Show { form_id } => {
            let form = store.load_form(&FormId::from(form_id)).await?;
            println!("{} ({})", form.title, form.id);
            for question in &form.questions {
                let label = if question.label.trim().is_empty() {
                    logic::UNTITLED
                } else {
                    question.label.as_str()
                };
                println!(
                    "{:>3}. [{}] {}{}",
                    question.order_index + 1,
                    question.kind_tag().label(),
                    label,
                    if question.required { " *" } else { "" }
                );
                if let Some(options) = question.options() {
                    println!("     options: {}", options.join(", "));
                }
                let summary = logic::summarize(question, &form.questions);
                if !summary.is_empty() {
                    println!("     shown when: {summary}");
                }
            }
        }
        Command::Preview { form_id, answers } => {
            let form = store.load_form(&FormId::from(form_id)).await?;
            let raw = fs::read_to_string(&answers)
                .with_context(|| format!("failed to read answers from {}", answers.display()))?;
            let answers: Answers =
                serde_json::from_str(&raw).context("answers must be a JSON object of strings")?;
            for question in Evaluator::new(&form.questions, &answers).visible_questions() {
                println!("{}\t{}", question.id, question.label);
            }
        }
        Command::Export { form_id, output } => {
            let form = store.load_form(&FormId::from(form_id)).await?;
            let json = serde_json::to_string_pretty(&form)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("exported form {} to {}", form.id, path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Import { path, title } => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let document: FormDocument = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a form document", path.display()))?;
            let title = title.unwrap_or(document.title);
            anyhow::ensure!(!title.trim().is_empty(), "imported forms need a title");

            let mut questions = document.questions;
            questions.sort_by_key(|question| question.order_index);
            builder_core::questions::reindex(&mut questions);
            let reconciled = reconcile(&questions);

            let mut form = store
                .create_form(NewForm {
                    title,
                    description: document.description,
                    settings: document.settings,
                    published: document.published,
                })
                .await?;
            form.questions = reconciled.questions;
            store.save_form(&form.id, &form).await?;
            info!(
                "imported form {} with {} questions ({} new ids)",
                form.id,
                form.questions.len(),
                reconciled.minted.len()
            );
            println!("{}", form.id);
        }
        Command::Delete { form_id } => {
            let form_id = FormId::from(form_id);
            store.delete_form(&form_id).await?;
            println!("deleted {form_id}");
        }
    }

    Ok(())
}
