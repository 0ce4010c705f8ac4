use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{FormId, KindTag, LogicRule, Question, QuestionId},
    error::StoreError,
    protocol::{Form, FormSummary, NewForm},
};
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    autosave::{AutosaveCoordinator, SaveState, SaveTicket},
    cache::FormListCache,
    config::EditorSettings,
    history::History,
    logic::{self, Answers, Evaluator, RulePatch},
    questions::{self, Direction, QuestionPatch},
    reconcile::Reconciler,
    FormStore, MissingFormStore,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Loaded(Option<FormId>),
    Changed,
    SaveStateChanged(SaveState),
    FormCreated(FormId),
    Saved(FormId),
    SaveFailed(String),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Clean,
    InFlight,
    NotDue,
    MissingTitle,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved(FormId),
    Skipped(SkipReason),
    Failed(StoreError),
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub form_id: Option<FormId>,
    pub title: String,
    pub questions: Vec<Question>,
    pub current_step: usize,
    pub selected: Option<QuestionId>,
    pub dirty: bool,
    pub save_state: SaveState,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone)]
struct FormDraft {
    title: String,
    description: String,
    settings: serde_json::Value,
    published: bool,
    questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct SaveJob {
    generation: u64,
    ticket: SaveTicket,
    form_id: Option<FormId>,
    created_at: Option<DateTime<Utc>>,
    draft: FormDraft,
}

#[derive(Debug)]
pub struct SaveResult {
    generation: u64,
    ticket: SaveTicket,
    created: Option<Form>,
    result: Result<Form, StoreError>,
}

impl SaveJob {
    pub fn form_id(&self) -> Option<&FormId> {
        self.form_id.as_ref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.draft.questions
    }

    pub async fn run(self, store: &dyn FormStore) -> SaveResult {
        let SaveJob {
            generation,
            ticket,
            form_id,
            created_at,
            draft,
        } = self;

        let (form_id, created_at, created) = match form_id {
            Some(form_id) => (form_id, created_at.unwrap_or_else(Utc::now), None),
            None => {
                let new_form = NewForm {
                    title: draft.title.clone(),
                    description: draft.description.clone(),
                    settings: draft.settings.clone(),
                    published: draft.published,
                };
                match store.create_form(new_form).await {
                    Ok(form) => (form.id.clone(), form.created_at, Some(form)),
                    Err(err) => {
                        return SaveResult {
                            generation,
                            ticket,
                            created: None,
                            result: Err(err),
                        }
                    }
                }
            }
        };

        let form = Form {
            id: form_id.clone(),
            title: draft.title,
            description: draft.description,
            settings: draft.settings,
            published: draft.published,
            questions: draft.questions,
            created_at,
            updated_at: Utc::now(),
        };
        let result = store.save_form(&form_id, &form).await.map(|()| form);
        SaveResult {
            generation,
            ticket,
            created,
            result,
        }
    }
}

pub struct FormSession {
    store: Arc<dyn FormStore>,
    settings: EditorSettings,
    form_id: Option<FormId>,
    created_at: Option<DateTime<Utc>>,
    title: String,
    description: String,
    display_settings: serde_json::Value,
    published: bool,
    questions: Vec<Question>,
    history: History<Vec<Question>, QuestionId>,
    autosave: AutosaveCoordinator,
    reconciler: Reconciler,
    current_step: usize,
    selected: Option<QuestionId>,
    generation: u64,
    form_list: FormListCache,
    events: broadcast::Sender<SessionEvent>,
}

impl FormSession {
    pub fn new(store: Arc<dyn FormStore>, settings: EditorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut session = Self {
            store,
            history: History::with_limits(settings.history_capacity, settings.coalesce_window),
            autosave: AutosaveCoordinator::new(
                settings.autosave_debounce,
                settings.saved_display,
                settings.retry_delay,
            ),
            form_list: FormListCache::new(settings.form_list_ttl),
            settings,
            form_id: None,
            created_at: None,
            title: String::new(),
            description: String::new(),
            display_settings: serde_json::Value::Null,
            published: false,
            questions: Vec::new(),
            reconciler: Reconciler::default(),
            current_step: 0,
            selected: None,
            generation: 0,
            events,
        };
        session.history.record(Vec::new());
        session
    }

    pub fn detached(settings: EditorSettings) -> Self {
        Self::new(Arc::new(MissingFormStore), settings)
    }

    pub fn store(&self) -> Arc<dyn FormStore> {
        Arc::clone(&self.store)
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn form_id(&self) -> Option<&FormId> {
        self.form_id.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn display_settings(&self) -> &serde_json::Value {
        &self.display_settings
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn selected(&self) -> Option<&QuestionId> {
        self.selected.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn save_state(&self) -> SaveState {
        self.autosave.state()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            form_id: self.form_id.clone(),
            title: self.title.clone(),
            questions: self.questions.clone(),
            current_step: self.current_step,
            selected: self.selected.clone(),
            dirty: self.is_dirty(),
            save_state: self.save_state(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    pub fn logic_summary(&self, id: &QuestionId) -> Option<String> {
        questions::find(&self.questions, id)
            .map(|question| logic::summarize(question, &self.questions))
    }

    pub fn visible_questions(&self, answers: &Answers) -> Vec<QuestionId> {
        Evaluator::new(&self.questions, answers)
            .visible_questions()
            .into_iter()
            .map(|question| question.id.clone())
            .collect()
    }

    // Question intents.

    pub fn add_question(&mut self, kind: KindTag) -> QuestionId {
        let question = questions::create(kind, self.questions.len());
        let id = question.id.clone();
        let next = questions::append_question(&self.questions, question);
        self.commit(next, None);
        self.selected = Some(id.clone());
        id
    }

    pub fn insert_question_after(&mut self, after_id: &QuestionId) -> Option<QuestionId> {
        questions::position(&self.questions, after_id)?;
        let question = questions::create(KindTag::ShortText, 0);
        let id = question.id.clone();
        let next = questions::insert_question_after(&self.questions, after_id, question);
        self.commit(next, None);
        self.selected = Some(id.clone());
        Some(id)
    }

    pub fn update_question(&mut self, id: &QuestionId, patch: &QuestionPatch) -> bool {
        let next = questions::update(&self.questions, id, patch);
        let key = patch.is_text_only().then(|| id.clone());
        self.commit(next, key)
    }

    pub fn change_kind(&mut self, id: &QuestionId, kind: KindTag) -> bool {
        let next = questions::change_kind(&self.questions, id, kind);
        self.commit(next, None)
    }

    pub fn delete_question(&mut self, id: &QuestionId) -> bool {
        let next = questions::remove(&self.questions, id);
        self.commit(next, None)
    }

    pub fn duplicate_question(&mut self, id: &QuestionId) -> Option<QuestionId> {
        let index = questions::position(&self.questions, id)?;
        let next = questions::duplicate(&self.questions, id);
        let copy = next.get(index + 1).map(|question| question.id.clone())?;
        self.commit(next, None);
        self.selected = Some(copy.clone());
        Some(copy)
    }

    pub fn move_question(&mut self, id: &QuestionId, direction: Direction) -> bool {
        let next = questions::move_question(&self.questions, id, direction);
        self.commit(next, None)
    }

    pub fn add_option(&mut self, id: &QuestionId, text: Option<String>) -> bool {
        let next = questions::add_option(&self.questions, id, text);
        self.commit(next, None)
    }

    pub fn set_option(&mut self, id: &QuestionId, index: usize, text: impl Into<String>) -> bool {
        let next = questions::set_option(&self.questions, id, index, text);
        self.commit(next, None)
    }

    pub fn remove_option(&mut self, id: &QuestionId, index: usize) -> bool {
        let next = questions::remove_option(&self.questions, id, index);
        self.commit(next, None)
    }

    // Logic intents.

    pub fn add_rule(&mut self, id: &QuestionId, rule: LogicRule) -> bool {
        let next = logic::edit_logic(&self.questions, id, |group| logic::add_rule(group, rule));
        self.commit(next, None)
    }

    pub fn remove_rule(&mut self, id: &QuestionId, index: usize) -> bool {
        let next = logic::edit_logic(&self.questions, id, |group| logic::remove_rule(group, index));
        self.commit(next, None)
    }

    pub fn update_rule(&mut self, id: &QuestionId, index: usize, patch: &RulePatch) -> bool {
        let next = logic::edit_logic(&self.questions, id, |group| {
            logic::update_rule(group, index, patch)
        });
        self.commit(next, None)
    }

    pub fn toggle_combinator(&mut self, id: &QuestionId) -> bool {
        let next = logic::edit_logic(&self.questions, id, logic::toggle_combinator);
        self.commit(next, None)
    }

    pub fn clear_logic(&mut self, id: &QuestionId) -> bool {
        let next = questions::edit(&self.questions, id, |question| question.logic = None);
        self.commit(next, None)
    }

    pub fn prune_dangling_rules(&mut self) -> bool {
        let next = logic::prune_dangling(&self.questions);
        self.commit(next, None)
    }

    // Form metadata. These do not enter the question history.

    pub fn set_title(&mut self, title: impl Into<String>) -> bool {
        let title = title.into();
        if title == self.title {
            return false;
        }
        self.title = title;
        self.touch();
        true
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> bool {
        let description = description.into();
        if description == self.description {
            return false;
        }
        self.description = description;
        self.touch();
        true
    }

    pub fn set_published(&mut self, published: bool) -> bool {
        if published == self.published {
            return false;
        }
        self.published = published;
        self.touch();
        true
    }

    pub fn set_display_settings(&mut self, settings: serde_json::Value) -> bool {
        if settings == self.display_settings {
            return false;
        }
        self.display_settings = settings;
        self.touch();
        true
    }

    // History.

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    // Navigation.

    pub fn next_step(&mut self) -> usize {
        self.go_to_step(self.current_step.saturating_add(1))
    }

    pub fn previous_step(&mut self) -> usize {
        self.go_to_step(self.current_step.saturating_sub(1))
    }

    pub fn go_to_step(&mut self, step: usize) -> usize {
        self.current_step = step.min(self.last_step());
        self.current_step
    }

    pub fn select(&mut self, id: Option<QuestionId>) -> bool {
        match id {
            Some(id) if questions::position(&self.questions, &id).is_none() => false,
            id => {
                self.selected = id;
                true
            }
        }
    }

    // Persistence.

    pub async fn open(&mut self, form_id: &FormId) -> Result<(), StoreError> {
        let form = self.store.load_form(form_id).await?;
        self.load(form);
        Ok(())
    }

    pub fn load(&mut self, mut form: Form) {
        form.questions.sort_by_key(|question| question.order_index);
        questions::reindex(&mut form.questions);
        info!(
            "session: opened form {} with {} questions",
            form.id,
            form.questions.len()
        );
        let form_id = form.id.clone();
        self.replace(
            Some(form_id.clone()),
            Some(form.created_at),
            FormDraft {
                title: form.title,
                description: form.description,
                settings: form.settings,
                published: form.published,
                questions: form.questions,
            },
        );
        self.emit(SessionEvent::Loaded(Some(form_id)));
    }

    pub fn new_form(&mut self) {
        self.replace(
            None,
            None,
            FormDraft {
                title: String::new(),
                description: String::new(),
                settings: serde_json::Value::Null,
                published: false,
                questions: Vec::new(),
            },
        );
        self.emit(SessionEvent::Loaded(None));
    }

    /// Leaves the current form. Pending timers are cancelled and a save still
    /// in flight will be discarded when it completes.
    pub fn close(&mut self) {
        if self.is_dirty() {
            warn!(
                "session: closing form {} with unsaved edits",
                self.form_label()
            );
        }
        self.replace(
            None,
            None,
            FormDraft {
                title: String::new(),
                description: String::new(),
                settings: serde_json::Value::Null,
                published: false,
                questions: Vec::new(),
            },
        );
        self.emit(SessionEvent::Closed);
    }

    /// Snapshots and reconciles the form for writing. Without `manual` the
    /// debounce window must have elapsed.
    pub fn begin_save(&mut self, manual: bool) -> Result<SaveJob, SkipReason> {
        self.begin_save_at(manual, Instant::now())
    }

    fn begin_save_at(&mut self, manual: bool, now: Instant) -> Result<SaveJob, SkipReason> {
        if self.autosave.is_saving() {
            return Err(SkipReason::InFlight);
        }
        if !self.autosave.is_dirty() {
            return Err(SkipReason::Clean);
        }
        if !manual && !self.autosave.due(now) {
            return Err(SkipReason::NotDue);
        }
        if self.form_id.is_none() && self.title.trim().is_empty() {
            debug!("session: skipping save of untitled new form");
            self.autosave.defer();
            return Err(SkipReason::MissingTitle);
        }
        let ticket = self.autosave.begin().ok_or(SkipReason::Clean)?;
        let reconciliation = self.reconciler.reconcile(&self.questions);
        debug!(
            "session: saving form {} ({} questions, {} new ids)",
            self.form_label(),
            reconciliation.questions.len(),
            reconciliation.minted.len()
        );
        self.emit(SessionEvent::SaveStateChanged(SaveState::Saving));
        Ok(SaveJob {
            generation: self.generation,
            ticket,
            form_id: self.form_id.clone(),
            created_at: self.created_at,
            draft: FormDraft {
                title: self.title.clone(),
                description: self.description.clone(),
                settings: self.display_settings.clone(),
                published: self.published,
                questions: reconciliation.questions,
            },
        })
    }

    pub fn finish_save(&mut self, result: SaveResult) -> SaveOutcome {
        if result.generation != self.generation {
            debug!("session: discarding save result for a form that is no longer open");
            return SaveOutcome::Discarded;
        }
        let now = Instant::now();

        if let Some(created) = &result.created {
            info!("session: created form {}", created.id);
            self.form_id = Some(created.id.clone());
            self.created_at = Some(created.created_at);
            self.form_list.invalidate();
            self.emit(SessionEvent::FormCreated(created.id.clone()));
        }

        match result.result {
            Ok(form) => {
                self.autosave.complete(result.ticket, true, now);
                self.questions = self.reconciler.remap(&self.questions);
                self.selected = self.selected.take().map(|id| self.reconciler.resolve(&id));
                self.form_list.invalidate();
                info!(
                    "session: saved form {} ({} questions)",
                    form.id,
                    form.questions.len()
                );
                self.emit(SessionEvent::Saved(form.id.clone()));
                self.emit(SessionEvent::SaveStateChanged(self.autosave.state()));
                SaveOutcome::Saved(form.id)
            }
            Err(err) => {
                self.autosave.complete(result.ticket, false, now);
                warn!("session: save of form {} failed: {err}", self.form_label());
                self.emit(SessionEvent::SaveFailed(err.to_string()));
                self.emit(SessionEvent::SaveStateChanged(self.autosave.state()));
                SaveOutcome::Failed(err)
            }
        }
    }

    pub async fn save_now(&mut self) -> SaveOutcome {
        let job = match self.begin_save(true) {
            Ok(job) => job,
            Err(reason) => return SaveOutcome::Skipped(reason),
        };
        let store = self.store();
        let result = job.run(store.as_ref()).await;
        self.finish_save(result)
    }

    pub fn tick(&mut self, now: Instant) -> Option<SaveJob> {
        self.history.flush_due(now);
        if self.autosave.tick(now) {
            self.emit(SessionEvent::SaveStateChanged(self.autosave.state()));
        }
        if !self.autosave.due(now) {
            return None;
        }
        match self.begin_save_at(false, now) {
            Ok(job) => Some(job),
            Err(reason) => {
                debug!("session: autosave skipped: {reason:?}");
                None
            }
        }
    }

    pub async fn poll_timers(&mut self) -> Option<SaveOutcome> {
        let job = self.tick(Instant::now())?;
        let store = self.store();
        let result = job.run(store.as_ref()).await;
        Some(self.finish_save(result))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.history.pending_deadline(), self.autosave.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub async fn list_forms(&mut self) -> Result<Vec<FormSummary>, StoreError> {
        let now = Instant::now();
        if let Some(forms) = self.form_list.get(now) {
            return Ok(forms.to_vec());
        }
        let forms = self.store.list_forms().await?;
        self.form_list.put(now, forms.clone());
        Ok(forms)
    }

    pub async fn delete_form(&mut self, form_id: &FormId) -> Result<(), StoreError> {
        self.store.delete_form(form_id).await?;
        self.form_list.invalidate();
        info!("session: deleted form {form_id}");
        if self.form_id.as_ref() == Some(form_id) {
            self.close();
        }
        Ok(())
    }

    fn commit(&mut self, next: Vec<Question>, coalesce: Option<QuestionId>) -> bool {
        if next == self.questions {
            return false;
        }
        debug_assert!(questions::is_densely_ordered(&next));
        let now = Instant::now();
        match coalesce {
            Some(key) => self.history.record_coalesced(key, next.clone(), now),
            None => self.history.record(next.clone()),
        }
        self.questions = next;
        self.after_questions_changed(now);
        true
    }

    fn restore(&mut self, snapshot: Vec<Question>) {
        let next = self.reconciler.remap(&snapshot);
        if next == self.questions {
            return;
        }
        self.questions = next;
        self.after_questions_changed(Instant::now());
    }

    fn after_questions_changed(&mut self, now: Instant) {
        self.current_step = self.current_step.min(self.last_step());
        if let Some(selected) = &self.selected {
            if questions::position(&self.questions, selected).is_none() {
                self.selected = None;
            }
        }
        self.autosave.mark_dirty(now);
        self.emit(SessionEvent::Changed);
    }

    fn touch(&mut self) {
        self.autosave.mark_dirty(Instant::now());
        self.emit(SessionEvent::Changed);
    }

    fn replace(
        &mut self,
        form_id: Option<FormId>,
        created_at: Option<DateTime<Utc>>,
        draft: FormDraft,
    ) {
        self.generation += 1;
        self.form_id = form_id;
        self.created_at = created_at;
        self.title = draft.title;
        self.description = draft.description;
        self.display_settings = draft.settings;
        self.published = draft.published;
        self.questions = draft.questions;
        self.history.clear();
        self.history.record(self.questions.clone());
        self.autosave.reset();
        self.reconciler = Reconciler::default();
        self.current_step = 0;
        self.selected = None;
    }

    fn last_step(&self) -> usize {
        self.questions.len().saturating_sub(1)
    }

    fn form_label(&self) -> String {
        self.form_id
            .as_ref()
            .map_or_else(|| "<new>".to_string(), ToString::to_string)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
