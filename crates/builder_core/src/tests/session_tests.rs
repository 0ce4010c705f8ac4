use super::*;

use std::sync::atomic::Ordering;

use shared::domain::{Operator, PLACEHOLDER_OPTION};
use tokio::time::{advance, Duration};

use crate::test_store::{stored_form, TestFormStore};

fn session_with(store: &Arc<TestFormStore>) -> FormSession {
    FormSession::new(store.clone(), EditorSettings::default())
}

fn titled_session(store: &Arc<TestFormStore>) -> FormSession {
    let mut session = session_with(store);
    session.set_title("Customer survey");
    session
}

fn question_with_id(id: &str, order_index: usize) -> Question {
    let mut question = questions::create(KindTag::ShortText, order_index);
    question.id = QuestionId::from(id);
    question.label = id.to_uppercase();
    question
}

#[test]
fn insert_after_through_the_session() {
    let mut session = FormSession::detached(EditorSettings::default());
    let first = session.add_question(KindTag::ShortText);
    let second = session
        .insert_question_after(&first)
        .expect("first question exists");

    let view = session.view();
    assert_eq!(view.questions.len(), 2);
    assert_eq!(view.questions[1].id, second);
    assert_eq!(view.questions[1].kind_tag(), KindTag::ShortText);
    assert!(view.questions[1].label.is_empty());
    assert_eq!(view.selected, Some(second));
    assert!(view.dirty);
    assert!(view.can_undo);
    assert!(!view.can_redo);

    assert!(session
        .insert_question_after(&QuestionId::from("missing"))
        .is_none());
}

#[test]
fn no_op_intents_do_not_touch_history_or_dirty_flag() {
    let mut session = FormSession::detached(EditorSettings::default());
    let missing = QuestionId::from("missing");

    assert!(!session.delete_question(&missing));
    assert!(!session.move_question(&missing, Direction::Up));
    assert!(!session.update_question(&missing, &QuestionPatch::label("x")));
    assert!(!session.set_title(""));
    assert!(!session.can_undo());
    assert!(!session.is_dirty());

    let id = session.add_question(KindTag::Dropdown);
    assert!(!session.remove_option(&id, 0));
    assert!(!session.move_question(&id, Direction::Down));
    assert_eq!(
        session.questions()[0].options(),
        Some(&[PLACEHOLDER_OPTION.to_string()][..])
    );
}

#[test]
fn step_index_stays_in_bounds() {
    let mut session = FormSession::detached(EditorSettings::default());
    assert_eq!(session.next_step(), 0);

    let a = session.add_question(KindTag::ShortText);
    let b = session.add_question(KindTag::Email);
    let c = session.add_question(KindTag::Number);
    assert_eq!(session.go_to_step(10), 2);
    assert_eq!(session.previous_step(), 1);
    assert_eq!(session.next_step(), 2);

    session.delete_question(&c);
    assert_eq!(session.current_step(), 1);
    session.delete_question(&a);
    assert_eq!(session.current_step(), 0);
    session.delete_question(&b);
    assert_eq!(session.current_step(), 0);
    assert!(session.questions().is_empty());
}

#[test]
fn undo_and_redo_walk_structural_edits() {
    let mut session = FormSession::detached(EditorSettings::default());
    let a = session.add_question(KindTag::ShortText);
    session.add_question(KindTag::YesNo);
    let after_adds = session.questions().to_vec();

    session.move_question(&a, Direction::Down);
    assert_eq!(session.questions()[1].id, a);

    assert!(session.undo());
    assert_eq!(session.questions(), after_adds.as_slice());
    assert!(session.undo());
    assert!(session.undo());
    assert!(session.questions().is_empty());
    assert!(!session.undo());

    assert!(session.redo());
    assert!(session.redo());
    assert!(session.redo());
    assert_eq!(session.questions()[1].id, a);
    assert!(!session.redo());
}

#[test]
fn typing_coalesces_into_one_undo_step() {
    let mut session = FormSession::detached(EditorSettings::default());
    let id = session.add_question(KindTag::ShortText);

    for label in ["W", "Wh", "Wha", "What"] {
        session.update_question(&id, &QuestionPatch::label(label));
    }
    assert_eq!(session.questions()[0].label, "What");
    assert!(!session.can_redo());

    assert!(session.undo());
    assert_eq!(session.questions()[0].label, "");
    assert!(session.redo());
    assert_eq!(session.questions()[0].label, "What");
}

#[test]
fn required_toggle_is_its_own_undo_step() {
    let mut session = FormSession::detached(EditorSettings::default());
    let id = session.add_question(KindTag::ShortText);
    session.update_question(&id, &QuestionPatch::label("Name"));
    session.update_question(&id, &QuestionPatch::required(true));

    assert!(session.undo());
    assert!(!session.questions()[0].required);
    assert_eq!(session.questions()[0].label, "Name");
}

#[test]
fn logic_intents_drive_visibility_and_summary() {
    let mut session = FormSession::detached(EditorSettings::default());
    let q1 = session.add_question(KindTag::ShortText);
    session.update_question(&q1, &QuestionPatch::label("Company"));
    let q2 = session.add_question(KindTag::LongText);
    session.add_rule(&q2, LogicRule::new(q1.clone(), Operator::Answered, None));

    assert_eq!(
        session.logic_summary(&q2).as_deref(),
        Some("Company is answered")
    );
    assert_eq!(session.visible_questions(&Answers::new()), vec![q1.clone()]);

    let mut answers = Answers::new();
    answers.set(q1.clone(), "Acme");
    assert_eq!(session.visible_questions(&answers), vec![q1.clone(), q2.clone()]);

    session.delete_question(&q1);
    assert!(session.visible_questions(&answers).is_empty());
    assert_eq!(
        session.logic_summary(&q2).as_deref(),
        Some("Untitled is answered")
    );

    assert!(session.prune_dangling_rules());
    assert_eq!(session.visible_questions(&answers), vec![q2.clone()]);
    assert!(session.clear_logic(&q2));
    assert!(!session.clear_logic(&q2));
}

#[tokio::test]
async fn saved_form_drops_rules_to_questions_deleted_before_saving() {
    let store = Arc::new(TestFormStore::default());
    let mut session = titled_session(&store);
    let q1 = session.add_question(KindTag::ShortText);
    let q2 = session.add_question(KindTag::LongText);
    session.add_rule(&q2, LogicRule::new(q1.clone(), Operator::Answered, None));
    session.delete_question(&q1);

    let SaveOutcome::Saved(form_id) = session.save_now().await else {
        panic!("expected a save");
    };
    let stored = store.get(&form_id).expect("stored form");
    assert_eq!(stored.questions.len(), 1);
    assert!(stored.questions[0]
        .logic
        .as_ref()
        .map_or(true, |group| group.rules.is_empty()));
}

#[test]
fn duplicate_selects_the_copy_and_delete_clears_selection() {
    let mut session = FormSession::detached(EditorSettings::default());
    let id = session.add_question(KindTag::Rating);
    session.update_question(&id, &QuestionPatch::label("Score"));

    let copy = session.duplicate_question(&id).expect("copy");
    assert_eq!(session.selected(), Some(&copy));
    assert_eq!(session.questions()[1].label, "Score (copy)");

    session.delete_question(&copy);
    assert_eq!(session.selected(), None);
    assert!(!session.select(Some(copy)));
    assert!(session.select(Some(id.clone())));
    assert_eq!(session.selected(), Some(&id));
}

#[tokio::test]
async fn untitled_new_form_is_not_created() {
    let store = Arc::new(TestFormStore::default());
    let mut session = session_with(&store);
    session.add_question(KindTag::ShortText);

    let outcome = session.save_now().await;
    assert!(matches!(
        outcome,
        SaveOutcome::Skipped(SkipReason::MissingTitle)
    ));
    assert_eq!(store.creates(), 0);
    assert!(session.is_dirty());
    assert_eq!(session.save_state(), SaveState::Idle);
}

#[tokio::test]
async fn clean_session_skips_manual_save() {
    let store = Arc::new(TestFormStore::default());
    let mut session = session_with(&store);
    assert!(matches!(
        session.save_now().await,
        SaveOutcome::Skipped(SkipReason::Clean)
    ));
}

#[tokio::test]
async fn first_save_creates_form_and_reconciles_ids() {
    let store = Arc::new(TestFormStore::default());
    let mut session = titled_session(&store);
    let e1 = session.add_question(KindTag::ShortText);
    let e2 = session.add_question(KindTag::ShortText);
    session.add_rule(&e2, LogicRule::new(e1.clone(), Operator::Answered, None));
    let mut events = session.subscribe_events();

    let form_id = match session.save_now().await {
        SaveOutcome::Saved(form_id) => form_id,
        other => panic!("expected save, got {other:?}"),
    };
    assert_eq!(session.form_id(), Some(&form_id));
    assert!(!session.is_dirty());
    assert_eq!(session.save_state(), SaveState::Saved);
    assert_eq!(store.creates(), 1);

    let live = session.questions();
    assert!(live.iter().all(|question| !question.id.is_ephemeral()));
    assert_ne!(live[0].id, live[1].id);
    let rule = &live[1].logic.as_ref().expect("logic").rules[0];
    assert_eq!(rule.left_question_id, live[0].id);

    let stored = store.get(&form_id).expect("stored");
    assert_eq!(stored.title, "Customer survey");
    assert_eq!(stored.questions, live);

    assert_eq!(
        events.recv().await.expect("event"),
        SessionEvent::SaveStateChanged(SaveState::Saving)
    );
    assert_eq!(
        events.recv().await.expect("event"),
        SessionEvent::FormCreated(form_id.clone())
    );
    assert_eq!(
        events.recv().await.expect("event"),
        SessionEvent::Saved(form_id)
    );
}

#[tokio::test]
async fn undo_after_save_restores_permanent_ids() {
    let store = Arc::new(TestFormStore::default());
    let mut session = titled_session(&store);
    session.add_question(KindTag::ShortText);
    session.save_now().await;
    let saved_id = session.questions()[0].id.clone();
    assert!(!saved_id.is_ephemeral());

    session.add_question(KindTag::Email);
    assert!(session.undo());
    assert_eq!(session.questions().len(), 1);
    assert_eq!(session.questions()[0].id, saved_id);

    assert!(session.redo());
    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));
    assert_eq!(session.questions()[0].id, saved_id);
    let form_id = session.form_id().cloned().expect("persisted");
    assert_eq!(store.get(&form_id).expect("stored").questions.len(), 2);
}

#[tokio::test]
async fn failed_save_keeps_edits_and_retries() {
    let store = Arc::new(TestFormStore::default());
    store.set_fail_saves(true);
    let mut session = titled_session(&store);
    session.add_question(KindTag::Phone);

    let outcome = session.save_now().await;
    assert!(matches!(outcome, SaveOutcome::Failed(StoreError::Io(_))));
    assert!(session.is_dirty());
    assert_eq!(session.save_state(), SaveState::Error);
    // The form was created before the write failed and is not created again.
    assert!(session.form_id().is_some());

    store.set_fail_saves(false);
    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));
    assert_eq!(store.creates(), 1);
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn failed_create_leaves_form_unpersisted() {
    let store = Arc::new(TestFormStore::default());
    store.fail_creates.store(true, Ordering::SeqCst);
    let mut session = titled_session(&store);
    session.add_question(KindTag::Date);

    assert!(matches!(
        session.save_now().await,
        SaveOutcome::Failed(_)
    ));
    assert!(session.form_id().is_none());
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn save_finished_after_switching_forms_is_discarded() {
    let other = stored_form("Other");
    let store = Arc::new(TestFormStore::with_form(other.clone()));
    let mut session = titled_session(&store);
    session.add_question(KindTag::ShortText);

    let job = session.begin_save(true).expect("save job");
    assert!(matches!(
        session.begin_save(true),
        Err(SkipReason::InFlight)
    ));
    session.open(&other.id).await.expect("open other form");

    let result = job.run(store.as_ref()).await;
    assert!(matches!(session.finish_save(result), SaveOutcome::Discarded));
    assert_eq!(session.form_id(), Some(&other.id));
    assert!(!session.is_dirty());
    assert_eq!(session.save_state(), SaveState::Idle);
}

#[tokio::test]
async fn edits_made_while_saving_stay_dirty() {
    let store = Arc::new(TestFormStore::default());
    let mut session = titled_session(&store);
    let first = session.add_question(KindTag::ShortText);

    let job = session.begin_save(true).expect("save job");
    assert_eq!(job.questions().len(), 1);
    let late = session.add_question(KindTag::Email);

    let result = job.run(store.as_ref()).await;
    assert!(matches!(session.finish_save(result), SaveOutcome::Saved(_)));
    assert!(session.is_dirty());

    let live = session.questions();
    assert_ne!(live[0].id, first);
    assert!(!live[0].id.is_ephemeral());
    assert_eq!(live[1].id, late);
    assert!(live[1].id.is_ephemeral());
}

#[tokio::test]
async fn open_sorts_and_reindexes_questions() {
    let mut form = stored_form("Loaded");
    form.questions = vec![
        question_with_id("c", 7),
        question_with_id("a", 0),
        question_with_id("b", 3),
    ];
    let store = Arc::new(TestFormStore::with_form(form.clone()));
    let mut session = session_with(&store);
    session.add_question(KindTag::ShortText);

    session.open(&form.id).await.expect("open");
    let ids: Vec<_> = session.questions().iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(questions::is_densely_ordered(session.questions()));
    assert_eq!(session.title(), "Loaded");
    assert!(!session.is_dirty());
    assert!(!session.can_undo());
    assert_eq!(session.current_step(), 0);
}

#[tokio::test]
async fn opening_unknown_form_reports_not_found() {
    let store = Arc::new(TestFormStore::default());
    let mut session = session_with(&store);
    let err = session
        .open(&FormId::from("nope"))
        .await
        .expect_err("unknown form");
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn saving_an_opened_form_updates_it_in_place() {
    let form = stored_form("Existing");
    let store = Arc::new(TestFormStore::with_form(form.clone()));
    let mut session = session_with(&store);
    session.open(&form.id).await.expect("open");
    session.set_description("Quarterly check-in");
    session.set_published(true);

    assert!(matches!(session.save_now().await, SaveOutcome::Saved(_)));
    assert_eq!(store.creates(), 0);
    let stored = store.get(&form.id).expect("stored");
    assert_eq!(stored.description, "Quarterly check-in");
    assert!(stored.published);
    assert_eq!(stored.created_at, form.created_at);
}

#[tokio::test(start_paused = true)]
async fn timers_save_after_debounce_and_clear_saved_state() {
    let store = Arc::new(TestFormStore::default());
    let mut session = titled_session(&store);
    session.add_question(KindTag::ShortText);

    assert!(session.poll_timers().await.is_none());
    assert_eq!(store.creates(), 0);

    advance(Duration::from_millis(500)).await;
    assert!(matches!(
        session.poll_timers().await,
        Some(SaveOutcome::Saved(_))
    ));
    assert_eq!(session.save_state(), SaveState::Saved);

    advance(Duration::from_secs(2)).await;
    assert!(session.poll_timers().await.is_none());
    assert_eq!(session.save_state(), SaveState::Idle);
    assert_eq!(session.next_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn pending_text_edit_commits_after_window() {
    let mut session = FormSession::detached(EditorSettings::default());
    let id = session.add_question(KindTag::ShortText);
    session.update_question(&id, &QuestionPatch::label("First"));
    advance(Duration::from_millis(600)).await;
    session.tick(Instant::now());

    session.update_question(&id, &QuestionPatch::label("Second"));
    assert!(session.undo());
    assert_eq!(session.questions()[0].label, "First");
}

#[tokio::test(start_paused = true)]
async fn text_edits_seconds_apart_are_separate_undo_steps() {
    let mut session = FormSession::detached(EditorSettings::default());
    let id = session.add_question(KindTag::ShortText);
    session.update_question(&id, &QuestionPatch::label("First"));
    advance(Duration::from_secs(5)).await;

    session.update_question(&id, &QuestionPatch::label("Second"));
    assert!(session.undo());
    assert_eq!(session.questions()[0].label, "First");
    assert!(session.undo());
    assert_eq!(session.questions()[0].label, "");
}

#[tokio::test]
async fn form_list_is_cached_until_a_save() {
    let store = Arc::new(TestFormStore::with_form(stored_form("One")));
    let mut session = titled_session(&store);

    assert_eq!(session.list_forms().await.expect("list").len(), 1);
    assert_eq!(session.list_forms().await.expect("list").len(), 1);
    assert_eq!(store.lists(), 1);

    session.add_question(KindTag::ShortText);
    session.save_now().await;
    assert_eq!(session.list_forms().await.expect("list").len(), 2);
    assert_eq!(store.lists(), 2);
}

#[tokio::test]
async fn deleting_the_open_form_closes_it() {
    let form = stored_form("Doomed");
    let store = Arc::new(TestFormStore::with_form(form.clone()));
    let mut session = session_with(&store);
    session.open(&form.id).await.expect("open");
    let mut events = session.subscribe_events();

    session.delete_form(&form.id).await.expect("delete");
    assert_eq!(session.form_id(), None);
    assert_eq!(store.len(), 0);
    assert_eq!(events.recv().await.expect("event"), SessionEvent::Closed);

    assert!(matches!(
        session.delete_form(&form.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn detached_session_reports_save_failure() {
    let mut session = FormSession::detached(EditorSettings::default());
    session.set_title("Offline");
    session.add_question(KindTag::ShortText);

    assert!(matches!(
        session.save_now().await,
        SaveOutcome::Failed(StoreError::Io(_))
    ));
    assert_eq!(session.save_state(), SaveState::Error);
}

#[test]
fn metadata_setters_mark_dirty_without_history() {
    let mut session = FormSession::detached(EditorSettings::default());
    assert!(session.set_title("Survey"));
    assert!(!session.set_title("Survey"));
    assert!(session.set_display_settings(serde_json::json!({ "theme": "dark" })));
    assert!(session.is_dirty());
    assert!(!session.can_undo());
    assert_eq!(session.display_settings()["theme"], "dark");
}
