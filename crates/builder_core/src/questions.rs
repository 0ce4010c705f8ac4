use shared::domain::{FieldKind, KindTag, LibraryRef, LogicGroup, Question, QuestionId};

pub const COPY_SUFFIX: &str = " (copy)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionPatch {
    pub label: Option<String>,
    pub description: Option<Option<String>>,
    pub placeholder: Option<Option<String>>,
    pub required: Option<bool>,
    pub logic: Option<Option<LogicGroup>>,
    pub library_ref: Option<Option<LibraryRef>>,
    pub validation: Option<Option<serde_json::Value>>,
}

impl QuestionPatch {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn description(description: Option<String>) -> Self {
        Self {
            description: Some(description),
            ..Self::default()
        }
    }

    pub fn placeholder(placeholder: Option<String>) -> Self {
        Self {
            placeholder: Some(placeholder),
            ..Self::default()
        }
    }

    pub fn required(required: bool) -> Self {
        Self {
            required: Some(required),
            ..Self::default()
        }
    }

    pub fn is_text_only(&self) -> bool {
        let touches_text =
            self.label.is_some() || self.description.is_some() || self.placeholder.is_some();
        touches_text
            && self.required.is_none()
            && self.logic.is_none()
            && self.library_ref.is_none()
            && self.validation.is_none()
    }

    fn apply(&self, question: &mut Question) {
        if let Some(label) = &self.label {
            question.label = label.clone();
        }
        if let Some(description) = &self.description {
            question.description = description.clone();
        }
        if let Some(placeholder) = &self.placeholder {
            question.placeholder = placeholder.clone();
        }
        if let Some(required) = self.required {
            question.required = required;
        }
        if let Some(logic) = &self.logic {
            question.logic = logic.clone();
        }
        if let Some(library_ref) = &self.library_ref {
            question.library_ref = library_ref.clone();
        }
        if let Some(validation) = &self.validation {
            question.validation = validation.clone();
        }
    }
}

pub fn create(kind: KindTag, order_index: usize) -> Question {
    Question::new(
        QuestionId::ephemeral(),
        FieldKind::from_tag(kind, None),
        order_index,
    )
}

pub fn position(questions: &[Question], id: &QuestionId) -> Option<usize> {
    questions.iter().position(|question| &question.id == id)
}

pub fn find<'a>(questions: &'a [Question], id: &QuestionId) -> Option<&'a Question> {
    questions.iter().find(|question| &question.id == id)
}

pub fn reindex(questions: &mut [Question]) {
    for (index, question) in questions.iter_mut().enumerate() {
        question.order_index = index;
    }
}

pub fn is_densely_ordered(questions: &[Question]) -> bool {
    questions
        .iter()
        .enumerate()
        .all(|(index, question)| question.order_index == index)
}

fn finish(mut questions: Vec<Question>) -> Vec<Question> {
    reindex(&mut questions);
    questions
}

pub fn append(questions: &[Question], kind: KindTag) -> Vec<Question> {
    append_question(questions, create(kind, questions.len()))
}

pub fn append_question(questions: &[Question], question: Question) -> Vec<Question> {
    let mut next = questions.to_vec();
    next.push(question);
    finish(next)
}

pub fn insert_question_after(
    questions: &[Question],
    after_id: &QuestionId,
    question: Question,
) -> Vec<Question> {
    let Some(index) = position(questions, after_id) else {
        return questions.to_vec();
    };
    let mut next = questions.to_vec();
    next.insert(index + 1, question);
    finish(next)
}

pub fn insert_after(questions: &[Question], after_id: &QuestionId) -> Vec<Question> {
    insert_question_after(questions, after_id, create(KindTag::ShortText, 0))
}

pub fn update(questions: &[Question], id: &QuestionId, patch: &QuestionPatch) -> Vec<Question> {
    edit(questions, id, |question| patch.apply(question))
}

pub fn change_kind(questions: &[Question], id: &QuestionId, kind: KindTag) -> Vec<Question> {
    edit(questions, id, |question| {
        if question.kind.tag() == kind {
            return;
        }
        let carried = question.kind.options().cloned();
        question.kind = FieldKind::from_tag(kind, carried);
    })
}

/// Removes the question. Rules elsewhere that pointed at it stay in place and
/// become dangling; see [`crate::logic::prune_dangling`].
pub fn remove(questions: &[Question], id: &QuestionId) -> Vec<Question> {
    if position(questions, id).is_none() {
        return questions.to_vec();
    }
    finish(
        questions
            .iter()
            .filter(|question| &question.id != id)
            .cloned()
            .collect(),
    )
}

pub fn duplicate(questions: &[Question], id: &QuestionId) -> Vec<Question> {
    let Some(source) = find(questions, id) else {
        return questions.to_vec();
    };
    let mut copy = source.clone();
    copy.id = QuestionId::ephemeral();
    copy.label = format!("{}{COPY_SUFFIX}", source.label);
    insert_question_after(questions, id, copy)
}

pub fn move_question(questions: &[Question], id: &QuestionId, direction: Direction) -> Vec<Question> {
    let Some(index) = position(questions, id) else {
        return questions.to_vec();
    };
    let target = match direction {
        Direction::Up => index.checked_sub(1),
        Direction::Down => Some(index + 1).filter(|target| *target < questions.len()),
    };
    let Some(target) = target else {
        return questions.to_vec();
    };
    let mut next = questions.to_vec();
    next.swap(index, target);
    finish(next)
}

pub fn add_option(questions: &[Question], id: &QuestionId, text: Option<String>) -> Vec<Question> {
    edit(questions, id, |question| {
        if let Some(options) = question.kind.options_mut() {
            let text = text.unwrap_or_else(|| format!("Option {}", options.len() + 1));
            options.push(text);
        }
    })
}

pub fn set_option(
    questions: &[Question],
    id: &QuestionId,
    index: usize,
    text: impl Into<String>,
) -> Vec<Question> {
    let text = text.into();
    edit(questions, id, |question| {
        if let Some(options) = question.kind.options_mut() {
            options.set(index, text);
        }
    })
}

pub fn remove_option(questions: &[Question], id: &QuestionId, index: usize) -> Vec<Question> {
    edit(questions, id, |question| {
        if let Some(options) = question.kind.options_mut() {
            options.remove(index);
        }
    })
}

pub(crate) fn edit(
    questions: &[Question],
    id: &QuestionId,
    change: impl FnOnce(&mut Question),
) -> Vec<Question> {
    let mut next = questions.to_vec();
    if let Some(question) = next.iter_mut().find(|question| &question.id == id) {
        change(question);
    }
    finish(next)
}

#[cfg(test)]
#[path = "tests/questions_tests.rs"]
mod tests;
