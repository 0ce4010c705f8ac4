use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shared::domain::{Combinator, LogicGroup, LogicRule, Operator, Question, QuestionId};

use crate::questions;

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulePatch {
    pub left_question_id: Option<QuestionId>,
    pub operator: Option<Operator>,
    pub value: Option<Option<String>>,
}

pub fn ensure_logic_group(question: &Question) -> LogicGroup {
    question.logic.clone().unwrap_or_default()
}

pub fn update_logic(
    question: &Question,
    transform: impl FnOnce(LogicGroup) -> LogicGroup,
) -> Question {
    let mut next = question.clone();
    next.logic = Some(transform(ensure_logic_group(question)));
    next
}

pub fn add_rule(mut group: LogicGroup, rule: LogicRule) -> LogicGroup {
    group.rules.push(rule);
    group
}

pub fn remove_rule(mut group: LogicGroup, index: usize) -> LogicGroup {
    if index < group.rules.len() {
        group.rules.remove(index);
    }
    group
}

pub fn update_rule(mut group: LogicGroup, index: usize, patch: &RulePatch) -> LogicGroup {
    let Some(rule) = group.rules.get_mut(index) else {
        return group;
    };
    if let Some(left) = &patch.left_question_id {
        rule.left_question_id = left.clone();
    }
    if let Some(operator) = patch.operator {
        rule.operator = operator;
    }
    if let Some(value) = &patch.value {
        rule.value = value.clone();
    }
    if !rule.operator.takes_value() {
        rule.value = None;
    }
    group
}

pub fn toggle_combinator(mut group: LogicGroup) -> LogicGroup {
    group.combinator = group.combinator.toggled();
    group
}

pub fn edit_logic(
    questions: &[Question],
    id: &QuestionId,
    transform: impl FnOnce(LogicGroup) -> LogicGroup,
) -> Vec<Question> {
    questions::edit(questions, id, |question| {
        *question = update_logic(question, transform);
    })
}

fn label_for<'a>(questions: &'a [Question], id: &QuestionId) -> &'a str {
    questions::find(questions, id)
        .map(|question| question.label.trim())
        .filter(|label| !label.is_empty())
        .unwrap_or(UNTITLED)
}

/// Human readable description of the visibility condition, e.g.
/// `Email is answered AND Age > "18"`. Empty when the question has no rules.
pub fn summarize(question: &Question, all: &[Question]) -> String {
    let group = ensure_logic_group(question);
    group
        .rules
        .iter()
        .map(|rule| {
            let subject = label_for(all, &rule.left_question_id);
            match (&rule.value, rule.operator.takes_value()) {
                (Some(value), true) => {
                    format!("{subject} {} \"{value}\"", rule.operator.phrase())
                }
                _ => format!("{subject} {}", rule.operator.phrase()),
            }
        })
        .collect::<Vec<_>>()
        .join(group.combinator.joiner())
}

pub fn is_dangling(rule: &LogicRule, owner: &Question, questions: &[Question]) -> bool {
    match questions::find(questions, &rule.left_question_id) {
        Some(left) => left.order_index >= owner.order_index,
        None => true,
    }
}

pub fn dangling_rules(owner: &Question, questions: &[Question]) -> Vec<usize> {
    owner
        .logic
        .iter()
        .flat_map(|group| group.rules.iter().enumerate())
        .filter(|(_, rule)| is_dangling(rule, owner, questions))
        .map(|(index, _)| index)
        .collect()
}

pub fn prune_dangling(questions: &[Question]) -> Vec<Question> {
    questions
        .iter()
        .map(|question| {
            let mut next = question.clone();
            if let Some(group) = next.logic.as_mut() {
                group
                    .rules
                    .retain(|rule| !is_dangling(rule, question, questions));
            }
            next
        })
        .collect()
}

pub fn eligible_sources<'a>(questions: &'a [Question], id: &QuestionId) -> Vec<&'a Question> {
    let Some(index) = questions::position(questions, id) else {
        return Vec::new();
    };
    questions[..index].iter().collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(HashMap<QuestionId, String>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: QuestionId, value: impl Into<String>) {
        self.0.insert(id, value.into());
    }

    pub fn clear(&mut self, id: &QuestionId) {
        self.0.remove(id);
    }

    pub fn get(&self, id: &QuestionId) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn is_answered(&self, id: &QuestionId) -> bool {
        self.get(id).is_some_and(|value| !value.trim().is_empty())
    }
}

impl FromIterator<(QuestionId, String)> for Answers {
    fn from_iter<I: IntoIterator<Item = (QuestionId, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct Evaluator<'a> {
    questions: &'a [Question],
    answers: &'a Answers,
}

impl<'a> Evaluator<'a> {
    pub fn new(questions: &'a [Question], answers: &'a Answers) -> Self {
        Self { questions, answers }
    }

    pub fn is_visible(&self, question: &Question) -> bool {
        match &question.logic {
            Some(group) => self.evaluate_group(question, group),
            None => true,
        }
    }

    pub fn evaluate_group(&self, owner: &Question, group: &LogicGroup) -> bool {
        if group.rules.is_empty() {
            return true;
        }
        let mut results = group
            .rules
            .iter()
            .map(|rule| self.evaluate_rule(owner, rule));
        match group.combinator {
            Combinator::All => results.all(|holds| holds),
            Combinator::Any => results.any(|holds| holds),
        }
    }

    pub fn evaluate_rule(&self, owner: &Question, rule: &LogicRule) -> bool {
        if is_dangling(rule, owner, self.questions) {
            return false;
        }
        let left = &rule.left_question_id;
        let answer = self.answers.get(left).unwrap_or_default();
        // A comparison without an operand is malformed and never holds.
        match (rule.operator, rule.value.as_deref()) {
            (Operator::Answered, _) => self.answers.is_answered(left),
            (Operator::NotAnswered, _) => !self.answers.is_answered(left),
            (_, None) => false,
            (Operator::Is, Some(value)) => answer == value,
            (Operator::IsNot, Some(value)) => answer != value,
            (Operator::Contains, Some(value)) => answer.contains(value),
            (Operator::NotContains, Some(value)) => !answer.contains(value),
            (Operator::Gt, Some(value)) => compare_numbers(answer, value, |a, b| a > b),
            (Operator::Lt, Some(value)) => compare_numbers(answer, value, |a, b| a < b),
        }
    }

    pub fn visible_questions(&self) -> Vec<&'a Question> {
        self.questions
            .iter()
            .filter(|question| self.is_visible(question))
            .collect()
    }
}

fn compare_numbers(answer: &str, value: &str, compare: impl Fn(f64, f64) -> bool) -> bool {
    match (answer.trim().parse::<f64>(), value.trim().parse::<f64>()) {
        (Ok(left), Ok(right)) if !left.is_nan() && !right.is_nan() => compare(left, right),
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/logic_tests.rs"]
mod tests;
