use std::collections::HashMap;

use shared::domain::{Question, QuestionId};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping(HashMap<QuestionId, QuestionId>);

impl IdMapping {
    pub fn get(&self, ephemeral: &QuestionId) -> Option<&QuestionId> {
        self.0.get(ephemeral)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &QuestionId)> {
        self.0.iter()
    }

    fn resolve(&self, id: &QuestionId) -> QuestionId {
        self.0.get(id).cloned().unwrap_or_else(|| id.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub questions: Vec<Question>,
    pub minted: IdMapping,
}

pub fn needs_reconciliation(questions: &[Question]) -> bool {
    questions.iter().any(|question| question.id.is_ephemeral())
}

pub fn reconcile(questions: &[Question]) -> Reconciliation {
    Reconciler::default().reconcile(questions)
}

/// Remembers every id it has minted, so the same ephemeral id always maps to
/// the same permanent id for the lifetime of an editing session.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    issued: IdMapping,
}

impl Reconciler {
    pub fn reconcile(&mut self, questions: &[Question]) -> Reconciliation {
        let mut minted = IdMapping::default();
        for question in questions {
            if question.id.is_ephemeral() && self.issued.get(&question.id).is_none() {
                let permanent = QuestionId::permanent();
                minted.0.insert(question.id.clone(), permanent.clone());
                self.issued.0.insert(question.id.clone(), permanent);
            }
        }
        if !minted.is_empty() {
            debug!("reconcile: minted {} permanent question ids", minted.len());
        }
        let mut questions = self.remap(questions);
        let dropped = drop_unsaved_references(&mut questions);
        if dropped > 0 {
            debug!("reconcile: dropped {dropped} rules referencing unsaved deleted questions");
        }
        Reconciliation { questions, minted }
    }

    pub fn remap(&self, questions: &[Question]) -> Vec<Question> {
        if self.issued.is_empty() {
            return questions.to_vec();
        }
        questions
            .iter()
            .map(|question| {
                let mut next = question.clone();
                next.id = self.issued.resolve(&question.id);
                if let Some(group) = next.logic.as_mut() {
                    for rule in &mut group.rules {
                        rule.left_question_id = self.issued.resolve(&rule.left_question_id);
                    }
                }
                next
            })
            .collect()
    }

    pub fn resolve(&self, id: &QuestionId) -> QuestionId {
        self.issued.resolve(id)
    }

    pub fn issued(&self) -> &IdMapping {
        &self.issued
    }
}

// Ephemeral ids left after minting belong to questions deleted before their
// first save.
fn drop_unsaved_references(questions: &mut [Question]) -> usize {
    let mut dropped = 0;
    for question in questions {
        if let Some(group) = question.logic.as_mut() {
            let before = group.rules.len();
            group
                .rules
                .retain(|rule| !rule.left_question_id.is_ephemeral());
            dropped += before - group.rules.len();
        }
    }
    dropped
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
