//! Questionnaire storage
//!
//! A DSTU2 questionnaire is flattened into one row per group and per question. Each row
//! points at its parent (questionnaire, group or question) and keeps its position among
//! its siblings, so the tree can be rebuilt in the submitted order.

use rdr_fhir_models::{Question, Questionnaire, QuestionnaireGroup};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::Store,
    models::{QuestionRow, QuestionnaireGroupRow, QuestionnaireRow},
    Error, Result,
};

/// Rows produced from one questionnaire
#[derive(Debug, Default)]
pub struct FlattenedQuestionnaire {
    pub questionnaire: Option<QuestionnaireRow>,
    pub groups: Vec<QuestionnaireGroupRow>,
    pub questions: Vec<QuestionRow>,
}

fn new_row_id() -> String {
    Uuid::new_v4().to_string()
}

fn node_json<T: serde::Serialize>(node: &T) -> Result<JsonValue> {
    serde_json::to_value(node)
        .map_err(|e| Error::Internal(format!("Failed to serialize questionnaire node: {e}")))
}

struct Flattener<'a> {
    questionnaire_id: &'a str,
    rows: FlattenedQuestionnaire,
}

impl Flattener<'_> {
    fn group(&mut self, group: &QuestionnaireGroup, parent_id: &str, ordinal: i32) -> Result<()> {
        let group_id = new_row_id();
        let data = node_json(&QuestionnaireGroup {
            group: Vec::new(),
            question: Vec::new(),
            ..group.clone()
        })?;
        self.rows.groups.push(QuestionnaireGroupRow {
            questionnaire_id: self.questionnaire_id.to_string(),
            group_id: group_id.clone(),
            parent_id: parent_id.to_string(),
            ordinal,
            data,
        });
        for (i, child) in group.group.iter().enumerate() {
            self.group(child, &group_id, i as i32)?;
        }
        for (i, question) in group.question.iter().enumerate() {
            self.question(question, &group_id, i as i32)?;
        }
        Ok(())
    }

    fn question(&mut self, question: &Question, parent_id: &str, ordinal: i32) -> Result<()> {
        let question_id = new_row_id();
        let data = node_json(&Question {
            group: Vec::new(),
            ..question.clone()
        })?;
        self.rows.questions.push(QuestionRow {
            questionnaire_id: self.questionnaire_id.to_string(),
            question_id: question_id.clone(),
            parent_id: parent_id.to_string(),
            ordinal,
            data,
        });
        for (i, child) in question.group.iter().enumerate() {
            self.group(child, &question_id, i as i32)?;
        }
        Ok(())
    }
}

/// Validate a submitted questionnaire and split it into rows.
///
/// The questionnaire gets a fresh id when it has none.
pub fn flatten_questionnaire(resource: &JsonValue) -> Result<FlattenedQuestionnaire> {
    let mut resource = resource.clone();
    if let Some(groups) = resource.get("group").and_then(JsonValue::as_array).cloned() {
        if groups.len() > 1 {
            return Err(Error::BadRequest(
                "Questionnaire may only have one root group".to_string(),
            ));
        }
        if let Some(object) = resource.as_object_mut() {
            match groups.into_iter().next() {
                Some(root) => object.insert("group".to_string(), root),
                None => object.remove("group"),
            };
        }
    }

    let mut questionnaire = Questionnaire::from_value(&resource)?;
    let questionnaire_id = questionnaire.id.take().unwrap_or_else(new_row_id);
    let root = questionnaire.group.take();

    let mut flattener = Flattener {
        questionnaire_id: &questionnaire_id,
        rows: FlattenedQuestionnaire::default(),
    };
    if let Some(root) = &root {
        flattener.group(root, &questionnaire_id, 0)?;
    }

    let mut rows = flattener.rows;
    rows.questionnaire = Some(QuestionnaireRow {
        questionnaire_id: questionnaire_id.clone(),
        resource: questionnaire.to_value()?,
    });
    Ok(rows)
}

fn children<'a, T>(rows: &'a [T], parent_id: &str, parent: impl Fn(&T) -> (&str, i32)) -> Vec<&'a T> {
    let mut found: Vec<&T> = rows.iter().filter(|row| parent(*row).0 == parent_id).collect();
    found.sort_by_key(|row| parent(*row).1);
    found
}

struct Assembler<'a> {
    groups: &'a [QuestionnaireGroupRow],
    questions: &'a [QuestionRow],
}

impl Assembler<'_> {
    fn group(&self, row: &QuestionnaireGroupRow) -> Result<QuestionnaireGroup> {
        let mut group: QuestionnaireGroup = serde_json::from_value(row.data.clone())
            .map_err(|e| Error::Internal(format!("Stored questionnaire group is invalid: {e}")))?;
        group.group = children(self.groups, &row.group_id, |g| (g.parent_id.as_str(), g.ordinal))
            .into_iter()
            .map(|child| self.group(child))
            .collect::<Result<_>>()?;
        group.question = children(self.questions, &row.group_id, |q| (q.parent_id.as_str(), q.ordinal))
            .into_iter()
            .map(|question| self.question(question))
            .collect::<Result<_>>()?;
        Ok(group)
    }

    fn question(&self, row: &QuestionRow) -> Result<Question> {
        let mut question: Question = serde_json::from_value(row.data.clone())
            .map_err(|e| Error::Internal(format!("Stored question is invalid: {e}")))?;
        question.group = children(self.groups, &row.question_id, |g| (g.parent_id.as_str(), g.ordinal))
            .into_iter()
            .map(|child| self.group(child))
            .collect::<Result<_>>()?;
        Ok(question)
    }
}

/// Rebuild the questionnaire document from its rows
pub fn assemble_questionnaire(
    questionnaire: &QuestionnaireRow,
    groups: &[QuestionnaireGroupRow],
    questions: &[QuestionRow],
) -> Result<JsonValue> {
    let mut assembled = Questionnaire::from_value(&questionnaire.resource)?;
    assembled.id = Some(questionnaire.questionnaire_id.clone());

    let assembler = Assembler { groups, questions };
    let roots = children(groups, &questionnaire.questionnaire_id, |g| (g.parent_id.as_str(), g.ordinal));
    assembled.group = match roots.as_slice() {
        [] => None,
        [root] => Some(assembler.group(root)?),
        _ => {
            return Err(Error::Internal(format!(
                "Questionnaire {} has more than one root group",
                questionnaire.questionnaire_id
            )))
        }
    };
    Ok(assembled.to_value()?)
}

pub struct QuestionnaireService {
    store: Arc<dyn Store>,
}

impl QuestionnaireService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, resource: &JsonValue) -> Result<JsonValue> {
        let rows = flatten_questionnaire(resource)?;
        let questionnaire = rows
            .questionnaire
            .ok_or_else(|| Error::Internal("Flattened questionnaire has no header".to_string()))?;

        let mut tx = self.store.begin().await?;
        tx.insert_questionnaire(&questionnaire, &rows.groups, &rows.questions)
            .await?;
        tx.commit().await?;

        tracing::info!(
            questionnaire_id = %questionnaire.questionnaire_id,
            groups = rows.groups.len(),
            questions = rows.questions.len(),
            "Stored questionnaire"
        );
        assemble_questionnaire(&questionnaire, &rows.groups, &rows.questions)
    }

    pub async fn get(&self, questionnaire_id: &str) -> Result<JsonValue> {
        let mut tx = self.store.begin().await?;
        let stored = tx.get_questionnaire(questionnaire_id).await?;
        tx.rollback().await?;

        let (questionnaire, groups, questions) = stored.ok_or_else(|| {
            Error::NotFound(format!("Questionnaire {questionnaire_id} not found"))
        })?;
        assemble_questionnaire(&questionnaire, &groups, &questions)
    }
}
