//! Stored questionnaire rows
//!
//! A questionnaire is stored as a header row plus one row per group and per question.
//! Each row carries the JSON of its node without the node's children.

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireRow {
    pub questionnaire_id: String,
    /// The questionnaire without `id` and `group`
    pub resource: JsonValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireGroupRow {
    pub questionnaire_id: String,
    pub group_id: String,
    /// Questionnaire id, group id or question id
    pub parent_id: String,
    pub ordinal: i32,
    pub data: JsonValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    pub questionnaire_id: String,
    pub question_id: String,
    pub parent_id: String,
    pub ordinal: i32,
    pub data: JsonValue,
}
