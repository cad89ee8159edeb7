//! Labeled question set (JSONL)

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// One labeled question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalQuestion {
    #[serde(alias = "Question")]
    pub question: String,
    /// Source document expected among the retrieved passages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_section: Option<String>,
    #[serde(default = "default_answerable")]
    pub answerable: bool,
    /// Comma-separated keywords a grounded answer should contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_keywords: Option<String>,
}

fn default_answerable() -> bool {
    true
}

impl EvalQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            expected_doc: None,
            expected_section: None,
            answerable: true,
            anchor_keywords: None,
        }
    }

    pub fn keywords(&self) -> Vec<String> {
        self.anchor_keywords
            .as_deref()
            .map(parse_anchor_keywords)
            .unwrap_or_default()
    }
}

/// Split on commas, trim whitespace and quotes, drop empties
pub fn parse_anchor_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|kw| kw.trim_matches(|c: char| c.is_whitespace() || c == '\'' || c == '"'))
        .filter(|kw| !kw.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    pub questions: Vec<EvalQuestion>,
}

impl QuestionSet {
    /// Load a JSONL question set
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RagError::QuestionSet(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| RagError::QuestionSet(format!("{}: {}", path.display(), e)))
    }

    /// Parse JSONL content; blank lines are ignored
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut questions = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let question: EvalQuestion =
                serde_json::from_str(line).map_err(|e| format!("line {}: {}", i + 1, e))?;
            questions.push(question);
        }
        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
