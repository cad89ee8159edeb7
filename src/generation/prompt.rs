//! Chat prompt for grounded answering

use serde::{Deserialize, Serialize};

use crate::passage::RankedResultSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Number the passages as `[n] (source — section)` blocks
pub fn format_passages(passages: &RankedResultSet) -> String {
    passages
        .passages()
        .enumerate()
        .map(|(i, p)| {
            let source = if p.source.is_empty() {
                "bilinmeyen kaynak"
            } else {
                p.source.as_str()
            };
            let header = match &p.section {
                Some(section) => format!("[{}] ({} — {})", i + 1, source, section),
                None => format!("[{}] ({})", i + 1, source),
            };
            format!("{}\n{}", header, p.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System + user messages for one question
///
/// The model is told to answer only from the numbered documents and to
/// reply with `refusal` when they do not contain the answer.
pub fn build_messages(query: &str, passages: &RankedResultSet, refusal: &str) -> Vec<ChatMessage> {
    let system = format!(
        "Sen bir İK asistanısın. \
         Yalnızca aşağıdaki numaralı dokümanlardan alıntı yaparak cevap ver \
         ve kullandığın dokümanın numarasını [n] biçiminde belirt. \
         Eğer cevap dokümanlarda yoksa yalnızca '{}' de. \
         Asla yeni bilgi uydurma.",
        refusal
    );
    let user = format!(
        "Soru: {}\n\nDokümanlar:\n{}",
        query.trim(),
        format_passages(passages)
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::Passage;

    fn passages() -> RankedResultSet {
        RankedResultSet::from_ordered(vec![
            (
                Passage::new("Yıllık izin 14 gündür.", "izin.md").with_section("3.1 Yıllık İzin"),
                0.9,
            ),
            (Passage::new("Maaş ayın 15'inde ödenir.", ""), 0.5),
        ])
    }

    #[test]
    fn test_format_passages_numbers_and_cites() {
        let text = format_passages(&passages());
        assert!(text.starts_with("[1] (izin.md — 3.1 Yıllık İzin)\nYıllık izin 14 gündür."));
        assert!(text.contains("[2] (bilinmeyen kaynak)\nMaaş"));
    }

    #[test]
    fn test_build_messages_carries_refusal_and_question() {
        let messages = build_messages("  İzin kaç gün?  ", &passages(), "Bilmiyorum");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("'Bilmiyorum'"));
        assert!(messages[1].content.starts_with("Soru: İzin kaç gün?\n\nDokümanlar:\n[1]"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("merhaba")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"merhaba"}"#);
    }
}
