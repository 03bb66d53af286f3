use serde::Serialize;

use crate::chat::{Message, Role};

pub const DEFAULT_CONTEXT_TURNS: usize = 5;

/// A question with the query and reply it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub question: String,
    /// Empty when the turn was answered without a query
    pub query: String,
    pub response: String,
}

/// Rebuilds the last `last_n` turns from a session's message log.
///
/// Messages are read in fixed user/assistant pairs from the start of the log.
/// A pair whose roles are not exactly user then assistant contributes nothing,
/// and a trailing user message without a reply is ignored. Sessions whose
/// roles drift out of alternation therefore lose the misaligned messages.
pub fn build_context(history: &[Message], last_n: usize) -> Vec<ConversationTurn> {
    if history.len() < 2 {
        return Vec::new();
    }

    let turns: Vec<ConversationTurn> = history
        .chunks_exact(2)
        .filter_map(|pair| match (&pair[0], &pair[1]) {
            (user, assistant) if user.role == Role::User && assistant.role == Role::Assistant => {
                Some(ConversationTurn {
                    question: user.content.clone(),
                    query: assistant.metadata.query.clone().unwrap_or_default(),
                    response: assistant.content.clone(),
                })
            }
            _ => None,
        })
        .collect();

    let skip = turns.len().saturating_sub(last_n);
    turns.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageMetadata;

    fn message(id: i64, role: Role, content: &str, query: Option<&str>) -> Message {
        Message {
            id,
            session_id: 1,
            role,
            content: content.to_string(),
            metadata: MessageMetadata {
                query: query.map(str::to_string),
                ..MessageMetadata::default()
            },
            created_at: chrono::Utc::now(),
        }
    }

    fn alternating(pairs: usize) -> Vec<Message> {
        (0..pairs)
            .flat_map(|i| {
                let i = i as i64;
                [
                    message(i * 2, Role::User, &format!("q{}", i), None),
                    message(i * 2 + 1, Role::Assistant, &format!("a{}", i), Some(&format!("SELECT {}", i))),
                ]
            })
            .collect()
    }

    #[test]
    fn fewer_than_two_messages_is_empty() {
        assert!(build_context(&[], 5).is_empty());
        assert!(build_context(&[message(1, Role::User, "hi", None)], 5).is_empty());
    }

    #[test]
    fn alternating_history_yields_one_turn_per_pair() {
        let turns = build_context(&alternating(3), 5);

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].question, "q0");
        assert_eq!(turns[2].query, "SELECT 2");
    }

    #[test]
    fn keeps_only_the_most_recent_turns_in_order() {
        let turns = build_context(&alternating(8), 5);

        let questions: Vec<&str> = turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q3", "q4", "q5", "q6", "q7"]);
    }

    #[test]
    fn reconstructs_stored_turn_exactly() {
        let history = vec![
            message(1, Role::User, "X", None),
            message(2, Role::Assistant, "Z", Some("Y")),
        ];

        assert_eq!(
            build_context(&history, DEFAULT_CONTEXT_TURNS),
            vec![ConversationTurn {
                question: "X".to_string(),
                query: "Y".to_string(),
                response: "Z".to_string(),
            }]
        );
    }

    #[test]
    fn missing_query_becomes_empty_string() {
        let history = vec![
            message(1, Role::User, "hello", None),
            message(2, Role::Assistant, "hi there", None),
        ];
        assert_eq!(build_context(&history, 5)[0].query, "");
    }

    #[test]
    fn trailing_user_message_is_ignored() {
        let mut history = alternating(2);
        history.push(message(10, Role::User, "pending", None));

        let turns = build_context(&history, 5);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].question, "q1");
    }

    #[test]
    fn misaligned_roles_drop_pairs_silently() {
        // user, user, assistant, user, assistant: pairs (0,1) and (2,3) are both invalid
        let history = vec![
            message(1, Role::User, "first", None),
            message(2, Role::User, "second", None),
            message(3, Role::Assistant, "reply", None),
            message(4, Role::User, "third", None),
            message(5, Role::Assistant, "reply 2", None),
        ];

        assert!(build_context(&history, 5).is_empty());
    }
}
