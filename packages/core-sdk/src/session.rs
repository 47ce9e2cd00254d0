use crate::models::Message;

/**
 * \brief Append-only conversation transcript for one interactive session.
 */
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /**
     * \brief Start a transcript, seeded with a system message when the prompt is non-empty.
     */
    pub fn new(system_prompt: Option<&str>) -> Self {
        let messages = system_prompt
            .filter(|p| !p.is_empty())
            .map(|p| vec![Message::system(p)])
            .unwrap_or_default();
        Self { messages }
    }

    /**
     * \brief Context to send for a new user turn; the transcript itself is not touched.
     */
    pub fn with_user(&self, content: &str) -> Vec<Message> {
        let mut context = self.messages.clone();
        context.push(Message::user(content));
        context
    }

    /**
     * \brief Record a completed turn.
     */
    pub fn commit_turn(&mut self, user: &str, assistant: &str) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_commit() {
        let mut transcript = Transcript::new(Some("Be brief."));
        assert_eq!(transcript.messages(), &[Message::system("Be brief.")]);

        let context = transcript.with_user("hi");
        assert_eq!(context.len(), 2);
        assert_eq!(transcript.len(), 1);

        transcript.commit_turn("hi", "hello");
        assert_eq!(
            transcript.messages(),
            &[
                Message::system("Be brief."),
                Message::user("hi"),
                Message::assistant("hello"),
            ]
        );
    }

    #[test]
    fn test_empty_system_prompt_is_skipped() {
        assert!(Transcript::new(Some("")).is_empty());
        assert!(Transcript::new(None).is_empty());
    }
}
