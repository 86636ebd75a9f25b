//! Prompt Assembler: builds the ordered list of prompt sections the LLM
//! Engine sends to a provider, each flagged with a cacheability hint.

/// "ephemeral" = cache this prefix on the provider side if the transport
/// supports prompt-prefix caching, otherwise ignore and concatenate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    Ephemeral,
    Volatile,
}

#[derive(Debug, Clone)]
pub struct PromptSection {
    pub name: &'static str,
    pub text: String,
    pub cacheability: Cacheability,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Fixed ontology text: the ten node types, six edge types, Format E
/// syntax, and modification rules. Treated as an opaque, cacheable prompt
/// section — its exact wording is a methodology concern out of this
/// crate's scope.
pub const ONTOLOGY_SPEC: &str = include_str!("../prompts/ontology.md");

pub struct PromptAssembler {
    methodology_guide: String,
    chat_history_limit: usize,
}

impl PromptAssembler {
    pub fn new(methodology_guide: impl Into<String>) -> Self {
        Self {
            methodology_guide: methodology_guide.into(),
            chat_history_limit: 20,
        }
    }

    pub fn with_chat_history_limit(mut self, limit: usize) -> Self {
        self.chat_history_limit = limit;
        self
    }

    /// Assemble the section list for one turn. `graph_text` is either a
    /// full Format E snapshot or a slice serialization, whichever the
    /// caller's Context Slicer decision produced.
    pub fn assemble(&self, graph_text: &str, chat_history: Option<&[ChatMessage]>) -> Vec<PromptSection> {
        let mut sections = vec![
            PromptSection {
                name: "ontology",
                text: ONTOLOGY_SPEC.to_string(),
                cacheability: Cacheability::Ephemeral,
            },
            PromptSection {
                name: "methodology",
                text: self.methodology_guide.clone(),
                cacheability: Cacheability::Ephemeral,
            },
            PromptSection {
                name: "graph_state",
                text: graph_text.to_string(),
                cacheability: Cacheability::Ephemeral,
            },
        ];

        if let Some(history) = chat_history {
            let start = history.len().saturating_sub(self.chat_history_limit);
            let rendered = history[start..]
                .iter()
                .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
                .collect::<Vec<_>>()
                .join("\n");
            if !rendered.is_empty() {
                sections.push(PromptSection {
                    name: "chat_history",
                    text: rendered,
                    cacheability: Cacheability::Ephemeral,
                });
            }
        }

        sections
    }

    /// Concatenate sections verbatim, ignoring cacheability — the fallback
    /// a provider transport with no prompt-caching primitive uses.
    pub fn concatenate(sections: &[PromptSection]) -> String {
        sections.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_always_includes_ontology_methodology_and_graph_state() {
        let assembler = PromptAssembler::new("decompose top-down");
        let sections = assembler.assemble("## SYS\n- A.SYS.001 :: x\n", None);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].name, "ontology");
        assert_eq!(sections[1].name, "methodology");
        assert_eq!(sections[2].name, "graph_state");
    }

    #[test]
    fn chat_history_is_truncated_to_limit_and_rendered_as_role_colon_text() {
        let assembler = PromptAssembler::new("guide").with_chat_history_limit(1);
        let history = vec![
            ChatMessage { role: "user".into(), content: "first".into() },
            ChatMessage { role: "assistant".into(), content: "second".into() },
        ];
        let sections = assembler.assemble("graph", Some(&history));
        let chat_section = sections.iter().find(|s| s.name == "chat_history").unwrap();
        assert_eq!(chat_section.text, "ASSISTANT: second");
    }

    #[test]
    fn empty_chat_history_adds_no_section() {
        let assembler = PromptAssembler::new("guide");
        let sections = assembler.assemble("graph", Some(&[]));
        assert!(sections.iter().all(|s| s.name != "chat_history"));
    }
}
