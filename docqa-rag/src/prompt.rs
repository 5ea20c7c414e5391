//! Grounded prompt construction.

use crate::document::SearchResult;
use crate::error::{RagError, Result};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

const GROUNDED_QA_TEMPLATE: &str = "Use the following pieces of information to answer the user's question.
If you don't know the answer, just say that you don't know, don't try to make up an answer.

Context: {context}
Question: {question}

Only return the helpful answer below and nothing else.
Helpful answer:
";

/// A versioned prompt template with `{context}` and `{question}` placeholders.
///
/// Substitution is a single literal pass over the template: braces inside the
/// substituted context or question are copied verbatim and never expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    version: String,
    template: String,
}

impl PromptTemplate {
    /// The default template: answer only from the context, admit ignorance otherwise.
    pub fn grounded_qa() -> Self {
        Self { version: "grounded-qa/v1".to_string(), template: GROUNDED_QA_TEMPLATE.to_string() }
    }

    /// Create a custom template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if either placeholder is missing.
    pub fn new(version: impl Into<String>, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::ConfigError(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { version: version.into(), template })
    }

    /// The template version identifier.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The raw template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitute `context` and `question` into the template.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Render a prompt from retrieved chunks and the user question.
    pub fn build(&self, context: &[SearchResult], question: &str) -> String {
        self.render(&format_context(context), question)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::grounded_qa()
    }
}

/// Join retrieved chunk texts, most relevant first, separated by blank lines.
pub fn format_context(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n")
}
