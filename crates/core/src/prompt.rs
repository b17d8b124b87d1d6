//! Prompt assembly: plain string interpolation of context, question and
//! answering instructions.

use serde::{Deserialize, Serialize};

pub const NO_RELEVANT_CONTENT_NOTICE: &str =
    "No passage relevant to the question was found in the supplied documents.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    /// Document content, the question, and a request to answer from it.
    #[default]
    Basic,
    /// Side-by-side comparison of several documents, answered as a table.
    Comparison,
}

/// What the prompt carries as document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptContext<'a> {
    Text(&'a str),
    NoRelevantContent,
}

pub fn compose(
    template: PromptTemplate,
    context: PromptContext<'_>,
    question: &str,
    document_names: &[&str],
) -> String {
    let context = match context {
        PromptContext::Text(text) => text,
        PromptContext::NoRelevantContent => NO_RELEVANT_CONTENT_NOTICE,
    };

    match template {
        PromptTemplate::Basic => basic(context, question),
        PromptTemplate::Comparison => comparison(context, question, document_names),
    }
}

fn basic(context: &str, question: &str) -> String {
    format!(
        "Document content:\n{context}\n\nQuestion: {question}\n\n\
         Answer the question based on the document content above. \
         If the content does not cover it, say so instead of guessing.\n"
    )
}

fn comparison(context: &str, question: &str, document_names: &[&str]) -> String {
    let files = if document_names.is_empty() {
        "(none)".to_string()
    } else {
        document_names.join(", ")
    };

    format!(
        "You are an expert analyst comparing the terms of several documents.\n\n\
         Documents under analysis:\n{files}\n\n\
         Supplied document content:\n{context}\n\n\
         Question:\n{question}\n\n\
         Answer format:\n\
         1. Start with a Markdown table: one row per item, one column per document, plus a notes column.\n\
         2. Highlight the key differences (amounts, coverage, riders) in bold.\n\
         3. Never invent content that is not in the documents; write \"not stated\" where a document is silent.\n\
         4. Below the table, summarise the three most important insights and anything a reader should watch out for.\n\n\
         Begin your answer:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_prompt_carries_context_and_question() {
        let prompt = compose(
            PromptTemplate::Basic,
            PromptContext::Text("Fever is a symptom of flu."),
            "what causes fever?",
            &[],
        );
        assert!(prompt.contains("Fever is a symptom of flu."));
        assert!(prompt.contains("Question: what causes fever?"));
    }

    #[test]
    fn missing_context_is_stated_explicitly() {
        let prompt = compose(
            PromptTemplate::Basic,
            PromptContext::NoRelevantContent,
            "anything?",
            &[],
        );
        assert!(prompt.contains(NO_RELEVANT_CONTENT_NOTICE));
    }

    #[test]
    fn comparison_lists_documents() {
        let prompt = compose(
            PromptTemplate::Comparison,
            PromptContext::Text("terms"),
            "compare surgery benefits",
            &["insurer-a.pdf", "insurer-b.pdf"],
        );
        assert!(prompt.contains("insurer-a.pdf, insurer-b.pdf"));
        assert!(prompt.contains("Markdown table"));
    }
}
