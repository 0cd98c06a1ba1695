//! Prompt templates for answering and summarizing.

/// Separator placed between context chunks and between chunk summaries.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// A question-answering prompt and how much retrieved context made it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagPrompt {
    pub text: String,
    /// Number of leading context chunks included.
    pub chunks_used: usize,
}

/// Build the grounded question-answering prompt.
///
/// `context` is in rank order, closest first. Chunks are added while the
/// joined context stays within `max_context_chars` characters; the first
/// chunk is always kept even if it alone exceeds the budget.
pub fn rag_prompt(
    question: &str,
    context: &[&str],
    persona: Option<&str>,
    max_context_chars: usize,
) -> RagPrompt {
    let separator_len = SECTION_SEPARATOR.chars().count();
    let mut used = 0;
    let mut total = 0;
    for chunk in context {
        let len = chunk.chars().count() + if used > 0 { separator_len } else { 0 };
        if used > 0 && total + len > max_context_chars {
            break;
        }
        total += len;
        used += 1;
    }
    let context_str = context[..used].join(SECTION_SEPARATOR);

    let persona_instruction = match persona.map(str::trim).filter(|p| !p.is_empty()) {
        Some(persona) => format!("Please answer from the perspective of {persona}. "),
        None => String::new(),
    };

    let text = format!(
        "You are InsightLens, an expert AI assistant. Your task is to answer the user's question \
         based *solely* on the provided context.\n\
         If the information to answer the question is not present in the context, clearly state \
         that you cannot answer based on the provided information.\n\
         Do not make up information or answer from your general knowledge if it's not supported \
         by the context.\n\
         {persona_instruction}Be concise and directly answer the question.\n\
         \n\
         Provided Context:\n\
         ---\n\
         {context_str}\n\
         ---\n\
         \n\
         User Question: {question}\n\
         \n\
         Answer:\n"
    );
    RagPrompt { text, chunks_used: used }
}

/// Prompt asking for a summary of one chunk.
pub fn chunk_summary_prompt(chunk: &str) -> String {
    format!(
        "Please provide a concise summary of the following text excerpt from a larger \
         document:\n\n---\n{chunk}\n---\n\nSummary:"
    )
}

/// Prompt merging a group of consecutive section summaries into one.
pub fn combine_prompt(document_name: &str, summaries: &[String]) -> String {
    let joined = summaries.join(SECTION_SEPARATOR);
    format!(
        "The following are summaries of consecutive sections from a document titled \
         '{document_name}'.\n\
         Merge them into one concise summary of this part of the document, keeping every main \
         point and the original order.\n\
         \n\
         Section Summaries:\n\
         ---\n\
         {joined}\n\
         ---\n\
         \n\
         Combined Summary:\n"
    )
}

/// Prompt synthesizing the final whole-document summary.
pub fn synthesis_prompt(document_name: &str, summaries: &[String]) -> String {
    let joined = summaries.join(SECTION_SEPARATOR);
    format!(
        "The following are summaries of consecutive sections from a document titled \
         '{document_name}'.\n\
         Please synthesize these into a single, coherent, and comprehensive overall summary of \
         the entire document.\n\
         Ensure the final summary flows well and captures the main points effectively.\n\
         \n\
         Section Summaries:\n\
         ---\n\
         {joined}\n\
         ---\n\
         \n\
         Comprehensive Overall Summary of '{document_name}':\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_prompt_joins_context_and_question() {
        let prompt = rag_prompt("What is it?", &["first", "second"], None, 1000);
        assert_eq!(prompt.chunks_used, 2);
        assert!(prompt.text.contains("first\n\n---\n\nsecond"));
        assert!(prompt.text.contains("User Question: What is it?\n\nAnswer:"));
        assert!(!prompt.text.contains("perspective"));
        assert!(prompt.text.starts_with("You are InsightLens"));
    }

    #[test]
    fn persona_is_injected_before_instructions() {
        let prompt = rag_prompt("q", &["ctx"], Some("a pirate"), 1000);
        assert!(prompt.text.contains(
            "Please answer from the perspective of a pirate. Be concise and directly answer"
        ));
        let blank = rag_prompt("q", &["ctx"], Some("   "), 1000);
        assert!(!blank.text.contains("perspective"));
    }

    #[test]
    fn context_budget_drops_trailing_chunks_but_keeps_the_first() {
        let big = "x".repeat(50);
        let prompt = rag_prompt("q", &[&big, "tail"], None, 10);
        assert_eq!(prompt.chunks_used, 1);
        assert!(prompt.text.contains(&big));
        assert!(!prompt.text.contains("tail"));

        // 5 + 7 (separator) + 5 = 17 fits exactly.
        let fits = rag_prompt("q", &["aaaaa", "bbbbb", "ccccc"], None, 17);
        assert_eq!(fits.chunks_used, 2);
    }

    #[test]
    fn synthesis_prompt_names_the_document() {
        let prompt = synthesis_prompt("report.pdf", &["one".into(), "two".into()]);
        assert!(prompt.contains("titled 'report.pdf'"));
        assert!(prompt.contains("one\n\n---\n\ntwo"));
        assert!(prompt.ends_with("Comprehensive Overall Summary of 'report.pdf':\n"));
    }
}
