use crate::{SearchHit, Searcher};

pub const CONTEXT_HEADER: &str = "### Project Context";
pub const CITE_INSTRUCTION: &str = "Use this context to provide specific, accurate information about the projects. \
Always cite the project titles when referencing them.";
/// Whose projects the context block describes when no name is configured.
pub const DEFAULT_OWNER: &str = "the portfolio owner";

/// Append retrieved project context to `base`. Returns `base` unchanged when
/// the search finds nothing.
pub fn augment_prompt(searcher: &Searcher, base: &str, query: &str, k: usize) -> String {
    augment_with_hits(base, DEFAULT_OWNER, &searcher.search(query, k))
}

/// Same as [`augment_prompt`] for hits the caller already retrieved.
pub fn augment_with_hits(base: &str, owner: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return base.to_string();
    }
    format!("{base}\n\n{}", format_context(owner, hits))
}

/// The context block for a ranked list of hits, instruction line included.
///
/// ```text
///
/// ### Project Context
/// Here are relevant details from {owner}'s projects:
///
/// 1. **{title}** ({slug})
///    Technologies: {tech}
///    {snippet}
///
/// {instruction}
/// ```
pub fn format_context(owner: &str, hits: &[SearchHit]) -> String {
    let mut lines = vec![
        format!("\n{CONTEXT_HEADER}"),
        format!("Here are relevant details from {owner}'s projects:"),
        String::new(),
    ];
    for (i, hit) in hits.iter().enumerate() {
        let doc = &hit.document;
        lines.push(format!("{}. **{}** ({})", i + 1, doc.title, doc.slug));
        if !doc.tech.is_empty() {
            lines.push(format!("   Technologies: {}", doc.tech.join(", ")));
        }
        lines.push(format!("   {}", hit.snippet));
        lines.push(String::new());
    }
    lines.push(CITE_INSTRUCTION.to_string());
    lines.join("\n")
}
