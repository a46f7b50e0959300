use chatdocs_core::types::Chunk;

/// Render chunks as `<Doc{file}>` blocks for the LLM prompt, in the given
/// order.
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            let uri = c.source_uri.as_deref().unwrap_or("unknown");
            format!("<Doc{uri}>\n {} \n</Doc{uri}>", c.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
