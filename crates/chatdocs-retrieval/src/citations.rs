use std::collections::HashMap;

use serde::Serialize;

use chatdocs_core::types::Citation;

/// Anything that references a source file.
pub trait CitesFile {
    fn file_id(&self) -> &str;
}

impl CitesFile for Citation {
    fn file_id(&self) -> &str {
        &self.file_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationGroup<C = Citation> {
    pub file_id: String,
    pub citations: Vec<C>,
}

/// Stable partition by file: groups appear in the order their file is first
/// cited, and citations keep their relative order inside each group.
pub fn group_by_file<C: CitesFile>(items: impl IntoIterator<Item = C>) -> Vec<CitationGroup<C>> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<CitationGroup<C>> = Vec::new();
    for item in items {
        let slot = match slots.get(item.file_id()) {
            Some(&slot) => slot,
            None => {
                let slot = groups.len();
                slots.insert(item.file_id().to_string(), slot);
                groups.push(CitationGroup { file_id: item.file_id().to_string(), citations: Vec::new() });
                slot
            }
        };
        groups[slot].citations.push(item);
    }
    groups
}

pub fn group_citations_by_file(citations: Vec<Citation>) -> Vec<CitationGroup> {
    group_by_file(citations)
}
