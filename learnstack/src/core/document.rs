//! Read-only reconstruction of a markdown stack document.
//!
//! The raw document stays authoritative. This view only collects the lines
//! that match the shape expected by the section currently being scanned, so
//! malformed or reordered documents still render whatever subset matches.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static GOAL_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s+.*?(?i:goal)\s*[:：]?\s*(.*?)\s*$").unwrap());

static SUBHEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{2,}\s+(.*?)\s*$").unwrap());

static STACK_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\.\s*\[(?i:level)\s*(\d+)\]\s*(.*?)\s*(\((?i:active)\))?\s*$").unwrap()
});

static CACHE_ENTRY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*-\s+(.*?)\s*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Goal,
    Stack,
    Cache,
    Other,
}

/// A numbered stack entry such as `2. [Level 1] Base Case (Active)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntry {
    pub level: u32,
    pub topic: String,
    pub active: bool,
}

/// Renderable sections recovered from a stack document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub goal: Option<String>,
    pub stack: Vec<DocumentEntry>,
    pub cache: Vec<String>,
}

impl DocumentView {
    pub fn is_empty(&self) -> bool {
        self.goal.is_none() && self.stack.is_empty() && self.cache.is_empty()
    }

    pub fn active(&self) -> Option<&DocumentEntry> {
        self.stack.iter().find(|entry| entry.active)
    }
}

/// Scan `text` line by line and collect the recognised sections.
pub fn parse_document(text: &str) -> DocumentView {
    let mut view = DocumentView::default();
    let mut section = Section::None;

    for line in text.lines() {
        if let Some(caps) = SUBHEADER.captures(line) {
            let title = caps[1].to_ascii_lowercase();
            section = if title.contains("stack") {
                Section::Stack
            } else if title.contains("cache") {
                Section::Cache
            } else {
                Section::Other
            };
            continue;
        }
        if let Some(caps) = GOAL_HEADER.captures(line) {
            section = Section::Goal;
            let goal = caps[1].trim();
            if !goal.is_empty() {
                view.goal = Some(goal.to_string());
            }
            continue;
        }

        match section {
            Section::Goal => {
                let trimmed = line.trim();
                if view.goal.is_none() && !trimmed.is_empty() {
                    view.goal = Some(trimmed.to_string());
                }
            }
            Section::Stack => {
                if let Some(entry) = parse_stack_entry(line) {
                    view.stack.push(entry);
                }
            }
            Section::Cache => {
                if let Some(caps) = CACHE_ENTRY.captures(line) {
                    let item = caps[1].trim();
                    if !item.is_empty() {
                        view.cache.push(item.to_string());
                    }
                }
            }
            Section::None | Section::Other => {}
        }
    }

    view
}

fn parse_stack_entry(line: &str) -> Option<DocumentEntry> {
    let caps = STACK_ENTRY.captures(line)?;
    let level = caps[1].parse::<u32>().ok()?;
    let topic = caps[2].trim();
    if topic.is_empty() {
        return None;
    }
    Some(DocumentEntry {
        level,
        topic: topic.to_string(),
        active: caps.get(3).is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# 🎯 Goal: Recursion\n\n## 🥞 Stack (递归栈)\n1. [Level 0] Recursion\n2. [Level 1] Base Case (Active)\n\n## 🧠 Cache (已归档知识)\n- Call stack basics\n";

    #[test]
    fn parses_all_three_sections() {
        let view = parse_document(DOC);
        assert_eq!(view.goal.as_deref(), Some("Recursion"));
        assert_eq!(
            view.stack,
            vec![
                DocumentEntry {
                    level: 0,
                    topic: "Recursion".to_string(),
                    active: false,
                },
                DocumentEntry {
                    level: 1,
                    topic: "Base Case".to_string(),
                    active: true,
                },
            ]
        );
        assert_eq!(view.cache, vec!["Call stack basics".to_string()]);
        assert_eq!(view.active().map(|e| e.topic.as_str()), Some("Base Case"));
    }

    #[test]
    fn drops_lines_that_do_not_match_the_current_section() {
        let doc = "## Stack\nsome chatter\n- not a stack entry\n1. [Level 0] Root (Active)\n## Cache\n1. [Level 3] misplaced\n- archived\n";
        let view = parse_document(doc);
        assert_eq!(view.stack.len(), 1);
        assert_eq!(view.cache, vec!["archived".to_string()]);
        assert!(view.goal.is_none());
    }

    #[test]
    fn reordered_sections_still_render() {
        let doc = "## Cache\n- done thing\n## Stack\n1. [Level 0] Root (Active)\n# Goal: Late goal\n";
        let view = parse_document(doc);
        assert_eq!(view.cache, vec!["done thing".to_string()]);
        assert_eq!(view.stack[0].topic, "Root");
        assert_eq!(view.goal.as_deref(), Some("Late goal"));
    }

    #[test]
    fn goal_may_follow_its_header() {
        let view = parse_document("# Goal\n\nLearn Rust lifetimes\n");
        assert_eq!(view.goal.as_deref(), Some("Learn Rust lifetimes"));
    }

    #[test]
    fn unrelated_subsections_stop_collection() {
        let doc = "## Stack\n1. [Level 0] Root\n## Notes\n2. [Level 1] Hidden\n";
        let view = parse_document(doc);
        assert_eq!(view.stack.len(), 1);
    }

    #[test]
    fn empty_document_has_empty_view() {
        assert!(parse_document("").is_empty());
        assert!(parse_document("just words").is_empty());
    }
}
