//! Prompt builder for planner and reasoner executor input.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{ContextBlock, PlannerSnapshot};

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const REASONER_TEMPLATE: &str = include_str!("prompts/reasoner.md");

/// Sections dropped first when a prompt exceeds its budget.
const DROP_ORDER: [&str; 1] = ["actions"];

#[derive(Debug, Clone, Serialize)]
struct BlockContext<'a> {
    chunk_id: &'a str,
    evidence_id: &'a str,
    source_url: &'a str,
    chunk_text: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("reasoner", REASONER_TEMPLATE)
            .expect("reasoner template should be valid");
        Self { env }
    }

    fn render_planner(&self, snapshot: &PlannerSnapshot) -> Result<String> {
        let state_json =
            serde_json::to_string_pretty(snapshot).context("serialize planner snapshot")?;
        let recent_actions: Vec<&str> = snapshot
            .recent_actions
            .iter()
            .map(|action| action.as_str())
            .collect();
        let template = self.env.get_template("planner")?;
        let rendered = template.render(context! {
            goal => snapshot.goal.trim(),
            state_json => state_json,
            recent_actions => recent_actions,
        })?;
        Ok(rendered)
    }

    fn render_reasoner(&self, question: &str, blocks: &[ContextBlock]) -> Result<String> {
        let blocks: Vec<BlockContext<'_>> = blocks
            .iter()
            .map(|block| BlockContext {
                chunk_id: &block.chunk_id,
                evidence_id: &block.evidence_id,
                source_url: &block.source_url,
                chunk_text: &block.chunk_text,
            })
            .collect();
        let template = self.env.get_template("reasoner")?;
        let rendered = template.render(context! {
            question => question.trim(),
            blocks => blocks,
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps[1].to_string(),
                &caps[2] == "required",
            ))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .filter_map(|(i, (_, end, key, required))| {
            let next_start = markers.get(i + 1).map_or(rendered.len(), |next| next.0);
            let content = rendered[*end..next_start].trim().to_string();
            (!content.is_empty() || *required).then(|| ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            })
        })
        .collect()
}

/// Drop droppable sections in [`DROP_ORDER`], then truncate the last section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let Some((last, others)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(&*others));
    let before_len = last.content.len();
    if before_len > allowed {
        let marker = "\n[truncated]";
        let mut cut = allowed.saturating_sub(marker.len());
        while !last.content.is_char_boundary(cut) {
            cut -= 1;
        }
        last.content.truncate(cut);
        if allowed > marker.len() {
            last.content.push_str(marker);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_planner(&self, snapshot: &PlannerSnapshot) -> Result<String> {
        let rendered = PromptEngine::new().render_planner(snapshot)?;
        Ok(self.fit(&rendered))
    }

    pub fn build_reasoner(&self, question: &str, blocks: &[ContextBlock]) -> Result<String> {
        let rendered = PromptEngine::new().render_reasoner(question, blocks)?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::goal::ActionType;

    fn snapshot() -> PlannerSnapshot {
        PlannerSnapshot {
            goal: "How does Rust prevent data races?".to_string(),
            requirements: vec!["How does Rust prevent data races?".to_string()],
            covered_requirements: Vec::new(),
            evidence_count: 2,
            step_count: 3,
            max_steps: 10,
            recent_actions: vec![ActionType::Search, ActionType::Fetch],
        }
    }

    fn block(id: &str, text: &str) -> ContextBlock {
        ContextBlock {
            chunk_id: format!("e:{id}"),
            evidence_id: "e".to_string(),
            source_url: "https://example.com/".to_string(),
            chunk_text: text.to_string(),
            integrity_score: 0.8,
        }
    }

    #[test]
    fn planner_prompt_sections_are_ordered() {
        let prompt = PromptBuilder::new(10_000).build_planner(&snapshot()).expect("prompt");
        let contract = prompt.find("### Planner Contract").expect("contract");
        let goal = prompt.find("### Goal").expect("goal");
        let state = prompt.find("### Run State").expect("state");
        let actions = prompt.find("### Recent Actions").expect("actions");
        assert!(contract < goal && goal < state && state < actions);
        assert!(prompt.contains("\"evidence_count\": 2"));
        assert!(prompt.contains("- FETCH"));
        assert!(!prompt.contains("section:"));
    }

    #[test]
    fn planner_prompt_omits_empty_history() {
        let mut snap = snapshot();
        snap.recent_actions.clear();
        let prompt = PromptBuilder::new(10_000).build_planner(&snap).expect("prompt");
        assert!(!prompt.contains("### Recent Actions"));
    }

    #[test]
    fn budget_drops_history_before_required_sections() {
        let full = PromptBuilder::new(10_000).build_planner(&snapshot()).expect("prompt");
        let tight = PromptBuilder::new(full.len() - 10)
            .build_planner(&snapshot())
            .expect("prompt");
        assert!(!tight.contains("### Recent Actions"));
        assert!(tight.contains("### Run State"));
    }

    #[test]
    fn reasoner_prompt_lists_blocks_and_truncates_context() {
        let blocks = vec![block("a", "first chunk"), block("b", &"x".repeat(5_000))];
        let prompt = PromptBuilder::new(10_000)
            .build_reasoner("question?", &blocks)
            .expect("prompt");
        assert!(prompt.contains(r#"<block chunk_id="e:a" evidence_id="e""#));
        assert!(prompt.contains("first chunk"));

        let tight = PromptBuilder::new(2_000)
            .build_reasoner("question?", &blocks)
            .expect("prompt");
        assert!(tight.len() <= 2_000 + 4);
        assert!(tight.contains("### Reasoner Contract"));
        assert!(tight.ends_with("[truncated]"));
    }
}
