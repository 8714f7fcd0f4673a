//! Prompt-injection pattern matching.
//!
//! Patterns run over the trimmed raw input only; this module never sees
//! retrieval output. Matching is case-insensitive and word-boundary anchored.

use std::sync::OnceLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    InstructionOverride,
    PersonaHijack,
    PromptExfiltration,
    JailbreakToken,
    StructuralInjection,
}

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::InstructionOverride => "instruction_override",
            PatternKind::PersonaHijack => "persona_hijack",
            PatternKind::PromptExfiltration => "prompt_exfiltration",
            PatternKind::JailbreakToken => "jailbreak_token",
            PatternKind::StructuralInjection => "structural_injection",
        }
    }
}

/// Pattern order doubles as report priority when several match at once.
const KINDS: [PatternKind; 5] = [
    PatternKind::InstructionOverride,
    PatternKind::PersonaHijack,
    PatternKind::PromptExfiltration,
    PatternKind::JailbreakToken,
    PatternKind::StructuralInjection,
];

const PATTERNS: [&str; 5] = [
    // "ignore previous instructions", "disregard all prior rules", ...
    r"(?i)\b(ignore|disregard|forget|override)\b.{0,40}\b(previous|prior|above|earlier|all)\b.{0,40}\b(instructions?|rules?|prompts?|directives?)\b",
    r"(?i)\b(pretend to be|act as|you are now|roleplay as|assume the role of)\b",
    r"(?i)\b(show|reveal|print|repeat|display|output)\b.{0,40}\b((system\s+)?prompt|your instructions)\b",
    r"(?i)\b(jailbreak|dan mode|developer mode|do anything now|aim prompt|stay in character as dan)\b",
    // Control tokens of common instruction-tuned chat formats.
    r"<\|im_start\|>|<\|im_end\|>|<\|system\|>|\[INST\]|\[/INST\]|<<SYS>>|</?system>",
];

fn pattern_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(PATTERNS).expect("static injection patterns compile"))
}

/// First matching injection pattern, in priority order. `None` means clean.
pub fn detect(input: &str) -> Option<PatternKind> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let matches = pattern_set().matches(trimmed);
    KINDS
        .iter()
        .enumerate()
        .find(|(idx, _)| matches.matched(*idx))
        .map(|(_, kind)| *kind)
}
