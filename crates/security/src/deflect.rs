//! Deflection responses.
//!
//! Snap-backs stay in character for the persona; the lockdown voice is
//! deliberately flat and persona-free. Selection is deterministic: the
//! session's strike ordinal picks the line, so tests and replays are stable.

/// In-persona snap-back templates. `{nick}` is replaced with the persona
/// nickname when one is active.
const SNAP_BACKS: [&str; 4] = [
    "Nice try. A {nick} doesn't switch sides because someone asks twice. Got an actual football question?",
    "You'll have to be cleverer than that. We talk football here, nothing else.",
    "That's not how this works, mate. Ask me about the squad, the table, or the derby.",
    "I've seen better attempts from the away end. Football questions only.",
];

const LOCKDOWN: &str =
    "This session has been restricted after repeated policy violations. \
     Only straightforward football questions will be considered for a while.";

/// Pick the deflection for a strike ordinal, splicing the persona nickname in.
pub fn snap_back(persona_nickname: Option<&str>, strike: u32) -> String {
    let template = SNAP_BACKS[strike as usize % SNAP_BACKS.len()];
    let nick = persona_nickname.unwrap_or("supporter");
    template.replace("{nick}", nick)
}

/// The fixed security voice used at escalated levels. Bypasses the persona.
pub fn lockdown() -> &'static str {
    LOCKDOWN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_back_is_deterministic_per_strike() {
        assert_eq!(snap_back(Some("Gooner"), 1), snap_back(Some("Gooner"), 1));
        assert_ne!(snap_back(Some("Gooner"), 0), snap_back(Some("Gooner"), 1));
    }

    #[test]
    fn nickname_is_spliced_into_templates_that_use_it() {
        let text = snap_back(Some("Gooner"), 0);
        assert!(text.contains("Gooner"));
        let fallback = snap_back(None, 0);
        assert!(fallback.contains("supporter"));
    }

    #[test]
    fn lockdown_voice_is_persona_free() {
        assert!(!lockdown().contains("{nick}"));
    }
}
