//! Follow-up resolution: rewrite pronominal references against the
//! conversation's recent entities. `resolve` is idempotent because its output
//! contains no token from the substitution set.

use terrace_retrieval::EntityKind;

use crate::state::ConversationState;

/// Rewrite `they/them/their` and `we/us/our` in `query`.
///
/// Inside a persona conversation, first-person tokens resolve to the persona
/// team; otherwise both sets resolve to the last team mentioned (falling back
/// to the last player for third-person tokens). Unresolvable tokens are left
/// intact.
pub fn resolve(query: &str, state: &ConversationState, persona_team: Option<&str>) -> String {
    let last_team = state.last_entity(EntityKind::Team);
    let last_player = state.last_entity(EntityKind::Player);

    let third_person = last_team.or(last_player);
    let first_person = persona_team.or(last_team);

    let mut out = String::with_capacity(query.len());
    let mut word = String::new();

    let mut flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        let replacement = match word.to_lowercase().as_str() {
            "they" | "them" => third_person.map(|n| n.to_string()),
            "their" => third_person.map(possessive),
            "we" | "us" => first_person.map(|n| n.to_string()),
            "our" => first_person.map(possessive),
            _ => None,
        };
        match replacement {
            Some(name) => out.push_str(&name),
            None => out.push_str(word),
        }
        word.clear();
    };

    for ch in query.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            word.push(ch);
        } else {
            flush(&mut word, &mut out);
            out.push(ch);
        }
    }
    flush(&mut word, &mut out);
    out
}

fn possessive(name: &str) -> String {
    if name.ends_with('s') || name.ends_with('S') {
        format!("{name}'")
    } else {
        format!("{name}'s")
    }
}
