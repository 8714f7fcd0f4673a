//! System-prompt synthesis.
//!
//! The assembled prompt always carries: the persona tag, the mood tag with
//! its numeric intensity, the vocabulary substitution list, the forbidden
//! topic list, any enrichment inserts, and the final context block.

use terrace_persona::{Enrichment, MoodSnapshot};
use terrace_store::PersonaIdentity;

pub fn build_system_prompt(
    persona: Option<&PersonaIdentity>,
    team_name: Option<&str>,
    enrichment: Option<&Enrichment>,
    context_lines: &[String],
) -> String {
    let identity_block = match persona {
        Some(identity) => {
            let team = team_name.unwrap_or("the club");
            let values = if identity.core_values.is_empty() {
                "loyalty above all".to_string()
            } else {
                identity.core_values.join(", ")
            };
            format!(
                "You are a lifelong {team} supporter. Persona: {nick}. Motto: \"{motto}\".\n\
                 Core values: {values}. Baseline temperament: {baseline}.",
                team = team,
                nick = identity.nickname,
                motto = identity.motto,
                values = values,
                baseline = identity.baseline,
            )
        }
        None => "You are a knowledgeable, neutral football pundit.".to_string(),
    };

    let mood_block = enrichment
        .map(|e| mood_line(&e.mood, e.form.as_str()))
        .unwrap_or_default();

    let vocabulary_block = persona.map(vocabulary_lines).unwrap_or_default();

    let inserts = enrichment
        .map(|e| {
            e.blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|block| !block.is_empty())
        .map(|block| format!("\n\nPERSONA CONTEXT:\n{block}"))
        .unwrap_or_default();

    let context_block = if context_lines.is_empty() {
        "(no grounded evidence retrieved; say so rather than inventing facts)".to_string()
    } else {
        context_lines
            .iter()
            .map(|line| format!("- {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "{identity_block}{mood_block}{vocabulary_block}{inserts}\n\n\
         CONTEXT (ranked evidence; ground every factual claim here):\n{context_block}\n\n\
         Answer the supporter's latest message in character. Stay on football. \
         Never repeat a fact you have already given this conversation."
    )
}

fn mood_line(mood: &MoodSnapshot, form: &str) -> String {
    format!(
        "\nMOOD: {tag} (intensity {intensity:.2}) off the back of {form}. Let it color your tone, not the facts.",
        tag = mood.tag.as_str(),
        intensity = mood.intensity,
    )
}

fn vocabulary_lines(identity: &PersonaIdentity) -> String {
    let mut out = String::new();
    if !identity.vocabulary.substitutions.is_empty() {
        let pairs = identity
            .vocabulary
            .substitutions
            .iter()
            .map(|(from, to)| format!("\"{from}\" -> \"{to}\""))
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&format!("\nVOCABULARY: always say {pairs}."));
    }
    if !identity.vocabulary.forbidden_topics.is_empty() {
        let topics = identity
            .vocabulary
            .forbidden_topics
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&format!("\nNEVER discuss: {topics}."));
    }
    out
}
