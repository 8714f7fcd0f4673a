//! Post-generation vocabulary enforcement.
//!
//! The persona's substitution map is applied to the generated text as a
//! case-preserving replacement, whole-word for alphabetic keys. Multi-word
//! keys match across word boundaries. Applying the pass twice yields the
//! same text as applying it once, provided no replacement value is itself a
//! key (persona bundles are authored that way).

use std::collections::HashMap;

use terrace_store::VocabularyRules;

pub fn enforce_vocabulary(text: &str, rules: &VocabularyRules) -> String {
    if rules.substitutions.is_empty() {
        return text.to_string();
    }

    // Keys tokenized and lowercased once; longest key first so "man united"
    // wins over "united".
    let mut keys: Vec<(Vec<String>, &str)> = rules
        .substitutions
        .iter()
        .map(|(k, v)| {
            (
                k.split_whitespace()
                    .map(|w| w.to_lowercase())
                    .collect::<Vec<_>>(),
                v.as_str(),
            )
        })
        .filter(|(k, _)| !k.is_empty())
        .collect();
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    let keys: HashMap<usize, Vec<(Vec<String>, &str)>> = group_by_len(keys);

    let tokens = tokenize(text);
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if !token.is_word {
            out.push_str(token.text);
            i += 1;
            continue;
        }

        // Word positions among the upcoming tokens, for multi-word keys.
        let mut replaced = false;
        let mut lengths: Vec<usize> = keys.keys().copied().collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        'key_len: for len in lengths {
            let window = word_window(&tokens, i, len);
            let Some(window) = window else { continue };
            for (key, replacement) in &keys[&len] {
                let matches = window
                    .words
                    .iter()
                    .zip(key.iter())
                    .all(|(w, k)| w.to_lowercase() == **k);
                if matches {
                    out.push_str(&apply_case(window.words[0], replacement));
                    i = window.end;
                    replaced = true;
                    break 'key_len;
                }
            }
        }
        if !replaced {
            out.push_str(token.text);
            i += 1;
        }
    }
    out
}

struct Token<'a> {
    text: &'a str,
    is_word: bool,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        let word_char = ch.is_alphanumeric() || ch == '\'';
        if idx == 0 {
            in_word = word_char;
            continue;
        }
        if word_char != in_word {
            tokens.push(Token {
                text: &text[start..idx],
                is_word: in_word,
            });
            start = idx;
            in_word = word_char;
        }
    }
    if start < text.len() {
        tokens.push(Token {
            text: &text[start..],
            is_word: in_word,
        });
    }
    tokens
}

struct WordWindow<'a> {
    words: Vec<&'a str>,
    /// Token index just past the window.
    end: usize,
}

/// Collect `len` consecutive words starting at the word token `start`,
/// allowing only whitespace separators between them.
fn word_window<'a>(tokens: &'a [Token<'a>], start: usize, len: usize) -> Option<WordWindow<'a>> {
    let mut words = Vec::with_capacity(len);
    let mut i = start;
    while words.len() < len {
        let token = tokens.get(i)?;
        if token.is_word {
            words.push(token.text);
        } else if !token.text.chars().all(char::is_whitespace) {
            return None;
        }
        i += 1;
    }
    Some(WordWindow { words, end: i })
}

fn group_by_len<'a>(
    keys: Vec<(Vec<String>, &'a str)>,
) -> HashMap<usize, Vec<(Vec<String>, &'a str)>> {
    let mut grouped: HashMap<usize, Vec<(Vec<String>, &'a str)>> = HashMap::new();
    for entry in keys {
        grouped.entry(entry.0.len()).or_default().push(entry);
    }
    grouped
}

/// Mirror the case pattern of the matched word onto the replacement.
fn apply_case(matched: &str, replacement: &str) -> String {
    let alphabetic: Vec<char> = matched.chars().filter(|c| c.is_alphabetic()).collect();
    if !alphabetic.is_empty() && alphabetic.iter().all(|c| c.is_uppercase()) && alphabetic.len() > 1
    {
        return replacement.to_uppercase();
    }
    if matched.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
    }
    replacement.to_string()
}
