use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum accepted input length in characters, measured after trimming.
    pub max_input_chars: usize,
    /// Heuristic confidence divisor: confidence = min(1, sources / this).
    pub confidence_source_target: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 1000,
            confidence_source_target: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Top-K results requested per full-text domain.
    pub fts_top_k: usize,
    /// Cap on combined full-text results across all domains.
    pub fts_combined_cap: usize,
    /// Maximum evidence lines in the assembled context block.
    pub context_max_lines: usize,
    /// Fusion weight for full-text scores.
    pub fusion_beta: f64,
    /// Fusion weight for graph scores.
    pub fusion_gamma: f64,
    /// Score multiplier for graph hits at depth 1.
    pub depth_decay_one: f64,
    /// Score multiplier for graph hits at depth 2.
    pub depth_decay_two: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fts_top_k: 5,
            fts_combined_cap: 20,
            context_max_lines: 20,
            fusion_beta: 0.60,
            fusion_gamma: 0.40,
            depth_decay_one: 1.0,
            depth_decay_two: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Persona id → team id. Keys double as the valid-persona set.
    pub teams: HashMap<String, i64>,
    /// Derive mood from recent form; persisted mood nodes are seed data only.
    pub mood_from_form: bool,
    /// When true an unknown persona id is rejected instead of ignored.
    pub reject_unknown_persona: bool,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            teams: HashMap::new(),
            mood_from_form: true,
            reject_unknown_persona: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Response delay per trust level, in milliseconds, index 0 = normal.
    pub delay_ms: Vec<u64>,
    /// Consecutive clean queries needed for warned → normal.
    pub warned_demotion: u32,
    /// Consecutive clean queries needed for cautious → normal.
    pub cautious_demotion: u32,
    /// Consecutive clean queries needed for probation → normal.
    pub probation_demotion: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            delay_ms: vec![0, 500, 1000, 2000, 2000],
            warned_demotion: 5,
            cautious_demotion: 10,
            probation_demotion: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum live conversations held in memory before LRU eviction.
    pub capacity: usize,
    /// Conversations idle longer than this are eligible for the sweep.
    pub idle_minutes: u64,
    /// Turns of prior conversation forwarded to the generator.
    pub history_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            idle_minutes: 30,
            history_turns: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// OpenAI-compatible chat-completions endpoint.
    /// Overridden at runtime by `TERRACE_GENERATOR_URL` when set.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
            model: "llama3.1:8b".to_string(),
            api_key_env: "TERRACE_GENERATOR_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: ".terrace/terrace.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub retrieval: RetrievalConfig,
    pub persona: PersonaConfig,
    pub security: SecurityConfig,
    pub conversation: ConversationConfig,
    pub generator: GeneratorConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("TERRACE_GENERATOR_URL") {
            if !value.is_empty() {
                config.generator.endpoint = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Team id for a persona, or `None` when the id is not configured.
    pub fn persona_team(&self, persona_id: &str) -> Option<i64> {
        self.persona.teams.get(persona_id).copied()
    }

    /// Rate-limit delay for a trust level index, saturating at the last entry.
    pub fn delay_for_level(&self, level: usize) -> u64 {
        self.security
            .delay_ms
            .get(level)
            .or_else(|| self.security.delay_ms.last())
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.engine.max_input_chars, 1000);
        assert_eq!(config.retrieval.fts_top_k, 5);
        assert_eq!(config.retrieval.context_max_lines, 20);
        assert!((config.retrieval.fusion_beta - 0.60).abs() < f64::EPSILON);
        assert!((config.retrieval.fusion_gamma - 0.40).abs() < f64::EPSILON);
        assert_eq!(config.security.delay_ms, vec![0, 500, 1000, 2000, 2000]);
        assert_eq!(config.security.warned_demotion, 5);
        assert_eq!(config.security.cautious_demotion, 10);
        assert_eq!(config.security.probation_demotion, 5);
    }

    #[test]
    fn partial_toml_fills_with_defaults() {
        let raw = "[retrieval]\nfts_top_k = 3\n";
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.retrieval.fts_top_k, 3);
        assert_eq!(config.retrieval.fts_combined_cap, 20);
        assert_eq!(config.engine.max_input_chars, 1000);
    }

    #[test]
    fn save_and_load_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("terrace.toml");

        let mut config = AppConfig::default();
        config.persona.teams.insert("arsenal".to_string(), 1);
        config.engine.max_input_chars = 512;
        config.save_to(&path)?;

        let loaded = AppConfig::load_from(&path)?;
        assert_eq!(loaded.engine.max_input_chars, 512);
        assert_eq!(loaded.persona_team("arsenal"), Some(1));
        assert_eq!(loaded.persona_team("unknown"), None);
        Ok(())
    }

    #[test]
    fn delay_saturates_past_table_end() {
        let config = AppConfig::default();
        assert_eq!(config.delay_for_level(0), 0);
        assert_eq!(config.delay_for_level(3), 2000);
        assert_eq!(config.delay_for_level(9), 2000);
    }
}
