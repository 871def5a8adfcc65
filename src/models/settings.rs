use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    pub ai: AiSettings,
    pub content: ContentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            ai: AiSettings::default(),
            content: ContentSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    pub enabled: bool,
    pub provider: String,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        let env_key = std::env::var("REBOOT_API_KEY").unwrap_or_default();
        Self {
            enabled: true,
            provider: "gemini".to_string(),
            api_key: env_key,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSettings {
    /// How many item-detail enrichment requests may run at once.
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    /// How many recent daily summaries feed the prompt context digest.
    #[serde(default = "default_context_days")]
    pub context_days: usize,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            enrichment_concurrency: default_enrichment_concurrency(),
            context_days: default_context_days(),
        }
    }
}

fn default_enrichment_concurrency() -> usize {
    4
}

fn default_context_days() -> usize {
    14
}
