//! Seam to the language-model collaborator. The orchestration layers only see
//! the `CoachModel` trait; `None` from a structured generator always means
//! "generation failed, use the fallback", never an empty-but-valid result.

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::{
    ActionCategory, ActionPlan, AiSettings, DailyInsights, Difficulty, Language, MicroAction,
    RichDetail, UserProfile,
};
use crate::services::scenario;
use crate::utils::config::resolve_api_key;

const MAX_RETRIES: usize = 5;
const BASE_RETRY_DELAY_MS: u64 = 2000;
const RATE_LIMIT_FLOOR_MS: u64 = 8000;
const MAX_HISTORY_TURNS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailKind {
    Action,
    Health,
    Medical,
}

impl DetailKind {
    fn label(self) -> &'static str {
        match self {
            DetailKind::Action => "action",
            DetailKind::Health => "health",
            DetailKind::Medical => "medical",
        }
    }
}

/// One chat exchange request. History carries today's (user, assistant) pairs
/// oldest-first; the memory digest is the smart-context summary block.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub message: String,
    pub image_base64: Option<String>,
    pub history: Vec<(String, String)>,
    pub memory_digest: String,
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub citations: Vec<Citation>,
    pub model: String,
    /// True when the caller's token stopped the stream; the partial text is
    /// kept as-is.
    pub cancelled: bool,
}

#[async_trait]
pub trait CoachModel: Send + Sync {
    async fn generate_insights(
        &self,
        profile: &UserProfile,
        memory: &str,
        language: Language,
    ) -> Option<DailyInsights>;

    async fn generate_action_plan(
        &self,
        profile: &UserProfile,
        memory: &str,
        language: Language,
    ) -> Option<ActionPlan>;

    async fn generate_item_detail(
        &self,
        title: &str,
        kind: DetailKind,
        profile: &UserProfile,
        language: Language,
    ) -> Option<RichDetail>;

    async fn stream_chat(
        &self,
        profile: &UserProfile,
        turn: ChatTurn,
        on_delta: &(dyn for<'a> Fn(&'a str) + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<ChatReply, String>;
}

// ─── Wire Types ───

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatRecvMessage,
}

#[derive(Deserialize)]
struct ChatRecvMessage {
    content: Option<String>,
}

// For streaming
#[derive(Deserialize)]
struct ChatStreamResponse {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
}

// Loose action-plan payload; AI output gets sanitized into the strict shape.
#[derive(Deserialize)]
pub(crate) struct RawPlan {
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    id: Option<String>,
    title: String,
    description: Option<String>,
    category: Option<String>,
    difficulty: Option<String>,
    #[serde(rename = "estimated_time")]
    estimated_time: Option<String>,
    completed: Option<bool>,
}

// ─── HTTP Implementation ───

/// OpenAI-compatible chat-completions client with bounded, jittered backoff.
pub struct HttpCoachModel {
    client: reqwest::Client,
    settings: AiSettings,
}

impl HttpCoachModel {
    pub fn new(settings: AiSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn api_key(&self) -> Result<String, String> {
        let key = resolve_api_key(&self.settings.api_key);
        if !self.settings.enabled {
            return Err("AI is disabled in settings".to_string());
        }
        if key.is_empty() {
            return Err("AI API key is missing".to_string());
        }
        Ok(key)
    }

    async fn call_once(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, String> {
        let api_key = self.api_key()?;
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            temperature,
            max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&self.settings.base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("API request failed: {}", e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("API error {}: {}", status, text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| "AI returned empty content".to_string())
    }

    /// Retries rate-limit and transient failures with exponential backoff and
    /// jitter; anything else fails immediately.
    async fn call_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, String> {
        let mut delay_ms = BASE_RETRY_DELAY_MS;
        let mut attempt = 0;
        loop {
            match self.call_once(&messages, temperature, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let rate_limited = e.contains("429")
                        || e.contains("Quota")
                        || e.contains("RESOURCE_EXHAUSTED");
                    let transient = e.contains("503") || e.contains("Overloaded");
                    if attempt >= MAX_RETRIES || (!rate_limited && !transient) {
                        return Err(e);
                    }
                    let mut wait_ms = if rate_limited {
                        delay_ms.max(RATE_LIMIT_FLOOR_MS)
                    } else {
                        delay_ms
                    };
                    wait_ms += rand::thread_rng().gen_range(0..2000);
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                    delay_ms = (wait_ms as f64 * 1.5) as u64;
                    attempt += 1;
                }
            }
        }
    }

    async fn generate_structured<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Option<T> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ];
        match self.call_completion(messages, temperature, 1200).await {
            Ok(text) => parse_structured(&text),
            Err(e) => {
                log::warn!("structured generation failed: {}", e);
                None
            }
        }
    }
}

fn language_name(language: Language) -> &'static str {
    if language.is_korean() {
        "Korean (한국어)"
    } else {
        "English"
    }
}

fn profile_block(profile: &UserProfile, memory: &str) -> String {
    let digest: String = memory.chars().take(500).collect();
    format!(
        "Profile: {}, {}, Stress:{}/10.\nPhysical Complaint: {}\nMental Complaint: {}\nHistory: {}",
        profile.name,
        profile.job_status,
        profile.stress_level,
        profile.physical_status,
        profile.mental_status,
        digest
    )
}

fn chat_system_instruction(profile: &UserProfile, memory: &str, language: Language) -> String {
    let digest: String = memory.chars().take(300).collect();
    format!(
        "ROLE & OBJECTIVE:\n\
You are 'Re:Boot', an AI Wellness & Health Coach.\n\
Your goal is to provide informational, systematic, and actionable health suggestions.\n\
CRITICAL: You are NOT a doctor. DO NOT provide medical diagnoses or prescriptions.\n\n\
USER PROFILE:\n\
- Name: {}\n\
- Job Status: {}\n\
- Primary Physical Complaint: \"{}\"\n\
- Primary Mental Complaint: \"{}\"\n\
- Current Stress Level: {}/10\n\
- Recent History Summary: {}...\n\n\
RESPONSE PROTOCOL:\n\
1. NEW SYMPTOM / FULL ANALYSIS: use markdown '###' section headers (Health Insight, \
Nutrition & Pharmaceutical Guide, Rehab & Action Prescription, Red Flags).\n\
2. FOLLOW-UP / CONVERSATION: answer directly without the template.\n\n\
STRICT RULES:\n\
1. Language: respond in {} ONLY.\n\
2. Tone: professional, empathetic, coaching-oriented.\n\
3. Legal: avoid definitive medical diagnosis terms.",
        profile.name,
        profile.job_status,
        profile.physical_status,
        profile.mental_status,
        profile.stress_level,
        digest,
        language_name(language)
    )
}

/// Strips code fences and anything outside the outermost JSON object, then
/// deserializes. Returns None on any mismatch so callers fall back.
pub(crate) fn parse_structured<T: DeserializeOwned>(text: &str) -> Option<T> {
    if text.is_empty() {
        return None;
    }
    let mut cleaned = text.trim().to_string();
    if cleaned.contains("```") {
        if let Ok(fence) = Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```") {
            cleaned = fence.replace_all(&cleaned, "$1").to_string();
        }
    }
    let first = cleaned.find('{')?;
    let last = cleaned.rfind('}')?;
    if last <= first {
        return None;
    }
    serde_json::from_str(&cleaned[first..=last]).ok()
}

/// Chat responses occasionally arrive wrapped in a fence or with trailing
/// brace artifacts; keep the raw text when cleanup would eat too much of it.
pub(crate) fn clean_chat_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut cleaned = text.trim().to_string();
    if let Ok(fence) = Regex::new(r"(?is)^```(?:json)?\s*([\s\S]*?)\s*```") {
        if let Some(captures) = fence.captures(&cleaned) {
            if let Some(inner) = captures.get(1) {
                cleaned = inner.as_str().trim().to_string();
            }
        }
    }
    for suffix in ["\"}}```", "'}}```", "}}```", "}```", "```", "\"}}", "'}}", "}}"] {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.trim_end().to_string();
        }
    }
    if cleaned.len() < text.len() / 2 {
        return text.trim().to_string();
    }
    cleaned
}

/// Normalizes a raw AI plan: defaulted ids, lowercased enums with defaults,
/// and the per-language goal title forced for consistency.
pub(crate) fn sanitize_plan(raw: RawPlan, language: Language) -> Option<ActionPlan> {
    if raw.actions.is_empty() {
        return None;
    }
    let actions = raw
        .actions
        .into_iter()
        .map(|a| MicroAction {
            id: a
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("action-{}", uuid::Uuid::new_v4())),
            title: a.title,
            description: a.description.unwrap_or_default(),
            category: match a.category.as_deref().map(str::to_lowercase).as_deref() {
                Some("career") => ActionCategory::Career,
                Some("routine") => ActionCategory::Routine,
                Some("mental") => ActionCategory::Mental,
                _ => ActionCategory::Health,
            },
            difficulty: match a.difficulty.as_deref().map(str::to_lowercase).as_deref() {
                Some("medium") => Difficulty::Medium,
                Some("hard") => Difficulty::Hard,
                _ => Difficulty::Easy,
            },
            estimated_time: a.estimated_time.unwrap_or_else(|| "5min".to_string()),
            completed: a.completed.unwrap_or(false),
            detail: None,
        })
        .collect();
    Some(ActionPlan {
        goal: scenario::plan_goal(language).to_string(),
        actions,
    })
}

#[async_trait]
impl CoachModel for HttpCoachModel {
    async fn generate_insights(
        &self,
        profile: &UserProfile,
        memory: &str,
        language: Language,
    ) -> Option<DailyInsights> {
        let prompt = format!(
            "{}\n\n\
Task: Create 1 Neuro/Stress Analysis (Hormone/Neurotransmitter trend focus) and 2 Health Guides (1 Phys, 1 Mental).\n\
Lang: **{}**.\n\
Icon: MUST BE A SINGLE EMOJI (e.g. 🧘, 🧠). No text.\n\
Return strict JSON: {{\"medicalAnalysis\": {{\"hormone\", \"hormoneDesc\", \"suggestion\", \"nutrient\"}}, \
\"customGuide\": [{{\"type\": \"physical\"|\"mental\", \"icon\", \"title\", \"exercise\", \"tip\"}}]}}.\n\
JSON Only.",
            profile_block(profile, memory),
            language_name(language)
        );

        let insights: DailyInsights = self
            .generate_structured(
                "You are a wellness coach analyst that outputs strict JSON only.",
                &prompt,
                0.4,
            )
            .await?;
        if insights.custom_guide.is_empty() {
            return None;
        }
        Some(insights)
    }

    async fn generate_action_plan(
        &self,
        profile: &UserProfile,
        memory: &str,
        language: Language,
    ) -> Option<ActionPlan> {
        let prompt = format!(
            "{}\n\n\
Task: Create a 3-item Micro-Action Checklist for Today in **{}**.\n\
Items should address pain relief, mental grounding, and basic routine.\n\
Focus: Rehabilitation, Stress Relief, Small Wins.\n\
Return strict JSON: {{\"goal\", \"actions\": [{{\"id\", \"title\", \"description\", \"category\", \
\"difficulty\", \"estimated_time\", \"completed\"}}]}}.\n\
JSON Only.",
            profile_block(profile, memory),
            language_name(language)
        );

        let raw: RawPlan = self
            .generate_structured(
                "You are a wellness coach planner that outputs strict JSON only.",
                &prompt,
                0.5,
            )
            .await?;
        sanitize_plan(raw, language)
    }

    async fn generate_item_detail(
        &self,
        title: &str,
        kind: DetailKind,
        profile: &UserProfile,
        language: Language,
    ) -> Option<RichDetail> {
        let prompt = format!(
            "Item: \"{}\" (Category: {})\n\
User Condition: {}, {}\n\
Task: Provide deep-dive health/wellness details.\n\n\
Requirements:\n\
1. background: explain the scientific mechanism (why this helps), mention physiology.\n\
2. guideSteps: 3-4 concrete steps.\n\
3. doctorComment: warm but professional coaching advice.\n\
4. expectedEffect: physiological/psychological benefit.\n\n\
Lang: **{}**. Return strict JSON with keys background, guideSteps, doctorComment, expectedEffect. JSON Only.",
            title,
            kind.label(),
            profile.physical_status,
            profile.mental_status,
            language_name(language)
        );

        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: "You are a wellness coach that outputs strict JSON only.".to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt,
            },
        ];
        match self.call_completion(messages, 0.4, 1200).await {
            Ok(text) => match parse_structured::<RichDetail>(&text) {
                Some(detail) if !detail.background.trim().is_empty() => Some(detail),
                // The API answered but the payload is unusable; hand back the
                // generic entry instead of dropping the item.
                _ => Some(scenario::fallback_rich_detail(language)),
            },
            Err(e) => {
                log::warn!("item detail generation failed for '{}': {}", title, e);
                None
            }
        }
    }

    async fn stream_chat(
        &self,
        profile: &UserProfile,
        turn: ChatTurn,
        on_delta: &(dyn for<'a> Fn(&'a str) + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<ChatReply, String> {
        let api_key = self.api_key()?;

        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: chat_system_instruction(profile, &turn.memory_digest, turn.language),
        }];
        let skip = turn.history.len().saturating_sub(MAX_HISTORY_TURNS);
        for (user, assistant) in turn.history.iter().skip(skip) {
            if user.trim().is_empty() {
                continue;
            }
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: user.clone(),
            });
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: assistant.clone(),
            });
        }
        let mut content = if turn.message.trim().is_empty() {
            "Analyze this symptom.".to_string()
        } else {
            turn.message.clone()
        };
        if turn.image_base64.is_some() {
            content.push_str("\n[The user attached a symptom photo; analyze from the description.]");
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content,
        });

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: 2048,
            stream: true,
        };

        let response = self
            .client
            .post(&self.settings.base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Net err: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("API Error {}: {}", status, text));
        }

        // Process the SSE stream line by line
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();
        let mut cancelled = false;
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let chunk = chunk.map_err(|e| e.to_string())?;
            let chunk_str = String::from_utf8_lossy(&chunk);
            buffer.push_str(&chunk_str);

            let lines: Vec<String> = buffer.split('\n').map(|l| l.to_string()).collect();
            let last_part = if chunk_str.ends_with('\n') {
                String::new()
            } else {
                lines.last().cloned().unwrap_or_default()
            };

            for line in &lines {
                let line = line.trim();
                if let Some(data) = line.strip_prefix("data: ") {
                    if data == "[DONE]" {
                        break;
                    }
                    if let Ok(stream_resp) = serde_json::from_str::<ChatStreamResponse>(data) {
                        if let Some(choice) = stream_resp.choices.first() {
                            if let Some(content) = choice.delta.content.clone() {
                                full_text.push_str(&content);
                                on_delta(&content);
                            }
                        }
                    }
                }
            }

            buffer = last_part;
        }

        let text = if cancelled {
            full_text
        } else {
            clean_chat_text(&full_text)
        };

        Ok(ChatReply {
            text,
            citations: Vec::new(),
            model: self.settings.model.clone(),
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_structured_strips_fences_and_prose() {
        let payload = "Sure, here you go:\n```json\n{\"background\": \"b\", \"guideSteps\": [\"s\"], \"doctorComment\": \"c\", \"expectedEffect\": \"e\"}\n```\nHope that helps!";
        let detail: RichDetail = parse_structured(payload).unwrap();
        assert_eq!(detail.background, "b");
        assert_eq!(detail.guide_steps, vec!["s".to_string()]);
    }

    #[test]
    fn parse_structured_rejects_garbage() {
        assert!(parse_structured::<RichDetail>("no json here").is_none());
        assert!(parse_structured::<RichDetail>("").is_none());
        assert!(parse_structured::<RichDetail>("{\"background\": }").is_none());
    }

    #[test]
    fn clean_chat_text_keeps_raw_when_cleanup_eats_too_much() {
        let text = format!("```json\nok\n```\n{}", "long trailing advice ".repeat(10));
        assert_eq!(clean_chat_text(&text), text.trim());
    }

    #[test]
    fn clean_chat_text_strips_trailing_artifacts() {
        assert_eq!(clean_chat_text("hello there}}```"), "hello there");
        assert_eq!(clean_chat_text("  plain answer  "), "plain answer");
    }

    #[test]
    fn sanitize_plan_defaults_and_forces_goal() {
        let raw: RawPlan = serde_json::from_str(
            r#"{"goal": "whatever the model said", "actions": [
                {"title": "Drink Water", "category": "ROUTINE", "difficulty": "Medium", "completed": true},
                {"title": "Stretch"}
            ]}"#,
        )
        .unwrap();
        let plan = sanitize_plan(raw, Language::En).unwrap();
        assert_eq!(plan.goal, "Today's Small Start");
        assert_eq!(plan.actions[0].category, ActionCategory::Routine);
        assert_eq!(plan.actions[0].difficulty, Difficulty::Medium);
        assert!(plan.actions[0].completed);
        assert_eq!(plan.actions[1].category, ActionCategory::Health);
        assert_eq!(plan.actions[1].estimated_time, "5min");
        assert!(plan.actions[1].id.starts_with("action-"));
    }

    #[test]
    fn sanitize_plan_rejects_empty_action_lists() {
        let raw: RawPlan = serde_json::from_str(r#"{"actions": []}"#).unwrap();
        assert!(sanitize_plan(raw, Language::Ko).is_none());
    }
}
