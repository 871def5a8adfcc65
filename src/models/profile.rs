use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    En,
}

impl Language {
    pub fn is_korean(self) -> bool {
        matches!(self, Language::Ko)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Ko
    }
}

/// One point of the onboarding mood history. The date is a relative label
/// ("7일전", "7 days ago", "오늘", "Today"), not a calendar day key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodPoint {
    pub date: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub age: String,
    pub job_status: String,
    pub physical_status: String,
    pub mental_status: String,
    pub stress_level: i32,
    #[serde(default)]
    pub mood_history: Vec<MoodPoint>,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<String>,
}
