use serde::{Deserialize, Serialize};

/// Deep-dive content block attached to an action, guide, or analysis card.
/// Always attached as a whole; enrichment never fills individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichDetail {
    pub background: String,
    pub guide_steps: Vec<String>,
    pub doctor_comment: String,
    pub expected_effect: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuideKind {
    Physical,
    Mental,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomGuideItem {
    #[serde(rename = "type")]
    pub kind: GuideKind,
    pub icon: String,
    pub title: String,
    pub exercise: String,
    pub tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<RichDetail>,
}

/// Hormone/neurotransmitter framing plus a nutrition suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalAnalysis {
    pub hormone: String,
    pub hormone_desc: String,
    pub suggestion: String,
    pub nutrient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<RichDetail>,
}

/// Compact record of one calendar day. At most one per date; the stored
/// collection stays sorted ascending by date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    /// YYYY-MM-DD
    pub date: String,
    pub summary: String,
    /// 1-10
    pub sentiment_score: i32,
    pub health_tags: Vec<String>,
    pub career_tags: Vec<String>,
    pub key_fact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_analysis: Option<MedicalAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_guide: Option<Vec<CustomGuideItem>>,
    /// True for seeded/demo records, so live output can replace them freely.
    #[serde(default)]
    pub is_generated: bool,
}

/// Shape shared by the live AI insights generator and the instant fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyInsights {
    pub medical_analysis: MedicalAnalysis,
    pub custom_guide: Vec<CustomGuideItem>,
}
