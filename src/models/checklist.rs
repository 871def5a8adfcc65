use serde::{Deserialize, Serialize};

use crate::models::summary::RichDetail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Health,
    Career,
    Routine,
    Mental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistStatus {
    Green,
    Yellow,
    Red,
    None,
}

/// Pure classification used by every checklist mutation path.
pub fn classify_status(rate: u32) -> ChecklistStatus {
    if rate >= 80 {
        ChecklistStatus::Green
    } else if rate >= 40 {
        ChecklistStatus::Yellow
    } else {
        ChecklistStatus::Red
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroAction {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ActionCategory,
    pub difficulty: Difficulty,
    // The original wire format keeps this one field snake_case.
    #[serde(rename = "estimated_time")]
    pub estimated_time: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<RichDetail>,
}

/// Goal plus actions, as produced by the plan generators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub goal: String,
    pub actions: Vec<MicroAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChecklist {
    /// YYYY-MM-DD
    pub date: String,
    pub items: Vec<MicroAction>,
    /// 0-100
    pub completion_rate: u32,
    pub status: ChecklistStatus,
}

impl DailyChecklist {
    pub fn from_items(date: impl Into<String>, items: Vec<MicroAction>) -> Self {
        let mut checklist = Self {
            date: date.into(),
            items,
            completion_rate: 0,
            status: ChecklistStatus::Red,
        };
        checklist.recompute();
        checklist
    }

    /// Recomputes rate and status together. Invariant: these two fields are
    /// never updated independently.
    pub fn recompute(&mut self) {
        let total = self.items.len();
        self.completion_rate = if total == 0 {
            0
        } else {
            let completed = self.items.iter().filter(|i| i.completed).count();
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        self.status = classify_status(self.completion_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, completed: bool) -> MicroAction {
        MicroAction {
            id: id.to_string(),
            title: "Drink Water".to_string(),
            description: "Hydrate".to_string(),
            category: ActionCategory::Routine,
            difficulty: Difficulty::Easy,
            estimated_time: "1min".to_string(),
            completed,
            detail: None,
        }
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(classify_status(100), ChecklistStatus::Green);
        assert_eq!(classify_status(80), ChecklistStatus::Green);
        assert_eq!(classify_status(79), ChecklistStatus::Yellow);
        assert_eq!(classify_status(40), ChecklistStatus::Yellow);
        assert_eq!(classify_status(39), ChecklistStatus::Red);
        assert_eq!(classify_status(0), ChecklistStatus::Red);
    }

    #[test]
    fn recompute_one_of_three() {
        let mut checklist = DailyChecklist::from_items(
            "2025-01-01",
            vec![action("a", false), action("b", false), action("c", false)],
        );
        checklist.items[0].completed = true;
        checklist.recompute();
        assert_eq!(checklist.completion_rate, 33);
        assert_eq!(checklist.status, ChecklistStatus::Red);
    }

    #[test]
    fn recompute_empty_list() {
        let checklist = DailyChecklist::from_items("2025-01-01", vec![]);
        assert_eq!(checklist.completion_rate, 0);
        assert_eq!(checklist.status, ChecklistStatus::Red);
    }

    #[test]
    fn estimated_time_stays_snake_case_on_the_wire() {
        let json = serde_json::to_string(&action("a", false)).unwrap();
        assert!(json.contains("\"estimated_time\""));
        assert!(!json.contains("estimatedTime"));
    }
}
