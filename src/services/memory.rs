use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{ConversationLog, DailyChecklist, DailySummary, Language, UserProfile};
use crate::services::scenario;
use crate::storage::TieredStorage;
use crate::utils::dates::{creation_id, local_date_string, local_time_string, now_iso};

/// Every stored key lives under this prefix so backup, restore, and reset can
/// operate on the whole namespace at once.
pub const NAMESPACE: &str = "reboot_";

pub(crate) const KEY_PROFILE: &str = "reboot_user_profile";
pub(crate) const KEY_SUMMARY_INDEX: &str = "reboot_memory_index";
pub(crate) const KEY_CHECKLISTS: &str = "reboot_checklists";

pub(crate) fn log_key(date: &str) -> String {
    format!("reboot_logs_{}", date)
}

const MAX_LOGS_PER_DAY: usize = 100;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("backup payload contains no records")]
    Empty,
}

/// Typed access to the four record families. Every read degrades to an
/// empty/default value on parse or storage failure; storage errors never
/// propagate past this layer.
pub struct MemoryStore {
    storage: TieredStorage,
    context_days: usize,
}

impl MemoryStore {
    pub fn new(storage: TieredStorage) -> Self {
        Self {
            storage,
            context_days: 14,
        }
    }

    pub fn with_context_days(mut self, context_days: usize) -> Self {
        self.context_days = context_days.max(1);
        self
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.storage.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("corrupt record at {}, treating as absent: {}", key, e);
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.storage.set(key, &raw),
            Err(e) => log::error!("failed to serialize record for {}: {}", key, e),
        }
    }

    // ─── Profile ───

    /// Single-slot profile; every save stamps a fresh last-active timestamp.
    pub fn save_profile(&self, profile: &UserProfile) {
        let mut stamped = profile.clone();
        stamped.last_active = Some(now_iso());
        self.write_json(KEY_PROFILE, &stamped);
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.read_json(KEY_PROFILE)
    }

    pub fn has_profile(&self) -> bool {
        self.storage.get(KEY_PROFILE).is_some()
    }

    /// Wipes everything under the namespace, both tiers.
    pub fn reset(&self) {
        self.storage.clear_by_prefix(NAMESPACE);
    }

    // ─── Backup ───

    /// One JSON object mapping every namespaced key to its raw stored string.
    pub fn export_backup(&self) -> String {
        let snapshot = self.storage.export_by_prefix(NAMESPACE);
        serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    /// Destructive full-replace restore. The wipe only happens after the
    /// payload parses and contains at least one namespaced record, so an
    /// invalid file leaves storage untouched.
    pub fn import_backup(&self, json: &str) -> Result<(), BackupError> {
        let data: BTreeMap<String, String> = serde_json::from_str(json)?;
        let entries: Vec<(String, String)> = data
            .into_iter()
            .filter(|(key, _)| key.starts_with(NAMESPACE))
            .collect();
        if entries.is_empty() {
            return Err(BackupError::Empty);
        }

        self.reset();
        for (key, value) in entries {
            self.storage.set(&key, &value);
        }
        Ok(())
    }

    // ─── Conversation logs ───

    /// Appends a chat turn under today's day-scoped key. Days are capped at
    /// 100 entries, oldest evicted first; the whole day's array is persisted.
    pub fn add_log(&self, user_message: &str, ai_response: &str) {
        let date = local_date_string(0);
        let mut logs = self.logs_for_date(&date);
        while logs.len() >= MAX_LOGS_PER_DAY {
            logs.remove(0);
        }
        logs.push(ConversationLog {
            id: creation_id(),
            timestamp: now_iso(),
            time: local_time_string(),
            user_message: user_message.to_string(),
            ai_response: ai_response.to_string(),
        });
        self.write_json(&log_key(&date), &logs);
    }

    pub fn logs_for_date(&self, date: &str) -> Vec<ConversationLog> {
        self.read_json(&log_key(date)).unwrap_or_default()
    }

    pub fn recent_logs(&self, days_back: usize) -> Vec<ConversationLog> {
        let mut all: Vec<ConversationLog> = Vec::new();
        for offset in (0..days_back as i64).rev() {
            all.extend(self.logs_for_date(&local_date_string(offset)));
        }
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        all
    }

    pub fn save_logs_for_date(&self, date: &str, logs: &[ConversationLog]) {
        self.write_json(&log_key(date), &logs);
    }

    pub fn delete_logs_for_date(&self, date: &str) {
        self.storage.remove(&log_key(date));
    }

    // ─── Daily summaries ───

    /// Replace-by-date: at most one summary per calendar day, collection kept
    /// sorted ascending.
    pub fn save_summary(&self, summary: DailySummary) {
        let mut summaries = self.summaries();
        summaries.retain(|s| s.date != summary.date);
        summaries.push(summary);
        summaries.sort_by(|a, b| a.date.cmp(&b.date));
        self.write_json(KEY_SUMMARY_INDEX, &summaries);
    }

    pub fn summaries(&self) -> Vec<DailySummary> {
        self.read_json(KEY_SUMMARY_INDEX).unwrap_or_default()
    }

    pub fn summary_for_date(&self, date: &str) -> Option<DailySummary> {
        self.summaries().into_iter().find(|s| s.date == date)
    }

    pub fn delete_summary(&self, date: &str) {
        let mut summaries = self.summaries();
        summaries.retain(|s| s.date != date);
        self.write_json(KEY_SUMMARY_INDEX, &summaries);
        self.delete_logs_for_date(date);
    }

    /// Compact digest of the most recent summaries for prompt injection; caps
    /// prompt size instead of shipping full history.
    pub fn smart_context(&self) -> String {
        let summaries = self.summaries();
        let skip = summaries.len().saturating_sub(self.context_days);
        let recent: Vec<String> = summaries[skip..]
            .iter()
            .map(|s| format!("- {}: {}", s.date, s.summary))
            .collect();
        if recent.is_empty() {
            return String::new();
        }
        format!("[MEMORY] {}", recent.join("\n"))
    }

    // ─── Daily checklists ───

    pub fn save_checklist(&self, checklist: DailyChecklist) {
        let mut checklists = self.checklists();
        checklists.retain(|c| c.date != checklist.date);
        checklists.push(checklist);
        self.write_json(KEY_CHECKLISTS, &checklists);
    }

    pub fn checklists(&self) -> Vec<DailyChecklist> {
        self.read_json(KEY_CHECKLISTS).unwrap_or_default()
    }

    pub fn checklist_for_date(&self, date: &str) -> Option<DailyChecklist> {
        self.checklists().into_iter().find(|c| c.date == date)
    }

    // ─── Seeded history ───

    /// Fills the last 30 days with scenario content. Live (non-generated)
    /// summaries are preserved; their days are skipped entirely.
    pub fn generate_test_history(&self, language: Language) {
        let mut kept: Vec<DailySummary> = self
            .summaries()
            .into_iter()
            .filter(|s| !s.is_generated)
            .collect();

        for offset in 0..30 {
            let date = local_date_string(offset);
            if kept.iter().any(|s| s.date == date) {
                continue;
            }
            if let Some(bundle) = scenario::scenario_for_offset(offset, language) {
                kept.push(bundle.summary);
                self.save_logs_for_date(&date, &bundle.logs);
                self.save_checklist(bundle.checklist);
            }
        }

        kept.sort_by(|a, b| a.date.cmp(&b.date));
        self.write_json(KEY_SUMMARY_INDEX, &kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChecklistStatus, DailyChecklist};
    use crate::storage::{SessionStore, SqliteStore, TieredStorage};

    fn store() -> MemoryStore {
        let storage = TieredStorage::new(
            Box::new(SqliteStore::open_in_memory().unwrap()),
            Box::new(SessionStore::new()),
        );
        MemoryStore::new(storage)
    }

    fn summary(date: &str, text: &str) -> DailySummary {
        DailySummary {
            date: date.to_string(),
            summary: text.to_string(),
            sentiment_score: 5,
            health_tags: vec!["neck_pain".to_string()],
            career_tags: vec![],
            key_fact: "rest".to_string(),
            medical_analysis: None,
            custom_guide: None,
            is_generated: false,
        }
    }

    #[test]
    fn profile_save_stamps_last_active() {
        let store = store();
        let profile = scenario::initial_profile(Language::En);
        assert!(profile.last_active.is_none());
        store.save_profile(&profile);
        assert!(store.profile().unwrap().last_active.is_some());
    }

    #[test]
    fn log_cap_keeps_the_most_recent_hundred() {
        let store = store();
        for i in 0..150 {
            store.add_log(&format!("msg-{}", i), "ok");
        }
        let logs = store.logs_for_date(&local_date_string(0));
        assert_eq!(logs.len(), 100);
        assert_eq!(logs.first().unwrap().user_message, "msg-50");
        assert_eq!(logs.last().unwrap().user_message, "msg-149");
    }

    #[test]
    fn summary_save_replaces_by_date_and_sorts() {
        let store = store();
        store.save_summary(summary("2025-03-02", "second"));
        store.save_summary(summary("2025-03-01", "first"));
        store.save_summary(summary("2025-03-02", "revised"));

        let all = store.summaries();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date, "2025-03-01");
        assert_eq!(all[1].summary, "revised");
    }

    #[test]
    fn checklist_save_is_idempotent_per_date() {
        let store = store();
        let checklist = DailyChecklist::from_items("2025-03-01", vec![]);
        store.save_checklist(checklist.clone());
        store.save_checklist(checklist);
        assert_eq!(store.checklists().len(), 1);
        assert_eq!(
            store.checklist_for_date("2025-03-01").unwrap().status,
            ChecklistStatus::Red
        );
    }

    #[test]
    fn delete_summary_removes_the_days_logs_too() {
        let store = store();
        let date = local_date_string(0);
        store.add_log("hello", "hi");
        store.save_summary(summary(&date, "today"));

        store.delete_summary(&date);
        assert!(store.summary_for_date(&date).is_none());
        assert!(store.logs_for_date(&date).is_empty());
    }

    #[test]
    fn smart_context_caps_at_the_most_recent_window() {
        let store = store();
        for day in 1..=20 {
            store.save_summary(summary(&format!("2025-03-{:02}", day), &format!("day {}", day)));
        }
        let context = store.smart_context();
        assert!(context.starts_with("[MEMORY] "));
        assert!(!context.contains("day 6\n"));
        assert!(context.contains("- 2025-03-07: day 7"));
        assert!(context.contains("- 2025-03-20: day 20"));
    }

    #[test]
    fn smart_context_is_empty_without_history() {
        assert_eq!(store().smart_context(), "");
    }

    #[test]
    fn backup_round_trip_is_byte_identical() {
        let store = store();
        let date = local_date_string(0);
        store.save_profile(&scenario::initial_profile(Language::Ko));
        store.save_summary(summary(&date, "today"));
        store.save_checklist(DailyChecklist::from_items(date.as_str(), vec![]));
        store.add_log("안녕하세요", "반갑습니다");

        let exported = store.export_backup();
        store.reset();
        assert!(store.summaries().is_empty());

        store.import_backup(&exported).unwrap();
        assert_eq!(store.export_backup(), exported);
    }

    #[test]
    fn invalid_backup_leaves_storage_untouched() {
        let store = store();
        store.save_summary(summary("2025-03-01", "keep me"));

        assert!(store.import_backup("not json at all").is_err());
        assert!(matches!(
            store.import_backup("{}"),
            Err(BackupError::Empty)
        ));
        assert!(matches!(
            store.import_backup("{\"unrelated_key\": \"x\"}"),
            Err(BackupError::Empty)
        ));
        assert_eq!(store.summaries().len(), 1);
    }

    #[test]
    fn corrupt_record_degrades_to_empty() {
        let store = store();
        store.storage.set(KEY_SUMMARY_INDEX, "{{{{ not json");
        assert!(store.summaries().is_empty());
    }

    #[test]
    fn test_history_preserves_live_summaries() {
        let store = store();
        let today = local_date_string(0);
        let mut live = summary(&today, "real conversation happened");
        live.is_generated = false;
        store.save_summary(live);

        store.generate_test_history(Language::Ko);
        let all = store.summaries();
        assert_eq!(all.len(), 30);
        let todays = store.summary_for_date(&today).unwrap();
        assert_eq!(todays.summary, "real conversation happened");
        // Every generated day carries a checklist for the calendar.
        assert!(store.checklist_for_date(&local_date_string(10)).is_some());
    }
}
