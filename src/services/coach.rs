//! Surface the UI talks to: day-scoped getters, the checklist toggle, chat
//! send, on-demand detail fetches, and the backup pair. Background work is
//! delegated to the lifecycle orchestrator and never blocks these calls.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::models::{
    ConversationLog, DailyChecklist, DailySummary, Language, RichDetail, Settings, UserProfile,
};
use crate::services::ai::{ChatReply, ChatTurn, CoachModel};
use crate::services::lifecycle::{DailyContent, DetailTarget, LifecycleEvent};
use crate::services::memory::{BackupError, MemoryStore};
use crate::services::scenario;
use crate::utils::dates::local_date_string;

pub struct CoachSession {
    store: Arc<MemoryStore>,
    model: Arc<dyn CoachModel>,
    lifecycle: DailyContent,
}

impl CoachSession {
    pub fn new(store: Arc<MemoryStore>, model: Arc<dyn CoachModel>, settings: &Settings) -> Self {
        let lifecycle = DailyContent::new(
            store.clone(),
            model.clone(),
            settings.content.enrichment_concurrency,
        );
        Self {
            store,
            model,
            lifecycle,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Call once on app start. A no-op until onboarding has saved a profile.
    pub fn start_session(&self) {
        if let Some(profile) = self.store.profile() {
            self.lifecycle.ensure_today_content(&profile);
        }
    }

    pub fn complete_onboarding(&self, profile: &UserProfile) {
        self.store.save_profile(profile);
        self.lifecycle.ensure_today_content(profile);
    }

    /// Language toggle keeps every stored record; only the profile changes.
    pub fn set_language(&self, language: Language) {
        if let Some(mut profile) = self.store.profile() {
            profile.language = language;
            self.store.save_profile(&profile);
        }
    }

    // ─── Day-scoped getters ───

    pub fn profile(&self) -> Option<UserProfile> {
        self.store.profile()
    }

    pub fn summaries(&self) -> Vec<DailySummary> {
        self.store.summaries()
    }

    pub fn summary_for_date(&self, date: &str) -> Option<DailySummary> {
        self.store.summary_for_date(date)
    }

    pub fn checklists(&self) -> Vec<DailyChecklist> {
        self.store.checklists()
    }

    pub fn checklist_for_date(&self, date: &str) -> Option<DailyChecklist> {
        self.store.checklist_for_date(date)
    }

    pub fn logs_for_date(&self, date: &str) -> Vec<ConversationLog> {
        self.store.logs_for_date(date)
    }

    // ─── Mutations ───

    /// Flips one item on today's checklist. Rate and status are recomputed
    /// together before the record is written back.
    pub fn toggle_action(&self, action_id: &str) -> Option<DailyChecklist> {
        let date = local_date_string(0);
        let mut checklist = self.store.checklist_for_date(&date)?;
        let item = checklist.items.iter_mut().find(|i| i.id == action_id)?;
        item.completed = !item.completed;
        checklist.recompute();
        self.store.save_checklist(checklist.clone());
        Some(checklist)
    }

    /// On-demand detail for an opened card; see the lifecycle module for the
    /// re-check and merge rules.
    pub async fn open_detail(&self, date: &str, target: &DetailTarget) -> Option<RichDetail> {
        let profile = self.store.profile()?;
        self.lifecycle.request_detail(&profile, date, target).await
    }

    /// Streams one chat exchange. Successful turns are logged to today's
    /// conversation; a cancelled stream keeps its partial text with a visible
    /// notice and is not logged. Errors are returned for the UI to surface —
    /// this is the one foreground path where failures are not muted.
    pub async fn send_message(
        &self,
        text: &str,
        image_base64: Option<String>,
        on_delta: &(dyn for<'a> Fn(&'a str) + Send + Sync),
        cancel: CancellationToken,
    ) -> Result<ChatReply, String> {
        let profile = self
            .store
            .profile()
            .ok_or_else(|| "no profile on record".to_string())?;
        if text.trim().is_empty() && image_base64.is_none() {
            return Err("nothing to send".to_string());
        }

        let today = local_date_string(0);
        let history = self
            .store
            .logs_for_date(&today)
            .into_iter()
            .map(|log| (log.user_message, log.ai_response))
            .collect();
        let turn = ChatTurn {
            message: text.to_string(),
            image_base64: image_base64.clone(),
            history,
            memory_digest: self.store.smart_context(),
            language: profile.language,
        };

        let mut reply = self
            .model
            .stream_chat(&profile, turn, on_delta, cancel)
            .await
            .map_err(|e| {
                log::error!("chat request failed: {}", e);
                e
            })?;

        if reply.cancelled {
            let notice = if profile.language.is_korean() {
                "생성이 취소되었습니다."
            } else {
                "Generation cancelled."
            };
            reply.text = format!("{}\n\n(🚫 {})", reply.text.trim_end(), notice);
        } else {
            let logged_user = if text.trim().is_empty() {
                "[Image]".to_string()
            } else {
                text.to_string()
            };
            self.store.add_log(&logged_user, &reply.text);
        }
        Ok(reply)
    }

    // ─── Housekeeping ───

    /// Deletes one day's summary and its conversation logs.
    pub fn delete_day(&self, date: &str) {
        self.store.delete_summary(date);
    }

    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn export_backup(&self) -> String {
        self.store.export_backup()
    }

    pub fn import_backup(&self, json: &str) -> Result<(), BackupError> {
        self.store.import_backup(json)
    }

    /// Imports the seeded 14-day demo history plus its profile.
    pub fn load_demo_data(&self, language: Language) -> Result<(), BackupError> {
        self.store.import_backup(&scenario::demo_backup(language))
    }

    pub fn generate_test_history(&self, language: Language) {
        self.store.generate_test_history(language);
    }
}
