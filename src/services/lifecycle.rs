//! Per-day content lifecycle: guarantee the UI has content the moment a
//! profile exists, then upgrade and enrich it in the background without
//! disturbing anything the user is doing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::models::{DailyChecklist, DailySummary, RichDetail, UserProfile};
use crate::services::ai::{CoachModel, DetailKind};
use crate::services::memory::MemoryStore;
use crate::services::scenario;
use crate::utils::dates::local_date_string;

/// Lifecycle stage of one calendar day's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStage {
    Missing,
    InstantFallback,
    Enriching,
    Enriched,
}

#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub date: String,
    pub stage: DayStage,
}

/// Identity of an enrichable item inside a day's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailTarget {
    Action { id: String },
    Guide { title: String },
    Medical,
}

impl DetailTarget {
    fn kind(&self) -> DetailKind {
        match self {
            DetailTarget::Action { .. } => DetailKind::Action,
            DetailTarget::Guide { .. } => DetailKind::Health,
            DetailTarget::Medical => DetailKind::Medical,
        }
    }
}

// ─── Pure Merge Functions ───

/// Attaches a detail to the matching action without touching anything else in
/// the record. Callers re-read the record immediately before calling these so
/// a concurrent user edit is never clobbered.
pub fn merge_action_detail(checklist: &mut DailyChecklist, action_id: &str, detail: RichDetail) {
    if let Some(item) = checklist.items.iter_mut().find(|i| i.id == action_id) {
        item.detail = Some(detail);
    }
}

pub fn merge_guide_detail(summary: &mut DailySummary, title: &str, detail: RichDetail) {
    if let Some(guides) = summary.custom_guide.as_mut() {
        if let Some(guide) = guides.iter_mut().find(|g| g.title == title) {
            guide.detail = Some(detail);
        }
    }
}

pub fn merge_medical_detail(summary: &mut DailySummary, detail: RichDetail) {
    if let Some(medical) = summary.medical_analysis.as_mut() {
        medical.detail = Some(detail);
    }
}

// ─── Orchestrator ───

/// Clones share all state; spawned background tasks carry their own clone.
#[derive(Clone)]
pub struct DailyContent {
    store: Arc<MemoryStore>,
    model: Arc<dyn CoachModel>,
    stages: Arc<Mutex<HashMap<String, DayStage>>>,
    enrich_permits: Arc<Semaphore>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl DailyContent {
    pub fn new(
        store: Arc<MemoryStore>,
        model: Arc<dyn CoachModel>,
        enrichment_concurrency: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            model,
            stages: Arc::new(Mutex::new(HashMap::new())),
            enrich_permits: Arc::new(Semaphore::new(enrichment_concurrency.max(1))),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn stage_for(&self, date: &str) -> DayStage {
        match self.stages.lock() {
            Ok(stages) => stages.get(date).copied().unwrap_or(DayStage::Missing),
            Err(_) => DayStage::Missing,
        }
    }

    fn set_stage(&self, date: &str, stage: DayStage) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.insert(date.to_string(), stage);
        }
        let _ = self.events.send(LifecycleEvent {
            date: date.to_string(),
            stage,
        });
    }

    /// Entry point on app start or onboarding completion. The synchronous part
    /// guarantees today's summary and checklist exist before this returns; all
    /// AI work runs in spawned tasks and never blocks the caller.
    pub fn ensure_today_content(&self, profile: &UserProfile) {
        let date = local_date_string(0);
        let language = profile.language;

        if self.store.summary_for_date(&date).is_none() {
            self.store
                .save_summary(scenario::instant_daily_summary(profile, language));
            if self.store.checklist_for_date(&date).is_none() {
                let plan = scenario::instant_daily_plan(language);
                self.store
                    .save_checklist(DailyChecklist::from_items(date.clone(), plan.actions));
            }
            self.set_stage(&date, DayStage::InstantFallback);

            let this = self.clone();
            let profile = profile.clone();
            tokio::spawn(async move {
                this.upgrade(profile, date).await;
            });
        } else {
            // Content already exists (prior session or seeded history); only
            // detail-level enrichment remains.
            self.set_stage(&date, DayStage::Enriching);

            let this = self.clone();
            let profile = profile.clone();
            tokio::spawn(async move {
                this.enrich_missing_details(&profile, &date).await;
                this.set_stage(&date, DayStage::Enriched);
            });
        }
    }

    /// Regenerates insights and plan through the collaborator and replaces the
    /// day's records wholesale. A full failure leaves the instant content in
    /// place indefinitely; there is no retry loop.
    async fn upgrade(&self, profile: UserProfile, date: String) {
        let language = profile.language;
        let memory = self.store.smart_context();
        let (insights, plan) = tokio::join!(
            self.model.generate_insights(&profile, &memory, language),
            self.model.generate_action_plan(&profile, &memory, language)
        );

        let mut upgraded = false;
        if let Some(insights) = insights {
            let mut summary = self
                .store
                .summary_for_date(&date)
                .unwrap_or_else(|| scenario::instant_daily_summary(&profile, language));
            summary.medical_analysis = Some(insights.medical_analysis);
            summary.custom_guide = Some(insights.custom_guide);
            summary.is_generated = false;
            self.store.save_summary(summary);
            upgraded = true;
        }
        if let Some(plan) = plan {
            self.store
                .save_checklist(DailyChecklist::from_items(date.clone(), plan.actions));
            upgraded = true;
        }

        if !upgraded {
            log::warn!(
                "daily content upgrade failed for {}, keeping instant fallback",
                date
            );
            return;
        }

        self.set_stage(&date, DayStage::Enriching);
        self.enrich_missing_details(&profile, &date).await;
        self.set_stage(&date, DayStage::Enriched);
    }

    fn pending_targets(&self, date: &str) -> Vec<DetailTarget> {
        let mut targets = Vec::new();
        if let Some(checklist) = self.store.checklist_for_date(date) {
            for item in &checklist.items {
                if item.detail.is_none() {
                    targets.push(DetailTarget::Action {
                        id: item.id.clone(),
                    });
                }
            }
        }
        if let Some(summary) = self.store.summary_for_date(date) {
            if let Some(guides) = &summary.custom_guide {
                for guide in guides {
                    if guide.detail.is_none() {
                        targets.push(DetailTarget::Guide {
                            title: guide.title.clone(),
                        });
                    }
                }
            }
            if let Some(medical) = &summary.medical_analysis {
                if medical.detail.is_none() {
                    targets.push(DetailTarget::Medical);
                }
            }
        }
        targets
    }

    /// Title used in the generation prompt, plus any detail already attached.
    fn find_item(&self, date: &str, target: &DetailTarget) -> Option<(String, Option<RichDetail>)> {
        match target {
            DetailTarget::Action { id } => {
                let checklist = self.store.checklist_for_date(date)?;
                let item = checklist.items.into_iter().find(|i| &i.id == id)?;
                Some((item.title, item.detail))
            }
            DetailTarget::Guide { title } => {
                let summary = self.store.summary_for_date(date)?;
                let guide = summary
                    .custom_guide?
                    .into_iter()
                    .find(|g| &g.title == title)?;
                Some((guide.title, guide.detail))
            }
            DetailTarget::Medical => {
                let medical = self.store.summary_for_date(date)?.medical_analysis?;
                Some((medical.hormone, medical.detail))
            }
        }
    }

    /// Re-reads the current record and writes it back with the detail merged
    /// in, so a toggle that happened while the request was in flight survives.
    fn apply_detail(&self, date: &str, target: &DetailTarget, detail: RichDetail) {
        match target {
            DetailTarget::Action { id } => {
                if let Some(mut checklist) = self.store.checklist_for_date(date) {
                    merge_action_detail(&mut checklist, id, detail);
                    self.store.save_checklist(checklist);
                }
            }
            DetailTarget::Guide { title } => {
                if let Some(mut summary) = self.store.summary_for_date(date) {
                    merge_guide_detail(&mut summary, title, detail);
                    self.store.save_summary(summary);
                }
            }
            DetailTarget::Medical => {
                if let Some(mut summary) = self.store.summary_for_date(date) {
                    merge_medical_detail(&mut summary, detail);
                    self.store.save_summary(summary);
                }
            }
        }
    }

    /// One independent request per item lacking a detail, all in flight
    /// concurrently behind the worker-pool cap. Failures leave the item
    /// without a detail; the on-demand path picks those up later.
    async fn enrich_missing_details(&self, profile: &UserProfile, date: &str) {
        let targets = self.pending_targets(date);
        if targets.is_empty() {
            return;
        }

        let mut tasks = JoinSet::new();
        for target in targets {
            let this = self.clone();
            let profile = profile.clone();
            let date = date.to_string();
            tasks.spawn(async move {
                let permit = match this.enrich_permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let Some((title, existing)) = this.find_item(&date, &target) else {
                    return;
                };
                if existing.is_some() {
                    return;
                }
                let generated = this
                    .model
                    .generate_item_detail(&title, target.kind(), &profile, profile.language)
                    .await;
                drop(permit);
                match generated {
                    Some(detail) => this.apply_detail(&date, &target, detail),
                    None => log::debug!("detail enrichment skipped for '{}'", title),
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// On-demand fetch for a detail view: the store is re-checked first in
    /// case background enrichment completed after the view model was captured.
    pub async fn request_detail(
        &self,
        profile: &UserProfile,
        date: &str,
        target: &DetailTarget,
    ) -> Option<RichDetail> {
        let (title, existing) = self.find_item(date, target)?;
        if let Some(detail) = existing {
            return Some(detail);
        }

        match self
            .model
            .generate_item_detail(&title, target.kind(), profile, profile.language)
            .await
        {
            Some(detail) => {
                self.apply_detail(date, target, detail.clone());
                Some(detail)
            }
            None => {
                log::warn!("on-demand detail fetch failed for '{}'", title);
                None
            }
        }
    }
}
