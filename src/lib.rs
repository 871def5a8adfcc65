//! Re:Boot core: local persistence and the daily-content lifecycle behind a
//! wellness-coaching chat app. All state lives in a namespaced key-value
//! store; all intelligence comes from an injected language-model collaborator.

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::*;
pub use services::ai::{ChatReply, ChatTurn, Citation, CoachModel, DetailKind, HttpCoachModel};
pub use services::coach::CoachSession;
pub use services::lifecycle::{DailyContent, DayStage, DetailTarget, LifecycleEvent};
pub use services::memory::{BackupError, MemoryStore, NAMESPACE};
pub use services::scenario::{
    demo_backup, initial_profile, scenario_for_offset, ScenarioBundle,
};
pub use storage::{KeyValueBackend, SessionStore, SqliteStore, TieredStorage};
pub use utils::dates::local_date_string;
