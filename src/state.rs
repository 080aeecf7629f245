use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::chat::ChatService;
use crate::config::Config;
use crate::matching::MatchEngine;
use crate::moderation::{AdminNotificationFeed, ModerationWorkflow};
use crate::notify::{AdminAlerts, DynNotifier};
use crate::store::{DynDocumentStore, SqliteDocumentStore};
use crate::users::UserDirectory;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub matching: Arc<MatchEngine>,
    pub chat: ChatService,
    pub moderation: Arc<ModerationWorkflow>,
    pub feed: Arc<AdminNotificationFeed>,
    pub alerts: AdminAlerts,
}

impl AppState {
    /// Wire every service over one store and one notifier.
    pub fn new(pool: DbPool, config: &Config, notifier: DynNotifier) -> Self {
        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));
        let alerts = AdminAlerts::new();

        Self {
            users: Arc::new(UserDirectory::new(store.clone())),
            matching: Arc::new(MatchEngine::new(store.clone(), notifier.clone())),
            chat: ChatService::new(store.clone(), notifier.clone()),
            moderation: Arc::new(ModerationWorkflow::new(
                store.clone(),
                notifier,
                alerts.clone(),
                &config.moderation,
            )),
            feed: Arc::new(AdminNotificationFeed::new(store)),
            alerts,
        }
    }
}
