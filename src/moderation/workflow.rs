// Moderation workflow - reports, reviews and suspensions
use serde_json::{json, Value};

use super::domain::{
    AutoBanOutcome, AutoBanPolicy, DashboardStats, ModerationError, ReportDetail, ReportStatus,
};
use crate::config::ModerationConfig;
use crate::db::models::{collections, Report, User};
use crate::notify::{deliver, AdminAlert, AdminAlerts, DynNotifier, Notification};
use crate::store::{
    fields, new_id, server_timestamp, Direction, DynDocumentStore, Query, StoreError, Write,
};
use crate::users::{UserDirectory, UserId};

const REPORT_NOTIFICATION_TYPE: &str = "report";
const REPORT_ALERT_TITLE: &str = "New report";

pub struct ModerationWorkflow {
    store: DynDocumentStore,
    users: UserDirectory,
    notifier: DynNotifier,
    alerts: AdminAlerts,
    policy: AutoBanPolicy,
    default_reason: String,
}

impl ModerationWorkflow {
    pub fn new(
        store: DynDocumentStore,
        notifier: DynNotifier,
        alerts: AdminAlerts,
        config: &ModerationConfig,
    ) -> Self {
        Self {
            users: UserDirectory::new(store.clone()),
            store,
            notifier,
            alerts,
            policy: AutoBanPolicy {
                threshold: config.auto_ban_threshold,
                reason: config.auto_ban_reason.clone(),
            },
            default_reason: config.default_report_reason.clone(),
        }
    }

    /// File a pending report together with its unread admin notification,
    /// then alert listening admin sessions. Repeat reports are kept.
    pub async fn file_report(
        &self,
        reporter: &UserId,
        reported: &UserId,
        reason: &str,
    ) -> Result<Report, ModerationError> {
        if reporter == reported {
            return Err(ModerationError::SelfReport);
        }
        let reason = match reason.trim() {
            "" => self.default_reason.as_str(),
            reason => reason,
        };

        let report_id = new_id();
        self.store
            .commit(vec![
                Write::create(
                    collections::REPORTS,
                    report_id.as_str(),
                    fields(json!({
                        "reporterId": reporter.as_str(),
                        "reportedUserId": reported.as_str(),
                        "reportReason": reason,
                        "reportedAt": server_timestamp(),
                        "status": ReportStatus::Pending.as_str(),
                    })),
                ),
                Write::create(
                    collections::ADMIN_NOTIFICATIONS,
                    new_id(),
                    fields(json!({
                        "type": REPORT_NOTIFICATION_TYPE,
                        "reporterId": reporter.as_str(),
                        "reportedUserId": reported.as_str(),
                        "reason": reason,
                        "notifiedAt": server_timestamp(),
                        "read": false,
                    })),
                ),
            ])
            .await?;

        let listeners = self.alerts.publish(AdminAlert {
            report_id: report_id.clone(),
            reporter_id: reporter.to_string(),
            reported_user_id: reported.to_string(),
            reason: reason.to_string(),
        });
        tracing::info!(report = %report_id, %reporter, %reported, listeners, "Report filed");

        deliver(
            self.notifier.as_ref(),
            Notification::local(
                REPORT_ALERT_TITLE,
                format!("User {} was reported: {}", reported, reason),
            ),
        )
        .await;

        self.report(&report_id).await
    }

    /// Approve a pending report, then re-evaluate the reported user against
    /// the auto-ban threshold.
    pub async fn approve_report(&self, report_id: &str) -> Result<AutoBanOutcome, ModerationError> {
        let report = self.transition(report_id, ReportStatus::Approved).await?;
        tracing::info!(report = %report_id, user = %report.reported_user_id, "Report approved");

        self.auto_ban_check(&report.reported_user_id).await
    }

    /// Suspend `user_id` and relabel its approved reports once enough of
    /// them have accumulated. Safe to repeat: relabelled reports no longer
    /// count.
    pub async fn auto_ban_check(&self, user_id: &str) -> Result<AutoBanOutcome, ModerationError> {
        let query = Query::collection(collections::REPORTS)
            .where_eq("reportedUserId", user_id)
            .where_eq("status", ReportStatus::Approved.as_str());
        let approved = self.store.query(&query).await?;

        if !self.policy.triggers(approved.len()) {
            return Ok(AutoBanOutcome::BelowThreshold {
                approved: approved.len(),
            });
        }

        let mut writes = vec![Write::merge(
            collections::USERS,
            user_id,
            fields(json!({
                "isSuspended": true,
                "banReason": self.policy.reason,
                "banDate": server_timestamp(),
            })),
        )];
        writes.extend(approved.iter().map(|doc| {
            Write::update(
                collections::REPORTS,
                doc.id.as_str(),
                fields(json!({ "status": ReportStatus::AutoBanned.as_str() })),
            )
        }));
        self.store.commit(writes).await?;

        let report_ids: Vec<String> = approved.into_iter().map(|doc| doc.id).collect();
        tracing::warn!(user = %user_id, reports = report_ids.len(), "User automatically suspended");

        Ok(AutoBanOutcome::Suspended { report_ids })
    }

    pub async fn reject_report(&self, report_id: &str) -> Result<Report, ModerationError> {
        let report = self.transition(report_id, ReportStatus::Rejected).await?;
        tracing::info!(report = %report_id, "Report rejected");
        Ok(report)
    }

    /// Ban the reported user directly, stamping the report's reason on the
    /// profile. The report and the suspension land in one batch.
    pub async fn ban_user(&self, report_id: &str) -> Result<Report, ModerationError> {
        let report = self.report(report_id).await?;
        ensure_transition(&report, ReportStatus::Banned)?;

        self.store
            .commit(vec![
                Write::merge(
                    collections::USERS,
                    report.reported_user_id.as_str(),
                    fields(json!({
                        "isSuspended": true,
                        "banReason": report.report_reason,
                        "banDate": server_timestamp(),
                    })),
                ),
                Write::update(
                    collections::REPORTS,
                    report_id,
                    fields(json!({ "status": ReportStatus::Banned.as_str() })),
                ),
            ])
            .await?;

        tracing::warn!(report = %report_id, user = %report.reported_user_id, "User banned");
        self.report(report_id).await
    }

    /// Lift a suspension. Reports keep whatever status they reached.
    pub async fn unsuspend(&self, user_id: &UserId) -> Result<User, ModerationError> {
        let cleared = fields(json!({
            "isSuspended": false,
            "banReason": Value::Null,
            "banDate": Value::Null,
        }));
        match self
            .store
            .update(collections::USERS, user_id.as_str(), cleared)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                return Err(ModerationError::UserNotFound(user_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user = %user_id, "User unsuspended");
        self.users
            .get(user_id.as_str())
            .await?
            .ok_or_else(|| ModerationError::UserNotFound(user_id.to_string()))
    }

    /// File a report and suspend the reported user straight away, without
    /// waiting for review.
    pub async fn report_and_suspend(
        &self,
        reporter: &UserId,
        user_id: &UserId,
        reason: &str,
    ) -> Result<Report, ModerationError> {
        let report = self.file_report(reporter, user_id, reason).await?;

        self.store
            .merge(
                collections::USERS,
                user_id.as_str(),
                fields(json!({ "isSuspended": true })),
            )
            .await?;

        tracing::warn!(user = %user_id, report = %report.id, "User suspended on report");
        Ok(report)
    }

    /// Reports newest first, optionally narrowed to one status.
    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<Report>, ModerationError> {
        let mut query = Query::collection(collections::REPORTS)
            .order_by("reportedAt", Direction::Descending);
        if let Some(status) = status {
            query = query.where_eq("status", status.as_str());
        }

        let docs = self.store.query(&query).await?;
        Ok(docs
            .iter()
            .map(|d| d.decode())
            .collect::<Result<Vec<Report>, _>>()?)
    }

    pub async fn report_detail(&self, report_id: &str) -> Result<ReportDetail, ModerationError> {
        let report = self.report(report_id).await?;
        let reported_user = self.users.get(&report.reported_user_id).await?;
        Ok(ReportDetail {
            report,
            reported_user,
        })
    }

    pub async fn suspended_users(&self) -> Result<Vec<User>, ModerationError> {
        Ok(self.users.suspended().await?)
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, ModerationError> {
        let users = self.users.all().await?;
        let reports = self.list_reports(None).await?;

        let with_status = |status: ReportStatus| reports.iter().filter(|r| r.status == status).count();
        Ok(DashboardStats {
            total_users: users.len(),
            suspended_users: users.iter().filter(|u| u.is_suspended).count(),
            total_reports: reports.len(),
            approved_reports: with_status(ReportStatus::Approved),
            auto_banned_reports: with_status(ReportStatus::AutoBanned),
        })
    }

    async fn report(&self, report_id: &str) -> Result<Report, ModerationError> {
        let doc = self
            .store
            .get(collections::REPORTS, report_id)
            .await?
            .ok_or_else(|| ModerationError::ReportNotFound(report_id.to_string()))?;
        Ok(doc.decode()?)
    }

    async fn transition(&self, report_id: &str, to: ReportStatus) -> Result<Report, ModerationError> {
        let mut report = self.report(report_id).await?;
        ensure_transition(&report, to)?;

        self.store
            .update(
                collections::REPORTS,
                report_id,
                fields(json!({ "status": to.as_str() })),
            )
            .await?;

        report.status = to;
        Ok(report)
    }
}

fn ensure_transition(report: &Report, to: ReportStatus) -> Result<(), ModerationError> {
    if report.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(ModerationError::InvalidTransition {
            report: report.id.clone(),
            from: report.status,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::AdminNotification;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::SqliteDocumentStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        workflow: ModerationWorkflow,
        store: DynDocumentStore,
        alerts: AdminAlerts,
        notifier: Arc<RecordingNotifier>,
        _temp: TempDir,
    }

    fn create_harness() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let store: DynDocumentStore = Arc::new(SqliteDocumentStore::new(pool));
        let notifier = Arc::new(RecordingNotifier::default());
        let alerts = AdminAlerts::new();

        Harness {
            workflow: ModerationWorkflow::new(
                store.clone(),
                notifier.clone(),
                alerts.clone(),
                &ModerationConfig::default(),
            ),
            store,
            alerts,
            notifier,
            _temp: temp_dir,
        }
    }

    fn uid(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    async fn seed_user(store: &DynDocumentStore, id: &str) {
        store
            .set(
                collections::USERS,
                id,
                fields(json!({ "name": id, "isSuspended": false })),
            )
            .await
            .unwrap();
    }

    async fn user(store: &DynDocumentStore, id: &str) -> User {
        store
            .get(collections::USERS, id)
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_file_report_writes_report_and_notification() {
        let h = create_harness();
        let mut alerts = h.alerts.subscribe();

        let report = h
            .workflow
            .file_report(&uid("alice"), &uid("mallory"), "rude messages")
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.report_reason, "rude messages");
        assert!(report.reported_at.is_some());

        let notifications: Vec<AdminNotification> = h
            .store
            .query(&Query::collection(collections::ADMIN_NOTIFICATIONS))
            .await
            .unwrap()
            .iter()
            .map(|d| d.decode().unwrap())
            .collect();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "report");
        assert_eq!(notifications[0].reported_user_id, "mallory");
        assert!(!notifications[0].read);

        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.report_id, report.id);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_reason_gets_default() {
        let h = create_harness();
        let report = h
            .workflow
            .file_report(&uid("alice"), &uid("mallory"), "   ")
            .await
            .unwrap();
        assert_eq!(report.report_reason, "Inappropriate conversation");
    }

    #[tokio::test]
    async fn test_self_report_rejected() {
        let h = create_harness();
        let result = h.workflow.file_report(&uid("alice"), &uid("alice"), "x").await;
        assert!(matches!(result, Err(ModerationError::SelfReport)));
    }

    #[tokio::test]
    async fn test_duplicate_reports_are_kept() {
        let h = create_harness();
        for _ in 0..2 {
            h.workflow
                .file_report(&uid("alice"), &uid("mallory"), "spam")
                .await
                .unwrap();
        }
        assert_eq!(h.workflow.list_reports(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_auto_ban_on_third_approval() {
        let h = create_harness();
        seed_user(&h.store, "mallory").await;

        let mut ids = Vec::new();
        for reporter in ["alice", "bob", "carol"] {
            let report = h
                .workflow
                .file_report(&uid(reporter), &uid("mallory"), "spam")
                .await
                .unwrap();
            ids.push(report.id);
        }

        let first = h.workflow.approve_report(&ids[0]).await.unwrap();
        let second = h.workflow.approve_report(&ids[1]).await.unwrap();
        assert_eq!(second, AutoBanOutcome::BelowThreshold { approved: 2 });
        assert!(!first.suspended());
        assert!(!user(&h.store, "mallory").await.is_suspended);

        let third = h.workflow.approve_report(&ids[2]).await.unwrap();
        assert!(third.suspended());

        let banned = user(&h.store, "mallory").await;
        assert!(banned.is_suspended);
        assert_eq!(
            banned.ban_reason.as_deref(),
            Some(ModerationConfig::default().auto_ban_reason.as_str())
        );
        assert!(banned.ban_date.is_some());

        let auto_banned = h
            .workflow
            .list_reports(Some(ReportStatus::AutoBanned))
            .await
            .unwrap();
        assert_eq!(auto_banned.len(), 3);
    }

    #[tokio::test]
    async fn test_auto_ban_check_is_idempotent() {
        let h = create_harness();
        let mut ids = Vec::new();
        for reporter in ["alice", "bob", "carol"] {
            ids.push(
                h.workflow
                    .file_report(&uid(reporter), &uid("mallory"), "spam")
                    .await
                    .unwrap()
                    .id,
            );
        }
        for id in &ids {
            h.workflow.approve_report(id).await.unwrap();
        }

        let again = h.workflow.auto_ban_check("mallory").await.unwrap();
        assert_eq!(again, AutoBanOutcome::BelowThreshold { approved: 0 });
        // Suspension lands even without a profile on file
        assert!(user(&h.store, "mallory").await.is_suspended);
    }

    #[tokio::test]
    async fn test_rejected_report_cannot_be_approved() {
        let h = create_harness();
        let report = h
            .workflow
            .file_report(&uid("alice"), &uid("mallory"), "spam")
            .await
            .unwrap();

        let rejected = h.workflow.reject_report(&report.id).await.unwrap();
        assert_eq!(rejected.status, ReportStatus::Rejected);

        let result = h.workflow.approve_report(&report.id).await;
        assert!(matches!(
            result,
            Err(ModerationError::InvalidTransition {
                from: ReportStatus::Rejected,
                to: ReportStatus::Approved,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_report() {
        let h = create_harness();
        let result = h.workflow.reject_report("missing").await;
        assert!(matches!(result, Err(ModerationError::ReportNotFound(_))));
    }

    #[tokio::test]
    async fn test_ban_user_uses_report_reason() {
        let h = create_harness();
        seed_user(&h.store, "mallory").await;
        let report = h
            .workflow
            .file_report(&uid("alice"), &uid("mallory"), "harassment")
            .await
            .unwrap();

        let banned = h.workflow.ban_user(&report.id).await.unwrap();

        assert_eq!(banned.status, ReportStatus::Banned);
        let mallory = user(&h.store, "mallory").await;
        assert!(mallory.is_suspended);
        assert_eq!(mallory.ban_reason.as_deref(), Some("harassment"));
    }

    #[tokio::test]
    async fn test_unsuspend_leaves_reports_alone() {
        let h = create_harness();
        seed_user(&h.store, "mallory").await;
        for reporter in ["alice", "bob", "carol"] {
            let id = h
                .workflow
                .file_report(&uid(reporter), &uid("mallory"), "spam")
                .await
                .unwrap()
                .id;
            h.workflow.approve_report(&id).await.unwrap();
        }

        let restored = h.workflow.unsuspend(&uid("mallory")).await.unwrap();

        assert!(!restored.is_suspended);
        assert!(restored.ban_reason.is_none());
        assert!(restored.ban_date.is_none());
        let reports = h.workflow.list_reports(None).await.unwrap();
        assert!(reports.iter().all(|r| r.status == ReportStatus::AutoBanned));
    }

    #[tokio::test]
    async fn test_unsuspend_unknown_user() {
        let h = create_harness();
        let result = h.workflow.unsuspend(&uid("ghost")).await;
        assert!(matches!(result, Err(ModerationError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_report_and_suspend() {
        let h = create_harness();
        seed_user(&h.store, "mallory").await;

        let report = h
            .workflow
            .report_and_suspend(&uid("admin"), &uid("mallory"), "")
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Pending);
        assert!(user(&h.store, "mallory").await.is_suspended);
        assert_eq!(h.workflow.suspended_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_report_detail_and_dashboard() {
        let h = create_harness();
        seed_user(&h.store, "mallory").await;
        seed_user(&h.store, "alice").await;
        let report = h
            .workflow
            .file_report(&uid("alice"), &uid("mallory"), "spam")
            .await
            .unwrap();
        h.workflow
            .file_report(&uid("alice"), &uid("ghost"), "spam")
            .await
            .unwrap();
        h.workflow.approve_report(&report.id).await.unwrap();

        let detail = h.workflow.report_detail(&report.id).await.unwrap();
        assert_eq!(detail.report.status, ReportStatus::Approved);
        assert_eq!(detail.reported_user.map(|u| u.id).as_deref(), Some("mallory"));

        let stats = h.workflow.dashboard().await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total_users: 2,
                suspended_users: 0,
                total_reports: 2,
                approved_reports: 1,
                auto_banned_reports: 0,
            }
        );
    }
}
