pub mod domain;
pub mod feed;
pub mod workflow;

pub use domain::{
    AutoBanOutcome, AutoBanPolicy, DashboardStats, ModerationError, ReportDetail, ReportStatus,
};
pub use feed::AdminNotificationFeed;
pub use workflow::ModerationWorkflow;
