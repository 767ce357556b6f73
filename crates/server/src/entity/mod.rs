pub mod channel;
pub mod notification;
pub mod notification_template;
pub mod scheduled_notification;
pub mod security_log;
pub mod subscription;
