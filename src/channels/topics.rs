//! Topic and destination names. Exact strings, case-sensitive.

use std::fmt::Display;

/// Document status changes for every document.
pub const DOCUMENT_STATUS: &str = "/topic/document-status";

/// Organisation-wide activity feed.
pub const ACTIVITY: &str = "/topic/activity";

/// Online/away/offline changes of every user.
pub const USER_PRESENCE: &str = "/topic/user-presence";

/// Destination for the current user's presence updates.
pub const PRESENCE_DESTINATION: &str = "/app/presence";

/// Destination for typing indicators.
pub const TYPING_DESTINATION: &str = "/app/typing";

/// Per-user notification queue.
#[must_use]
pub fn user_notifications(user_id: impl Display) -> String {
    format!("/user/{user_id}/notifications")
}

/// Broadcasts to one department.
#[must_use]
pub fn department(department: impl Display) -> String {
    format!("/topic/department/{department}")
}
