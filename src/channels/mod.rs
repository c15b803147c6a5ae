//! Channel helpers: typed wrappers binding a topic-naming convention to
//! [`RealtimeClient::subscribe`] and [`RealtimeClient::send`].
//!
//! Helpers keep no state of their own. A body that is valid JSON but does
//! not match the expected payload type is logged and dropped; the
//! subscription stays alive.

use std::fmt::Display;

use serde::de::DeserializeOwned;

use crate::client::{RealtimeClient, SubscriptionId};

pub mod payloads;
pub mod topics;

pub use payloads::{
    ActivityEvent, DepartmentMessage, DocumentStatusUpdate, Notification, PresencePayload,
    PresenceStatus, PresenceUpdate, ResourceId, TypingPayload,
};

impl RealtimeClient {
    /// Subscribes a handler that receives bodies deserialized as `T`.
    pub fn subscribe_as<T, F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let owned_topic = topic.to_string();
        self.subscribe(topic, move |value| match serde_json::from_value::<T>(value) {
            Ok(payload) => handler(payload),
            Err(err) => {
                tracing::warn!(
                    topic = %owned_topic,
                    error = %err,
                    "dropping payload with unexpected shape"
                );
            }
        })
    }

    /// Notifications for one user: `/user/{user_id}/notifications`.
    pub fn subscribe_to_notifications<F>(&self, user_id: impl Display, handler: F) -> SubscriptionId
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.subscribe_as(&topics::user_notifications(user_id), handler)
    }

    /// Document status changes: `/topic/document-status`.
    pub fn subscribe_to_document_status<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(DocumentStatusUpdate) + Send + Sync + 'static,
    {
        self.subscribe_as(topics::DOCUMENT_STATUS, handler)
    }

    /// Activity feed: `/topic/activity`.
    pub fn subscribe_to_activity_feed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ActivityEvent) + Send + Sync + 'static,
    {
        self.subscribe_as(topics::ACTIVITY, handler)
    }

    /// Presence changes of all users: `/topic/user-presence`.
    pub fn subscribe_to_user_presence<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(PresenceUpdate) + Send + Sync + 'static,
    {
        self.subscribe_as(topics::USER_PRESENCE, handler)
    }

    /// Department broadcast: `/topic/department/{department}`.
    pub fn subscribe_to_department<F>(&self, department: impl Display, handler: F) -> SubscriptionId
    where
        F: Fn(DepartmentMessage) + Send + Sync + 'static,
    {
        self.subscribe_as(&topics::department(department), handler)
    }

    /// Publishes the current user's presence to `/app/presence`.
    pub fn update_presence(&self, status: PresenceStatus) {
        self.send(topics::PRESENCE_DESTINATION, &PresencePayload { status });
    }

    /// Publishes a typing indicator to `/app/typing`.
    pub fn send_typing(&self, resource_type: &str, resource_id: impl Into<ResourceId>) {
        let payload = TypingPayload {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.into(),
        };
        self.send(topics::TYPING_DESTINATION, &payload);
    }
}
