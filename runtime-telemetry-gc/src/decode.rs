use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::{GcEvent, GcNotificationInfo};
use crate::source::Notification;

/// Raised if the payload of a GC notification cannot be decoded.
#[derive(Debug, Error)]
pub enum NotificationDecodeError {
    /// The notification carried no payload.
    #[error("notification has no payload")]
    MissingPayload,
    /// The payload does not have the expected shape.
    #[error("malformed gc notification payload")]
    Malformed(#[source] serde_json::Error),
}

/// Decodes a GC notification payload into a [`GcEvent`].
pub fn decode_gc_payload(payload: &Value) -> Result<GcEvent, NotificationDecodeError> {
    GcNotificationInfo::deserialize(payload)
        .map(GcEvent::from)
        .map_err(NotificationDecodeError::Malformed)
}

/// Decodes the payload of `notification` into a [`GcEvent`].
///
/// The notification type is not checked here.
pub fn decode_gc_notification(
    notification: &Notification,
) -> Result<GcEvent, NotificationDecodeError> {
    let payload = notification
        .user_data
        .as_ref()
        .ok_or(NotificationDecodeError::MissingPayload)?;
    decode_gc_payload(payload)
}
