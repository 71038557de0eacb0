mod notifier;
mod rooms;
mod types;

pub use notifier::HipChatNotifier;
pub use rooms::{RoomHandle, RoomRegistry};
pub use types::{InstallPayload, Webhook};

#[cfg(test)]
pub(crate) use notifier::tests::{test_notifier, NOTIFY_PATH};
