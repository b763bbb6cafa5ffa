// HTTP surface (callback portal, notification API)

pub mod notification;
pub mod portal;

pub use notification::{create_notification_router, NotificationAppState};
pub use portal::{create_portal_router, CallbackQuery, PortalAppState};
