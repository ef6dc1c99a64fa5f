pub mod notifier;
pub mod recipient;

pub use notifier::{Notifier, NotificationStore, NotifyError, PartyDirectory};
pub use recipient::{message_recipient, rental_recipient};
