pub mod contact;
pub mod contact_list;
pub mod content;
pub mod delivery;
pub mod schedule;

pub use contact::Contact;
pub use contact_list::ContactList;
pub use content::MessageContent;
pub use delivery::{DeliveryRecord, DeliveryStatus};
pub use schedule::{NewSchedule, ScheduleStatus, ScheduleTarget, ScheduledMessage};
