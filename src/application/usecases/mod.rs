pub mod cancel_schedule;
pub mod delete_schedule;
pub mod schedule_broadcast;
pub mod schedule_message;
