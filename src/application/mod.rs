pub mod bootstrap;
pub mod commands;
pub mod confirmation;
pub mod mutation;
pub mod reminders;
