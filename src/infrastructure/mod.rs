//! Infrastructure: database, events, and the sync job queue

pub mod database;
pub mod events;
pub mod jobs;
