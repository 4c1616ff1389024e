mod common;

mod health_monitoring;
mod lifecycle_events;
