mod migration_event_test;
mod migration_test;
