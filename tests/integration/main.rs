// Integration test suite for the collaboration core.
//
// Organized into focused modules by subsystem. All modules share
// common::TestEnv for database lifecycle management (unique temp dir per
// test, removed on drop).


mod chat_messages;
mod chat_search;
mod chat_sessions;
mod founder_rights;
mod identifiers;
mod invites;
mod promotions;
mod queues;
mod teams;
mod triggers;
mod work_items;
