pub mod add;
pub mod complete;
pub mod completions;
pub mod config;
pub mod delete;
pub mod edit;
pub mod fields;
pub mod list;
pub mod login;
pub mod passwd;
pub mod push;
pub mod replay;
pub mod show;
pub mod sync;
