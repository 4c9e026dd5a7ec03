pub mod asgard;
pub mod commands;
pub mod github;
pub mod http;
pub mod retry;
pub mod runtime;
pub mod settings;
