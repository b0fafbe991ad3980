pub mod builtins;
pub mod connector;
pub mod factory;
pub mod history;
pub mod runner;
pub mod services;
pub mod store;
