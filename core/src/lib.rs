pub mod api;
pub mod config;
pub mod connector;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod handler;
pub mod history;
pub mod pipeline;
pub mod registry;
pub mod reply;
pub mod robot;
pub mod run;
pub mod scheduler;
pub mod store;
pub mod task;
