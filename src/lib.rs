pub mod archive;
pub mod browser;
pub mod completion;
pub mod config;
pub mod dialog;
pub mod domain;
pub mod error;
pub mod extract;
pub mod locator;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod resolve;
pub mod summary;
pub mod wait;
