#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod formats;
pub mod logging;
pub mod mindmap;
pub mod nav;
pub mod search;
pub mod text;

#[cfg(test)]
mod fixtures;
