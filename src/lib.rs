//! sideline - organizes sports video releases into a canonical library layout
//!
//! Release filenames are matched against per-sport episode metadata through
//! declarative patterns and a structured fallback parser, then materialized
//! under the destination tree as hardlinks, copies, or symlinks. Downstream
//! media servers scan the result without any metadata guesswork.

pub mod cli;
pub mod config;
pub mod matcher;
pub mod metadata;
pub mod models;
pub mod services;
