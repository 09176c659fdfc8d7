//! Service layer: filesystem actions, caches, orchestration, and sinks

pub mod destination;
pub mod fingerprint;
pub mod linker;
pub mod notifications;
pub mod processed_cache;
pub mod processor;
pub mod scanner;
pub mod template;
pub mod text_utils;
pub mod trace;
pub mod watcher;
