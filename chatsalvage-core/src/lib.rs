//! # chatsalvage-core
//!
//! Resilient reading and recovery of coding-assistant conversation logs.
//!
//! This library provides:
//! - Exact, filtered reads of conversation logs (streaming, with an in-memory
//!   fallback)
//! - Best-effort recovery of truncated or corrupted logs
//! - Conversation analytics over exact or recovered messages
//! - Crash reports persisted with an active/dismissed lifecycle
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows one way:
//! - **Read:** raw bytes → [`reader`] (exact) or [`recovery`] (best effort) → messages
//! - **Analyze:** messages → [`ConversationAnalyzer`] → [`AnalysisSummary`]
//! - **Report:** recovery + analysis → [`CrashReportStore`] (crash path only)
//!
//! ## Example
//!
//! ```rust,no_run
//! use chatsalvage_core::{Config, ConversationEngine, ConversationLoad, FilterSpec};
//!
//! let config = Config::load().expect("failed to load config");
//! let engine = ConversationEngine::from_config(&config);
//!
//! match engine.load("1712345678901", &FilterSpec::new().limit(20)) {
//!     Ok(ConversationLoad::Exact(messages)) => println!("{} messages", messages.len()),
//!     Ok(ConversationLoad::Recovered(result)) => {
//!         println!("recovered {} messages", result.recovered_count)
//!     }
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

// Re-export commonly used items at the crate root
pub use analysis::ConversationAnalyzer;
pub use cache::{ActiveTaskCache, Clock, ManualClock, SystemClock};
pub use config::Config;
pub use crash::CrashReportStore;
pub use engine::{ConversationEngine, ConversationLoad};
pub use error::{Error, Result};
pub use reader::{read_filtered, ConversationReader, FallbackArrayReader, StreamingArrayReader};
pub use recovery::{RecoveryPipeline, Strategy};
pub use source::{ConversationLocator, TaskDirectoryLocator};
pub use types::*;

// Public modules
pub mod analysis;
pub mod cache;
pub mod config;
pub mod crash;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod reader;
pub mod recovery;
pub mod source;
pub mod types;
