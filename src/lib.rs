//! Colloquy: agent conversation runtime
//!
//! Drives a multi-turn exchange between a caller and a language model,
//! interleaving model responses with tool calls, gating sensitive tools
//! behind asynchronous approvals, and keeping a durable, turn-structured
//! conversation log.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::prelude::*;
//!
//! # async fn example(provider: Arc<dyn ModelProvider>) -> colloquy::error::Result<()> {
//! let config = ColloquyConfig::from_env()?;
//! let context = AgentContext::new(config, ToolRegistry::new());
//! context.init()?;
//!
//! let store = Arc::new(context.file_store());
//! let mut session = AgentSession::open(&context, provider, store, "support-42")?;
//! let answer = session.send("Hello!", &CancellationToken::new()).await?;
//! println!("{}", answer.content());
//!
//! context.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod stream_transform;
pub mod tools;
pub mod types;
pub mod util;
