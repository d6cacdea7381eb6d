//! # labcheck
//!
//! A Telegram bot that reviews student lab reports with a hosted language
//! model.
//!
//! Users send a PDF, DOCX or TXT file; the bot extracts its text, asks the
//! currently selected model for a structured assessment, and relays the
//! answer back in chat. The model is picked with inline buttons and the
//! choice survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌───────────────┐   ┌────────────┐
//! │ Telegram API │──▶│   Bot    │──▶│ IntakeHandler │──▶│  Extract   │
//! │ (long poll)  │   │ dispatch │   │ size/format   │   │ pdf/docx/  │
//! └──────────────┘   └────┬─────┘   └──────┬────────┘   │ txt        │
//!        ▲                │                │            └────────────┘
//!        │                ▼                ▼
//!        │         ┌─────────────┐   ┌────────────┐
//!        └─────────│ Model state │◀──│   Grader   │──▶ OpenRouter
//!     replies      │ (JSON file) │   │            │
//!                  └─────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`registry`] | Model registry and persisted selection |
//! | [`extract`] | Text extraction from PDF, DOCX and TXT |
//! | [`completion`] | Completion provider and grading |
//! | [`progress`] | Status message rendering |
//! | [`intake`] | The document pipeline |
//! | [`bot`] | Event routing, keyboard and replies |
//! | [`transport`] | The chat transport trait |
//! | [`telegram`] | Telegram Bot API adapter and polling loop |

pub mod bot;
pub mod completion;
pub mod config;
pub mod extract;
pub mod intake;
pub mod logging;
pub mod models;
pub mod progress;
pub mod registry;
pub mod telegram;
pub mod transport;
