//! Parley is a terminal chat client that streams conversations from OpenAI,
//! Groq and Gemini through one interface.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns conversation state, provider adapters, stream decoding,
//!   the per-provider session loop and transcript persistence.
//! - [`ui`] renders prompts and streamed fragments to the terminal and reads
//!   user input.
//! - [`cli`] parses arguments and runs the provider menu.
//! - [`api`] defines the request payloads sent to each provider family.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which builds a [`core::app::AppContext`] and
//! hands it to every [`core::session::ChatSession`].

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
