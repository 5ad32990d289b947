//! Terminal surfaces for the chat loop.
//!
//! - [`terminal`]: the [`crate::core::session::Renderer`] that writes colored
//!   prompts and streamed fragments to stdout.
//! - [`prompt`]: the cancel-safe line reader used by the menu and sessions.

pub mod prompt;
pub mod terminal;
