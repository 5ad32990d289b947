use std::io::{self, Write};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::interrupt::InterruptHub;
use crate::cli::provider_list::key_status;
use crate::core::app::AppContext;
use crate::core::builtin_providers::ProviderConfig;
use crate::core::providers::{
    find_provider, require_credential, resolve_session, Credentials, ProviderResolutionError,
    ProviderSession,
};
use crate::core::session::{is_exit_token, ChatSession, InputSource, Renderer, SessionExit};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// Index into the provider list.
    Provider(usize),
    Exit,
    Invalid,
}

pub fn parse_menu_choice(input: &str, provider_count: usize) -> MenuChoice {
    let trimmed = input.trim();
    if trimmed == "0" || is_exit_token(trimmed) {
        return MenuChoice::Exit;
    }
    match trimmed.parse::<usize>() {
        Ok(choice) if (1..=provider_count).contains(&choice) => MenuChoice::Provider(choice - 1),
        _ => MenuChoice::Invalid,
    }
}

pub fn render_banner(providers: &[ProviderConfig], credentials: &Credentials) -> String {
    let heavy = "═".repeat(RULE_WIDTH);
    let light = "─".repeat(RULE_WIDTH);

    let keys = providers
        .iter()
        .map(|p| format!("{}: {}", p.display_name, key_status(credentials, &p.id)))
        .collect::<Vec<_>>()
        .join("  |  ");
    let entries = providers
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}) {}", i + 1, p.display_name))
        .chain(std::iter::once("0) Exit".to_string()))
        .collect::<Vec<_>>()
        .join("   ");

    format!(
        "{heavy}\n  parley  v{}\n{heavy}\nKeys: {keys}\n{light}\n Main menu\n{entries}\n{light}\nShortcuts:  Ctrl+C leaves a chat  |  exit / quit / :q ends it\n",
        env!("CARGO_PKG_VERSION")
    )
}

pub fn render_model_catalog(config: &ProviderConfig) -> String {
    let mut text = format!("{} models:\n", config.display_name);
    for (index, model) in config.models.iter().enumerate() {
        text.push_str(&format!("  {}) {}\n", index + 1, model));
    }
    text
}

/// Top-level interactive loop: provider menu, model picker, chat sessions.
pub struct Shell<'a, W: Write> {
    ctx: &'a AppContext,
    interrupts: &'a InterruptHub,
    renderer: &'a mut dyn Renderer,
    input: &'a mut dyn InputSource,
    out: W,
    model_override: Option<String>,
}

impl<'a, W: Write> Shell<'a, W> {
    pub fn new(
        ctx: &'a AppContext,
        interrupts: &'a InterruptHub,
        renderer: &'a mut dyn Renderer,
        input: &'a mut dyn InputSource,
        out: W,
    ) -> Self {
        Self {
            ctx,
            interrupts,
            renderer,
            input,
            out,
            model_override: None,
        }
    }

    /// Use `model` verbatim instead of asking.
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            let banner = render_banner(&self.ctx.providers, &self.ctx.credentials);
            write!(self.out, "\n{banner}\nSelect: ")?;
            self.out.flush()?;

            let token = self.interrupts.arm();
            let Some(line) = self.read_line(&token).await else {
                writeln!(self.out)?;
                self.renderer.info("Goodbye!");
                return Ok(());
            };

            match parse_menu_choice(&line, self.ctx.providers.len()) {
                MenuChoice::Exit => {
                    self.renderer.info("Goodbye!");
                    return Ok(());
                }
                MenuChoice::Invalid => {
                    let message = format!(
                        "Please enter a number from 1 to {}, or 0 to exit.",
                        self.ctx.providers.len()
                    );
                    self.renderer.error(&message);
                }
                MenuChoice::Provider(index) => {
                    let config = self.ctx.providers[index].clone();
                    if let Err(err) = self.chat_with(&config).await {
                        self.renderer.error(&err.to_string());
                    }
                }
            }
        }
    }

    /// Skip the menu and chat with one provider.
    pub async fn run_provider(&mut self, id: &str) -> Result<(), ProviderResolutionError> {
        let config = find_provider(&self.ctx.providers, id)?.clone();
        self.chat_with(&config).await.map(|_| ())
    }

    /// Returns `None` when the chat never started because the picker was
    /// interrupted or input ended.
    async fn chat_with(
        &mut self,
        config: &ProviderConfig,
    ) -> Result<Option<SessionExit>, ProviderResolutionError> {
        let Some(session) = self.pick_session(config).await? else {
            return Ok(None);
        };

        self.renderer.info(&format!(
            "{} active, model {}.",
            config.display_name, session.model
        ));

        let ctx = self.ctx;
        let adapter = ctx.adapter_for(session);
        let token = self.interrupts.arm();
        let summary = ChatSession::new(
            adapter,
            ctx.transport.clone(),
            ctx.recorder_for(&config.id),
            &mut *self.renderer,
            &mut *self.input,
            token,
        )
        .run()
        .await;

        match summary.exit {
            SessionExit::Interrupted => self.renderer.info("Left the chat (Ctrl+C)."),
            SessionExit::UserExit => self.renderer.info("Conversation ended."),
            SessionExit::InputClosed | SessionExit::ProviderRejected => {}
        }
        debug!(provider = %config.id, exchanges = summary.exchanges, "Chat finished");
        Ok(Some(summary.exit))
    }

    async fn pick_session(
        &mut self,
        config: &ProviderConfig,
    ) -> Result<Option<ProviderSession>, ProviderResolutionError> {
        let ctx = self.ctx;
        let credentials = &ctx.credentials;
        let api_key = require_credential(config, credentials)?;

        if let Some(model) = &self.model_override {
            return Ok(Some(ProviderSession {
                config: config.clone(),
                api_key: api_key.to_string(),
                model: model.clone(),
            }));
        }

        let catalog = render_model_catalog(config);
        let default_choice = config.default_model + 1;
        let written = write!(
            self.out,
            "{catalog}Model number (default {default_choice}): "
        )
        .and_then(|_| self.out.flush());
        if let Err(err) = written {
            debug!(error = %err, "Failed to write model picker");
        }

        let token = self.interrupts.arm();
        let Some(choice) = self.read_line(&token).await else {
            return Ok(None);
        };
        resolve_session(config, credentials, &choice).map(Some)
    }

    async fn read_line(&mut self, token: &CancellationToken) -> Option<String> {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            line = self.input.read_line() => Some(line),
        };
        match read {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                debug!(error = %err, "Failed to read menu input");
                None
            }
            None => None,
        }
    }
}
