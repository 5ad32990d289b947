use std::io::{self, Write};

use crate::core::builtin_providers::ProviderConfig;
use crate::core::providers::Credentials;

pub fn key_status(credentials: &Credentials, provider_id: &str) -> &'static str {
    if credentials.is_set(provider_id) {
        "SET"
    } else {
        "NOT SET"
    }
}

pub fn list_providers<W: Write>(
    providers: &[ProviderConfig],
    credentials: &Credentials,
    out: &mut W,
) -> io::Result<()> {
    if providers.is_empty() {
        writeln!(out, "No providers configured.")?;
        return Ok(());
    }

    writeln!(out, "Available Providers:\n")?;
    for provider in providers {
        writeln!(
            out,
            "{} ({})  key: {} [{}]",
            provider.display_name,
            provider.id,
            key_status(credentials, &provider.id),
            provider.env_keys.join(" or ")
        )?;
        for (index, model) in provider.models.iter().enumerate() {
            let marker = if index == provider.default_model {
                "*"
            } else {
                " "
            };
            writeln!(out, "  {}{}) {}", marker, index + 1, model)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "* = default model")?;
    Ok(())
}
