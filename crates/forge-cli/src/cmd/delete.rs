//! `forge delete`

use anyhow::Result;

use forge_core::{ForgeConfig, PrefixClient, Registry};
use forge_schema::Platform;

/// Removes one package file from the registry.
pub async fn delete(platform: Platform, filename: &str, channel: Option<&str>, config: &ForgeConfig) -> Result<()> {
    let client = PrefixClient::new(forge_core::http_client()?, &config.registry)?;
    let channel = channel.unwrap_or(client.channel());
    client.delete(channel, platform, filename).await?;
    println!("  deleted {channel}/{platform}/{filename}");
    Ok(())
}
