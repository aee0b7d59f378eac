//! User management CLI commands.

use anyhow::Result;
use console::style;

use parley_infra::sqlite::api_key::SqliteApiKeyStore;
use parley_infra::sqlite::pool::DatabasePool;

/// Create a user and print its API key once.
pub async fn add_user(pool: DatabasePool, name: &str) -> Result<()> {
    let issued = SqliteApiKeyStore::new(pool).create_user(name).await?;
    tracing::info!(user_id = %issued.user_id, "User created");

    println!();
    println!(
        "  {} User '{}' created ({})",
        style("✓").green().bold(),
        style(name).bold(),
        style(&issued.user_id).dim()
    );
    println!();
    println!(
        "  {} API key (save this -- it won't be shown again):",
        style("🔑").bold()
    );
    println!();
    println!("  {}", style(&issued.api_key).yellow().bold());
    println!();

    Ok(())
}
