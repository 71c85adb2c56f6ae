//! Identity command implementations.

use aegis_core::identity::DEFAULT_IDENTITY;
use aegis_core::{Config, IdentityStore, SignerInfo};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{debug, warn};

/// Generate a key pair and certificate under the configured home.
pub async fn create(
    config: &Config,
    name: String,
    email: String,
    id: Option<String>,
    force: bool,
    quiet: bool,
) -> Result<()> {
    let store = IdentityStore::new(config.home());
    let label = id.clone().unwrap_or_else(|| DEFAULT_IDENTITY.to_string());

    if store.exists(id.as_deref()) && !force {
        bail!("Identity '{label}' already exists (use --force to replace it)");
    }

    if !quiet {
        eprintln!("{}", "Generating RSA key pair, this can take a moment...".dimmed());
    }
    let created = tokio::task::spawn_blocking(move || {
        store.create(&name, &email, id.as_deref()).map(|path| (store, path))
    })
    .await
    .context("Identity generation task failed")?;
    let (store, cert_path) = created.context("Failed to create identity")?;
    debug!(id = %label, "Reading back new identity");

    if !quiet {
        let signer = store
            .load(Some(label.as_str()))
            .and_then(|identity| identity.signer_info())
            .context("Failed to read back the new identity")?;
        println!();
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!("{}", "║           IDENTITY CREATED             ║".green().bold());
        println!("{}", "╚════════════════════════════════════════╝".green());
        println!();
        println!("   {} {}", "Id:".dimmed(), label.cyan());
        print_signer(&signer);
        println!("   {} {}", "Certificate:".dimmed(), cert_path.display());
    }
    Ok(())
}

/// List every identity with a readable certificate.
pub async fn list(config: &Config, quiet: bool) -> Result<()> {
    let store = IdentityStore::new(config.home());
    let certificates = store
        .certificates()
        .context("Failed to read identity store")?;

    if certificates.is_empty() {
        if !quiet {
            println!("No identities in {}", store.dir().display());
            println!(
                "{}",
                "Create one with: aegis identity create --name NAME --email EMAIL".dimmed()
            );
        }
        return Ok(());
    }

    for (id, cert) in &certificates {
        if quiet {
            println!("{id}");
            continue;
        }
        println!();
        println!("{}", id.cyan().bold());
        match SignerInfo::from_certificate(cert) {
            Ok(signer) => print_signer(&signer),
            Err(e) => {
                warn!(id = %id, error = %e, "Unreadable certificate subject");
                println!("   {} {}", "Certificate:".dimmed(), "unreadable".red());
            }
        }
    }
    Ok(())
}

fn print_signer(signer: &SignerInfo) {
    println!("   {} {}", "Name:".dimmed(), signer.name);
    println!("   {} {}", "Email:".dimmed(), signer.email);
    println!("   {} {}", "Valid until:".dimmed(), signer.expiry);
}
