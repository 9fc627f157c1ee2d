//! Subcommand handlers
//!
//! Each handler drives the engine and prints either a short human summary
//! or the underlying value as JSON.

use anyhow::{Context, Result, bail};
use application::{ApplicationError, QueueStats, SyncEngine};
use domain::{
    CachePreferences, ConflictId, DraftId, EntityId, EntityType, SyncOperation, VaultState,
};
use secrecy::SecretString;
use serde::Serialize;

use crate::{CacheCommand, Commands, DraftsCommand, PrefsCommand, VaultCommand};

#[allow(clippy::cast_precision_loss)]
fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

/// Text or JSON printer
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `value` as JSON, or call `human` to describe it
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    queue: QueueStats,
    unresolved_conflicts: usize,
    vault: VaultState,
}

#[derive(Debug, Serialize)]
struct CountView {
    count: usize,
}

pub async fn run(engine: &SyncEngine, command: Commands, out: &Output) -> Result<()> {
    match command {
        Commands::Status => status(engine, out).await,
        Commands::Enqueue {
            operation,
            entity_type,
            id,
            payload,
        } => enqueue(engine, operation, &entity_type, id.as_deref(), &payload, out).await,
        Commands::Drain { network } => {
            let report = engine.set_connectivity(network.into()).await?;
            match report {
                Some(report) => out.emit(&report, |r| {
                    println!("🔄 Drain finished");
                    println!(
                        "   attempted {}, synced {}, conflicts {}, retried {}, failed {}",
                        r.attempted, r.synced, r.conflicts, r.retried, r.failed
                    );
                    println!("   {} pending item(s) left", r.deferred);
                }),
                None => out.emit(&serde_json::json!({ "skipped": true }), |_| {
                    println!("⏸️  Sync is not allowed on this network");
                }),
            }
        },
        Commands::RetryFailed => {
            let count = engine.queue().retry_failed().await?;
            out.emit(&CountView { count }, |v| {
                println!("🔁 Reset {} failed item(s) to pending", v.count);
            })
        },
        Commands::ClearSynced => {
            let count = engine.queue().clear_synced().await?;
            out.emit(&CountView { count }, |v| {
                println!("🧹 Removed {} synced item(s)", v.count);
            })
        },
        Commands::Conflicts { all } => {
            let conflicts = if all {
                engine.conflicts().list_all().await?
            } else {
                engine.conflicts().list_unresolved().await?
            };
            out.emit(&conflicts, |list| {
                if list.is_empty() {
                    println!("✅ No conflicts");
                }
                for c in list {
                    let state = c.resolution.map_or("open", |r| r.as_str());
                    println!(
                        "{}  {} {}/{}  {}  [{}]",
                        c.id, c.operation, c.entity_type, c.entity_id, c.strategy, state
                    );
                }
            })
        },
        Commands::Resolve {
            conflict_id,
            choice,
        } => {
            let id = ConflictId::parse(&conflict_id).context("Invalid conflict id")?;
            let record = engine.conflicts().resolve(&id, choice).await?;
            out.emit(&record, |r| {
                println!("✅ Conflict {} resolved, kept {choice}", r.id);
            })
        },
        Commands::Prefs { action } => prefs(engine, action, out).await,
        Commands::Cache { action } => cache(engine, action, out).await,
        Commands::Storage => {
            let report = engine.cache().storage_report().await?;
            out.emit(&report, |r| {
                println!("💾 Storage");
                println!(
                    "   used {:.2} MiB of {:.2} MiB ({:.1}%)",
                    mib(r.estimate.usage_bytes),
                    mib(r.estimate.quota_bytes),
                    r.usage_percent
                );
                println!(
                    "   cache {:.2} MiB of {:.2} MiB",
                    mib(r.cache_bytes),
                    mib(r.cache_limit_bytes)
                );
            })
        },
        Commands::Persist => {
            let granted = engine.cache().request_persistence().await?;
            out.emit(&serde_json::json!({ "persisted": granted }), |_| {
                if granted {
                    println!("📌 Local data is persistent");
                } else {
                    println!("⚠️  Persistence was not granted; data may be evicted");
                }
            })
        },
        Commands::Vault { action } => vault(engine, action, out).await,
        Commands::Drafts { passphrase, action } => {
            unlock(engine, passphrase).await?;
            drafts(engine, action, out).await
        },
    }
}

async fn status(engine: &SyncEngine, out: &Output) -> Result<()> {
    let view = StatusView {
        queue: engine.queue().stats().await?,
        unresolved_conflicts: engine.conflicts().unresolved_count().await?,
        vault: engine.vault().state().await?,
    };
    out.emit(&view, |v| {
        println!("📊 Sync status");
        println!(
            "   queue: {} pending, {} in flight, {} failed",
            v.queue.pending, v.queue.in_flight, v.queue.failed
        );
        println!("   conflicts: {} unresolved", v.unresolved_conflicts);
        println!("   vault: {}", v.vault.as_str());
    })
}

async fn enqueue(
    engine: &SyncEngine,
    operation: SyncOperation,
    entity_type: &str,
    id: Option<&str>,
    payload: &str,
    out: &Output,
) -> Result<()> {
    let entity_type = EntityType::new(entity_type)?;
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;

    let item = match (operation, id) {
        (SyncOperation::Create, None) => engine.queue().enqueue_create(entity_type, payload).await?,
        (_, Some(id)) => {
            let entity_id = EntityId::parse(id)?;
            engine
                .queue()
                .enqueue(operation, entity_type, entity_id, payload)
                .await?
        },
        (_, None) => bail!("--id is required for {operation}"),
    };

    out.emit(&item, |i| {
        println!("📥 Queued {} of {}/{} ({})", i.operation, i.entity_type, i.entity_id, i.id);
    })
}

async fn prefs(engine: &SyncEngine, action: PrefsCommand, out: &Output) -> Result<()> {
    let cache = engine.cache();
    let preferences = match action {
        PrefsCommand::Show => cache.get_preferences().await?,
        PrefsCommand::Set {
            max_cache_mb,
            wifi_only,
        } => {
            let current = cache.get_preferences().await?;
            cache
                .set_preferences(CachePreferences {
                    max_cache_size_mb: max_cache_mb.unwrap_or(current.max_cache_size_mb),
                    sync_on_wifi_only: wifi_only.unwrap_or(current.sync_on_wifi_only),
                    ..current
                })
                .await?
        },
        PrefsCommand::Toggle {
            entity_type,
            enabled,
        } => {
            cache
                .set_entity_caching(EntityType::new(entity_type)?, enabled)
                .await?
        },
    };

    out.emit(&preferences, |p| {
        println!("⚙️  Cache preferences");
        println!("   max cache size: {} MB", p.max_cache_size_mb);
        println!("   sync on WiFi only: {}", p.sync_on_wifi_only);
        for (entity_type, enabled) in &p.entity_toggles {
            println!("   {entity_type}: {}", if *enabled { "cached" } else { "not cached" });
        }
    })
}

async fn cache(engine: &SyncEngine, action: CacheCommand, out: &Output) -> Result<()> {
    match action {
        CacheCommand::List { entity_type } => {
            let filter = entity_type.map(EntityType::new).transpose()?;
            let entities = engine.cache().list_cached(filter).await?;
            out.emit(&entities, |list| {
                for e in list {
                    let marker = if e.is_optimistic() { " (unsynced)" } else { "" };
                    println!("{}/{}  {} B{marker}", e.entity_type, e.entity_id, e.size_bytes);
                }
                println!("{} cached entit(ies)", list.len());
            })
        },
        CacheCommand::Clear => {
            let count = engine.cache().clear_cache().await?;
            out.emit(&CountView { count }, |v| {
                println!("🧹 Removed {} cached entit(ies)", v.count);
            })
        },
    }
}

async fn vault(engine: &SyncEngine, action: VaultCommand, out: &Output) -> Result<()> {
    let vault = engine.vault();
    match action {
        VaultCommand::Status => {},
        VaultCommand::Enable {
            passphrase,
            confirm,
        } => {
            let confirmation = SecretString::from(confirm.unwrap_or_else(|| passphrase.clone()));
            vault
                .enable(&SecretString::from(passphrase), &confirmation)
                .await?;
        },
        VaultCommand::EncryptAll { passphrase } => {
            unlock(engine, Some(passphrase)).await?;
            let count = vault.encrypt_all_drafts().await?;
            return out.emit(&CountView { count }, |v| {
                println!("🔐 Encrypted {} draft(s)", v.count);
            });
        },
        VaultCommand::DecryptAll { passphrase } => {
            unlock(engine, Some(passphrase)).await?;
            let count = vault.decrypt_all_drafts().await?;
            return out.emit(&CountView { count }, |v| {
                println!("🔓 Decrypted {} draft(s)", v.count);
            });
        },
        VaultCommand::Disable => vault.disable().await?,
    }

    let state = vault.state().await?;
    out.emit(&serde_json::json!({ "state": state }), |_| {
        println!("🔐 Vault is {}", state.as_str());
    })
}

async fn drafts(engine: &SyncEngine, action: DraftsCommand, out: &Output) -> Result<()> {
    let vault = engine.vault();
    match action {
        DraftsCommand::Save { label, text, id } => {
            let id = id.as_deref().map(parse_draft_id).transpose()?;
            let draft = vault.save_draft(id, &label, &text).await?;
            let summary = application::DraftSummary::from(&draft);
            out.emit(&summary, |d| {
                let lock = if d.encrypted { " 🔒" } else { "" };
                println!("📝 Saved draft {}{lock}", d.id);
            })
        },
        DraftsCommand::Show { id } => {
            let draft = vault.read_draft(&parse_draft_id(&id)?).await?;
            out.emit(&draft, |d| {
                println!("{}", d.label);
                println!();
                println!("{}", d.text);
            })
        },
        DraftsCommand::List => {
            let drafts = vault.list_drafts().await?;
            out.emit(&drafts, |list| {
                for d in list {
                    let lock = if d.encrypted { "🔒" } else { "  " };
                    println!("{lock} {}  {}  {}", d.id, d.updated_at.format("%Y-%m-%d %H:%M"), d.label);
                }
                println!("{} draft(s)", list.len());
            })
        },
        DraftsCommand::Delete { id } => {
            let deleted = vault.delete_draft(&parse_draft_id(&id)?).await?;
            if !deleted {
                bail!("Draft {id} not found");
            }
            out.emit(&serde_json::json!({ "deleted": id }), |_| {
                println!("🗑️  Deleted draft {id}");
            })
        },
    }
}

fn parse_draft_id(id: &str) -> Result<DraftId> {
    DraftId::parse(id).with_context(|| format!("Invalid draft id: {id}"))
}

/// Unlock the vault for this process when it is enabled and a passphrase was given
async fn unlock(engine: &SyncEngine, passphrase: Option<String>) -> Result<()> {
    let vault = engine.vault();
    if vault.state().await? != VaultState::Locked {
        return Ok(());
    }
    let Some(passphrase) = passphrase else {
        return Ok(());
    };
    match vault.unlock(&SecretString::from(passphrase)).await {
        Ok(_) => Ok(()),
        Err(ApplicationError::Auth) => bail!("Wrong passphrase"),
        Err(err) => Err(err.into()),
    }
}
