//! `hebelki-search`: run hybrid searches against a corpus snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use hebelki_core::AccessContext;
use hebelki_retrieval::{
    CorpusSnapshot, HybridSearcher, LocalEmbedding, RetrievalConfig, SearchOptions,
};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hebelki-search", about = "Hebelki: multi-tenant hybrid retrieval")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "hebelki.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hybrid search
    Search {
        /// Tenant to search
        #[arg(long)]
        tenant: Uuid,
        /// Query text
        query: String,
        /// Maximum results
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to one category
        #[arg(long)]
        category: Option<String>,
        /// Who is asking
        #[arg(long, value_enum, default_value_t = Actor::Customer)]
        actor: Actor,
        /// Id of the asking customer or staff member
        #[arg(long)]
        actor_id: Option<Uuid>,
        /// Customer whose scoped content staff may see
        #[arg(long)]
        customer_scope: Option<Uuid>,
        /// Search document chunks only
        #[arg(long, conflicts_with = "no_documents")]
        documents_only: bool,
        /// Search knowledge entries only
        #[arg(long)]
        no_documents: bool,
        /// Relevance floor (defaults to the category threshold)
        #[arg(long)]
        min_score: Option<f64>,
        /// Print diagnostics along with the results
        #[arg(long)]
        metadata: bool,
    },
    /// Report stale and legacy embeddings of a tenant
    Stale {
        /// Tenant to inspect
        #[arg(long)]
        tenant: Uuid,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Actor {
    Customer,
    Staff,
    Owner,
}

#[derive(Debug, Deserialize)]
struct HebelkiConfig {
    /// Snapshot file, relative to the config file.
    corpus: PathBuf,
    #[serde(default)]
    retrieval: RetrievalConfig,
}

impl HebelkiConfig {
    fn parse(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }

    fn corpus_path(&self, config_path: &Path) -> PathBuf {
        if self.corpus.is_absolute() {
            return self.corpus.clone();
        }
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.corpus)
    }
}

fn access_context(
    tenant: Uuid,
    actor: Actor,
    actor_id: Option<Uuid>,
    customer_scope: Option<Uuid>,
) -> AccessContext {
    let ctx = match (actor, actor_id) {
        (Actor::Customer, Some(id)) => AccessContext::customer(tenant, id),
        (Actor::Customer, None) => AccessContext::restrictive(tenant),
        (Actor::Staff, id) => AccessContext::staff(tenant, id),
        (Actor::Owner, id) => AccessContext::owner(tenant, id),
    };
    match customer_scope {
        Some(customer) if ctx.is_privileged() => ctx.with_customer_scope(customer),
        _ => ctx,
    }
}

async fn build_searcher(cli_config: &Path) -> anyhow::Result<HybridSearcher> {
    let config_str = tokio::fs::read_to_string(cli_config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {e}",
            cli_config.display()
        )
    })?;
    let config = HebelkiConfig::parse(&config_str)?;

    let embedder = LocalEmbedding::new(config.retrieval.embedding.dim);
    let mut snapshot = CorpusSnapshot::load(config.corpus_path(cli_config)).await?;
    snapshot
        .embed_missing(&embedder, &config.retrieval.embedding)
        .await?;
    let (knowledge, documents) = snapshot.into_stores().await;

    Ok(HybridSearcher::new(
        Arc::new(knowledge),
        Arc::new(documents),
        Arc::new(embedder),
        config.retrieval,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let searcher = build_searcher(&cli.config).await?;

    match cli.command {
        Commands::Search {
            tenant,
            query,
            limit,
            category,
            actor,
            actor_id,
            customer_scope,
            documents_only,
            no_documents,
            min_score,
            metadata,
        } => {
            let mut options = SearchOptions::default()
                .with_access(access_context(tenant, actor, actor_id, customer_scope))
                .with_documents(!no_documents);
            if documents_only {
                options = options.documents_only();
            }
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            if let Some(category) = category {
                options = options.with_category(category);
            }
            if let Some(min_score) = min_score {
                options = options.with_min_score(min_score);
            }

            let response = searcher.search_with_metadata(tenant, &query, options).await?;
            info!(results = response.results.len(), "Search finished");
            let out = if metadata {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string_pretty(&response.results)?
            };
            println!("{out}");
        }
        Commands::Stale { tenant } => {
            let report = searcher.check_stale_embeddings(tenant).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
