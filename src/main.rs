use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zenith_invoicing::assembly::InvoiceRequest;
use zenith_invoicing::pdf::{self, FontSet};
use zenith_invoicing::{Config, InvoiceDocumentModel, InvoiceService};

#[derive(Parser, Debug)]
#[command(name = "zenith-invoicing", version, about = "Invoice numbering and PDF rendering")]
struct Cli {
    /// Configuration file; `ZENITH_CONFIG` or `config/default.toml` otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve,

    /// Allocate a number, archive and render an invoice request.
    Issue {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render a document model JSON without touching the ledger.
    Render {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Re-render an archived invoice.
    Reprint {
        #[arg(long)]
        number: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the number the next invoice would receive.
    NextNumber {
        /// `YYYY-MM-DD`, defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => zenith_invoicing::serve(&config).await?,
        Command::Issue { request, out } => {
            let raw = tokio::fs::read_to_string(&request)
                .await
                .with_context(|| format!("failed to read {}", request.display()))?;
            let request: InvoiceRequest = serde_json::from_str(&raw).context("invalid invoice request")?;
            let service = InvoiceService::from_config(&config)?;
            let issued = service.issue(request).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.pdf", issued.archived.number)));
            write_pdf(&out, &issued.pdf).await?;
            println!("{}", issued.archived.number);
        }
        Command::Render { model, out } => {
            let raw = tokio::fs::read_to_string(&model)
                .await
                .with_context(|| format!("failed to read {}", model.display()))?;
            let model: InvoiceDocumentModel = serde_json::from_str(&raw).context("invalid document model")?;
            let fonts = FontSet::from_config(&config.fonts)?;
            tokio::task::spawn_blocking(move || render_file(&model, &fonts, &out)).await??;
        }
        Command::Reprint { number, out } => {
            let service = InvoiceService::from_config(&config)?;
            let (number, bytes) = service.redownload(&number).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{number}.pdf")));
            write_pdf(&out, &bytes).await?;
        }
        Command::NextNumber { date } => {
            let date = match date {
                Some(raw) => Date::parse(&raw, format_description!("[year]-[month]-[day]"))
                    .with_context(|| format!("invalid date {raw:?}"))?,
                None => OffsetDateTime::now_utc().date(),
            };
            let service = InvoiceService::from_config(&config)?;
            println!("{}", service.preview_next_number(date).await?.formatted);
        }
    }

    Ok(())
}

fn render_file(model: &InvoiceDocumentModel, fonts: &FontSet, out: &Path) -> anyhow::Result<()> {
    let doc = pdf::layout(model, fonts)?;
    let file = std::fs::File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    pdf::render(&doc, fonts, file)?;
    tracing::info!(out = %out.display(), pages = doc.pages.len(), "document rendered");
    Ok(())
}

async fn write_pdf(out: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(out, bytes)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    tracing::info!(out = %out.display(), bytes = bytes.len(), "pdf written");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,zenith_invoicing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
