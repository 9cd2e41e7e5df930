use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use contacts_core::config::{Config, ENV_DB_PATH, ENV_IMPORT_URL};
use contacts_core::db::{monitoring::gather_metrics, open_repo};
use contacts_core::{Contact, ContactPatch, ContactService, NewContact, ReqwestSource};

#[derive(Parser, Debug)]
#[command(name = "contacts", about = "Personal contacts manager", long_about = None)]
struct Options {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Database file (":memory:" for a throwaway store)
    #[arg(long, env = ENV_DB_PATH)]
    db: Option<String>,

    /// Remote import endpoint
    #[arg(long, env = ENV_IMPORT_URL)]
    import_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store (seeds sample contacts on first run)
    Init,
    /// List contacts, optionally filtered
    List {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        favorites: bool,
    },
    /// Search contacts in the store by name or phone
    Search { query: String },
    /// Add a contact
    Add {
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        favorite: bool,
    },
    /// Change only the given fields
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete { id: i64 },
    /// Flip the favorite flag
    Favorite { id: i64 },
    /// Import contacts from the remote endpoint
    Import,
    /// Print Prometheus metrics collected during this run
    Metrics,
}

fn print_contacts(contacts: &[Contact]) {
    for c in contacts {
        let star = if c.favorite { "*" } else { " " };
        println!("{star} {:>4}  {:<24} {:<16} {}", c.id, c.name, c.phone, c.email);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opts = Options::parse();

    let mut cfg = match &opts.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {path}"))?,
        None => Config::default(),
    };
    if let Some(db) = opts.db {
        cfg.db_path = db;
    }
    if let Some(url) = opts.import_url {
        cfg.import_url = url;
    }

    let repo = open_repo(&cfg.db_path).await.context("opening contact store")?;
    let source = ReqwestSource::new(&cfg.import_url)?;
    let service = ContactService::new(repo, source);

    if !service.initialize().await {
        bail!("{}", service.state().error.unwrap_or_default());
    }

    let ok = match opts.command {
        Command::Init => {
            info!("Store ready at {}", cfg.db_path);
            println!("{} contacts", service.contacts().len());
            true
        }
        Command::List { search, favorites } => {
            service.set_search_query(search.unwrap_or_default());
            service.set_favorites_only(favorites);
            print_contacts(&service.filtered_contacts());
            true
        }
        Command::Search { query } => {
            print_contacts(&service.search(&query).await);
            true
        }
        Command::Add { name, phone, email, favorite } => {
            let contact = NewContact { favorite: Some(favorite), ..NewContact::new(name, phone, email) };
            service.add(contact).await
        }
        Command::Update { id, name, phone, email } => {
            service.update(id, ContactPatch { name, phone, email, favorite: None }).await
        }
        Command::Delete { id } => service.remove(id).await,
        Command::Favorite { id } => {
            let current = service.contacts().into_iter().find(|c| c.id == id);
            match current {
                Some(c) => service.toggle_favorite(id, c.favorite).await,
                None => bail!("no contact with id {id}"),
            }
        }
        Command::Import => {
            let outcome = service.import_from_remote().await;
            println!("{}", serde_json::to_string(&outcome)?);
            outcome.success
        }
        Command::Metrics => {
            print!("{}", gather_metrics().map_err(|e| anyhow::anyhow!(e.to_string()))?);
            true
        }
    };

    if !ok {
        bail!("{}", service.state().error.unwrap_or_default());
    }
    Ok(())
}
