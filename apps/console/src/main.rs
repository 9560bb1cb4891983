use std::path::PathBuf;

use anyhow::{Context, Result};
use catalog_client::{
    store::{ImageUpload, ListOptions, RemoteCatalog, RemoteCatalogConfig},
    CatalogEvent, LiveCatalog,
};
use clap::{Parser, Subcommand};
use shared::{
    domain::{CategoryId, CategoryRecord, StoreTypeId},
    protocol::{CategoryPatch, ChangeOp, NewCategory},
};
use tokio::sync::broadcast;
use url::Url;

mod config;

#[derive(Parser, Debug)]
struct Cli {
    /// Record store base URL; falls back to catalog.toml or CATALOG_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the live view and print it after every change.
    Watch,
    /// One-shot listing of all categories.
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Create a category; without --order it goes to the end of the list.
    Add {
        name: String,
        #[arg(long)]
        order: Option<i64>,
        #[arg(long)]
        inactive: bool,
        #[arg(long)]
        type_id: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Patch fields on a category.
    Set {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        order: Option<i64>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        type_id: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Flip a category's active flag.
    Toggle { id: String },
    /// Delete a category.
    Rm { id: String },
    /// List the known store types.
    Types,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let settings = config::load_settings(cli.base_url);
    Url::parse(&settings.base_url)
        .with_context(|| format!("invalid base url '{}'", settings.base_url))?;
    let config = RemoteCatalogConfig::new(settings.base_url);

    let store = RemoteCatalog::new(config.clone());
    match cli.command {
        Command::Watch => watch(config).await?,
        Command::List { filter } => list(&store, filter).await?,
        Command::Add {
            name,
            order,
            inactive,
            type_id,
            image,
        } => add(&store, name, order, inactive, type_id, image).await?,
        Command::Set {
            id,
            name,
            order,
            active,
            type_id,
            image,
        } => set(&store, id, name, order, active, type_id, image).await?,
        Command::Toggle { id } => toggle(&store, id).await?,
        Command::Rm { id } => remove(&store, id).await?,
        Command::Types => types(&store).await?,
    }

    Ok(())
}

async fn watch(config: RemoteCatalogConfig) -> Result<()> {
    let catalog = LiveCatalog::new(config);
    let mut events = catalog.subscribe_events();

    let seeded = catalog.connect().await?;
    println!("live with {seeded} categories, ctrl-c to stop");
    print_view(&catalog).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                catalog.disconnect().await;
                println!("stopped");
                break;
            }
            event = events.recv() => match event {
                Ok(CatalogEvent::Changed { op, id }) => {
                    let verb = match op {
                        ChangeOp::Create => "created",
                        ChangeOp::Update => "updated",
                        ChangeOp::Delete => "deleted",
                    };
                    println!("{verb} {id}");
                    print_view(&catalog).await;
                }
                Ok(CatalogEvent::Closed) => {
                    println!("feed closed by the store");
                    break;
                }
                Ok(CatalogEvent::Error(message)) => {
                    eprintln!("feed error: {message}");
                }
                Ok(CatalogEvent::Connected { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("lagged behind, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

async fn print_view(catalog: &LiveCatalog) {
    for record in catalog.items().await {
        let active = if record.active { "active" } else { "inactive" };
        println!(
            "  {:>4}  {:<24}  {}  [{active}]",
            record.order, record.name, record.id
        );
    }
}

async fn list(store: &RemoteCatalog, filter: Option<String>) -> Result<()> {
    let options = ListOptions {
        per_page: 100,
        filter,
        ..ListOptions::default()
    };
    let page = store.list_categories(&options).await?;
    println!("{} categories", page.total_items);
    for record in &page.items {
        print_category(store, record);
    }
    Ok(())
}

fn print_category(store: &RemoteCatalog, record: &CategoryRecord) {
    let active = if record.active { "active" } else { "inactive" };
    let type_name = record
        .expanded_type()
        .map(|row| row.name.as_str())
        .unwrap_or("-");
    let image = store.image_url(record);
    let image = if image.is_empty() { "-".to_string() } else { image };
    println!(
        "{:>4}  {:<24}  {}  [{active}] type={type_name} image={image}",
        record.order, record.name, record.id
    );
}

async fn add(
    store: &RemoteCatalog,
    name: String,
    order: Option<i64>,
    inactive: bool,
    type_id: Option<String>,
    image: Option<PathBuf>,
) -> Result<()> {
    let order = match order {
        Some(order) => order,
        None => next_free_order(store).await?,
    };

    let mut category = NewCategory::new(name);
    category.order = order;
    category.active = !inactive;
    category.types = type_id.map(StoreTypeId::new);

    let upload = image.map(read_upload).transpose()?;
    let created = store.create_category(category, upload).await?;
    println!(
        "created {} '{}' at order {}",
        created.id, created.name, created.order
    );
    Ok(())
}

async fn next_free_order(store: &RemoteCatalog) -> Result<i64> {
    let options = ListOptions {
        per_page: 100,
        ..ListOptions::default()
    };
    let page = store.list_categories(&options).await?;
    Ok(page
        .items
        .iter()
        .map(|record| record.order)
        .fold(0, i64::max)
        + 1)
}

async fn set(
    store: &RemoteCatalog,
    id: String,
    name: Option<String>,
    order: Option<i64>,
    active: Option<bool>,
    type_id: Option<String>,
    image: Option<PathBuf>,
) -> Result<()> {
    let patch = CategoryPatch {
        name,
        order,
        active,
        types: type_id.map(StoreTypeId::new),
        image: None,
    };
    let upload = image.map(read_upload).transpose()?;
    let updated = store
        .update_category(&CategoryId::new(id), patch, upload)
        .await?;
    println!("updated {} '{}'", updated.id, updated.name);
    Ok(())
}

async fn toggle(store: &RemoteCatalog, id: String) -> Result<()> {
    let id = CategoryId::new(id);
    let current = store.get_category(&id).await?;
    let patch = CategoryPatch {
        active: Some(!current.active),
        ..CategoryPatch::default()
    };
    let updated = store.update_category(&id, patch, None).await?;
    let state = if updated.active { "active" } else { "inactive" };
    println!("{} '{}' is now {state}", updated.id, updated.name);
    Ok(())
}

async fn remove(store: &RemoteCatalog, id: String) -> Result<()> {
    let id = CategoryId::new(id);
    store.remove_category(&id).await?;
    println!("deleted {id}");
    Ok(())
}

async fn types(store: &RemoteCatalog) -> Result<()> {
    let options = ListOptions {
        per_page: 100,
        sort: "name".to_string(),
        ..ListOptions::default()
    };
    let page = store.list_store_types(&options).await?;
    for row in page.items {
        println!("{}  {}", row.id, row.name);
    }
    Ok(())
}

fn read_upload(path: PathBuf) -> Result<ImageUpload> {
    let bytes = std::fs::read(&path)
        .with_context(|| format!("failed to read image file '{}'", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.bin".to_string());
    let mime_type = mime_guess::from_path(&path)
        .first()
        .map(|mime| mime.to_string());
    Ok(ImageUpload {
        filename,
        mime_type,
        bytes,
    })
}
