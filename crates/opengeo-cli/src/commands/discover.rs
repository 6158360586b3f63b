//! Pass-through catalog discovery: collections, items, assets and URLs

use crate::cli::{AssetsArgs, ItemArgs, ItemsArgs};
use crate::output::OutputWriter;
use crate::output_types::{AssetRow, BandRow, CollectionRow, ItemRow};
use anyhow::{bail, Context, Result};
use opengeo_core::models::{Item, ItemExt, SearchRequest};
use opengeo_core::ports::CatalogClient;
use opengeo_engine::Session;

fn open(session: &Session) -> Result<Box<dyn CatalogClient>> {
    session
        .connector()
        .open(session.endpoint())
        .with_context(|| format!("Failed to open catalog {}", session.endpoint()))
}

pub fn collections(session: &Session, output: &OutputWriter) -> Result<()> {
    let collections = open(session)?.collections().context("Failed to list collections")?;
    tracing::info!("{} collections in {}", collections.len(), session.endpoint());
    output.table(collections.into_iter().map(CollectionRow::from).collect())
}

pub fn items(args: ItemsArgs, session: &Session, output: &OutputWriter) -> Result<()> {
    if args.limit == 0 {
        bail!("--limit must be at least 1");
    }
    let request = SearchRequest::new()
        .collections(vec![args.collection.clone()])
        .limit(args.limit.min(u32::MAX as usize) as u32)
        .max_items(args.limit);
    let items = open(session)?
        .search(&request)
        .with_context(|| format!("Failed to search collection '{}'", args.collection))?;
    output.table(items.iter().map(ItemRow::from).collect())
}

pub fn assets(args: AssetsArgs, session: &Session, output: &OutputWriter) -> Result<()> {
    let keys = open(session)?
        .assets(&args.collection)
        .with_context(|| format!("Failed to list assets of '{}'", args.collection))?;
    if keys.is_empty() {
        output.warning(format!("Collection '{}' has no items or declared assets", args.collection));
    }
    output.table(keys.into_iter().map(|band| BandRow { band }).collect())
}

fn fetch_item(client: &dyn CatalogClient, args: &ItemArgs) -> Result<Item> {
    match client.get_item(&args.collection, &args.id)? {
        Some(item) => Ok(item),
        None => bail!("Item '{}' not found in collection '{}'", args.id, args.collection),
    }
}

pub fn item(args: ItemArgs, session: &Session, output: &OutputWriter) -> Result<()> {
    let item = fetch_item(open(session)?.as_ref(), &args)?;
    output.result(item)
}

/// Asset URLs of an item, signed when the catalog requires it
pub fn urls(args: ItemArgs, session: &Session, output: &OutputWriter) -> Result<()> {
    let client = open(session)?;
    let item = fetch_item(client.as_ref(), &args)?;

    let signer = if session.endpoint().requires_signing() {
        let signer = client.signer();
        if signer.is_none() {
            output.warning("Catalog requires signed URLs but no signer is available; URLs are unsigned");
        }
        signer
    } else {
        None
    };

    let mut rows = Vec::new();
    for (key, href) in item.asset_urls() {
        let href = match signer {
            Some(signer) => signer.sign(&href).with_context(|| format!("Failed to sign asset '{}'", key))?,
            None => href,
        };
        rows.push(AssetRow { key, href });
    }
    output.table(rows)
}
