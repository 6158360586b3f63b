use crate::catalogs::CatalogEndpoint;
use crate::error::Result;
use crate::models::{CollectionInfo, Item, ItemExt, SearchRequest};

/// Port for opening catalog connections.
///
/// Queries hold a connector instead of a live client so that building a
/// query never performs I/O.
pub trait CatalogConnector: Send + Sync {
    /// Open a client for the endpoint, attaching a signer when the endpoint requires one
    fn open(&self, endpoint: &CatalogEndpoint) -> Result<Box<dyn CatalogClient>>;
}

/// Port for STAC catalog search and enumeration
pub trait CatalogClient {
    /// Execute an item search, collecting up to `request.max_items` items
    fn search(&self, request: &SearchRequest) -> Result<Vec<Item>>;

    /// List all collections
    fn collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Get collection metadata by ID
    fn get_collection(&self, id: &str) -> Result<Option<CollectionInfo>>;

    /// Get a single item
    fn get_item(&self, collection_id: &str, item_id: &str) -> Result<Option<Item>>;

    /// Signer attached at open time, if any
    fn signer(&self) -> Option<&dyn RequestSigner>;

    /// Asset keys of a collection: the item-assets declaration when present,
    /// otherwise the assets of its first item. Unknown collections have none.
    fn assets(&self, collection_id: &str) -> Result<Vec<String>> {
        if let Some(declared) =
            self.get_collection(collection_id)?.and_then(|c| c.declared_assets())
        {
            return Ok(declared);
        }

        let request = SearchRequest::new()
            .collections(vec![collection_id.to_string()])
            .limit(1)
            .max_items(1);
        Ok(self.search(&request)?.first().map(ItemExt::asset_keys).unwrap_or_default())
    }
}

/// Port for provider-specific asset URL signing
pub trait RequestSigner: Send + Sync {
    /// Return a URL that can be dereferenced for pixel access
    fn sign(&self, href: &str) -> Result<String>;
}
