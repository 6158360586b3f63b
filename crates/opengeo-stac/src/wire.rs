//! STAC API response envelopes.

use opengeo_core::models::CollectionInfo;
use serde::Deserialize;
use serde_json::Value;

pub(crate) use stac::{ItemCollection, Link};

/// One page of `/collections`
#[derive(Debug, Deserialize)]
pub(crate) struct CollectionList {
    #[serde(default)]
    pub collections: Vec<CollectionInfo>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// The parts of a `next` link that drive pagination, including the
/// POST `method`/`body`/`merge` fields of the STAC API paging extension
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NextPage {
    pub href: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub merge: Option<bool>,
}

pub(crate) fn next_page(links: &[Link]) -> Option<NextPage> {
    let link = links.iter().find(|link| link.rel == "next")?;
    serde_json::to_value(link).ok().and_then(|value| serde_json::from_value(value).ok())
}
