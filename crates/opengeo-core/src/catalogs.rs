//! Static registry of public STAC API endpoints.
//!
//! Lookups are pure: nothing here touches the network.

use serde::Serialize;
use std::fmt;

use crate::error::{OpengeoError, Result};

/// Default catalog when nothing is configured (Element 84 Earth Search)
pub const DEFAULT_CATALOG_URL: &str = "https://earth-search.aws.element84.com/v1";

/// Whether a catalog can be searched anonymously
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessTier {
    Public,
    Protected,
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTier::Public => write!(f, "APIPublic"),
            AccessTier::Protected => write!(f, "APIProtected"),
        }
    }
}

/// A registered catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub alias: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub access: AccessTier,
    pub description: &'static str,
}

/// How asset URLs of an endpoint must be signed before they can be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SigningMode {
    #[default]
    None,
    /// Microsoft Planetary Computer SAS tokens
    PlanetaryComputer,
}

/// A resolved catalog endpoint, held explicitly by every query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEndpoint {
    pub url: String,
    pub alias: Option<String>,
    pub signing: SigningMode,
}

impl CatalogEndpoint {
    /// Endpoint for a root URL, detecting hosts whose assets need signing
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let signing = if url.contains("planetarycomputer") {
            SigningMode::PlanetaryComputer
        } else {
            SigningMode::None
        };
        Self { url, alias: None, signing }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_signing(mut self, signing: SigningMode) -> Self {
        self.signing = signing;
        self
    }

    pub fn requires_signing(&self) -> bool {
        self.signing != SigningMode::None
    }
}

impl Default for CatalogEndpoint {
    fn default() -> Self {
        CatalogEndpoint::new(DEFAULT_CATALOG_URL).with_alias("ELEMENT84")
    }
}

impl fmt::Display for CatalogEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} ({})", alias, self.url),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Aliases kept for compatibility that are not part of the main table
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("PLANETARY_COMPUTER", "https://planetarycomputer.microsoft.com/api/stac/v1"),
    ("CMR", "https://cmr.earthdata.nasa.gov/stac"),
    ("LANDSATLOOK", "https://landsatlook.usgs.gov/stac-server"),
    ("GEE", "https://earthengine-stac.storage.googleapis.com/catalog/catalog.json"),
    ("GOOGLE", "https://earthengine-stac.storage.googleapis.com/catalog/catalog.json"),
    ("EARTH_SEARCH", "https://earth-search.aws.element84.com/v1"),
];

static CATALOGS: &[CatalogEntry] = &[
    CatalogEntry {
        alias: "ASTRAEA",
        name: "Astraea Earth OnDemand",
        url: "https://eod-catalog-svc-prod.astraea.earth/",
        access: AccessTier::Public,
        description: "Astraea Earth OnDemand geospatial imagery query and analysis tool",
    },
    CatalogEntry {
        alias: "GEOBON",
        name: "BON in a Box STAC",
        url: "https://stac.geobon.org/",
        access: AccessTier::Public,
        description: "Spatio Temporal Asset Catalog for layers used in BON in a Box, courtesy of GEO BON.",
    },
    CatalogEntry {
        alias: "CANADA",
        name: "Canadian Geospatial Data Collections",
        url: "https://datacube.services.geo.ca/stac/api/",
        access: AccessTier::Public,
        description: "Collections of geospatial datasets from Canada Centre for Mapping and Earth Observation.",
    },
    CatalogEntry {
        alias: "CBERS",
        name: "CBERS and Amazonia-1 on AWS",
        url: "https://stac.scitekno.com.br/v100/",
        access: AccessTier::Public,
        description: "Imagery acquired by the China-Brazil Earth Resources (CBERS) and Amazonia-1 satellites.",
    },
    CatalogEntry {
        alias: "CYVERSE",
        name: "Cyverse STAC API",
        url: "https://stac.cyverse.org/",
        access: AccessTier::Public,
        description: "Geospatial Data hosted in CyVerse Cloud Storage at the University of Arizona.",
    },
    CatalogEntry {
        alias: "SWISS_ADMIN",
        name: "data.geo.admin.ch",
        url: "https://data.geo.admin.ch/api/stac/v1/",
        access: AccessTier::Public,
        description: "Data Catalog of the Swiss Federal Spatial Data Infrastructure",
    },
    CatalogEntry {
        alias: "DEDL_V2",
        name: "Destination Earth Data Lake (DEDL) API",
        url: "https://hda.data.destination-earth.eu/stac/v2",
        access: AccessTier::Public,
        description: "DestinE Data Lake (DEDL) fulfils the storage and access requirements for any data that is offered to DestinE users.",
    },
    CatalogEntry {
        alias: "DEDL",
        name: "DestinE Data Lake",
        url: "https://hda.data.destination-earth.eu/stac",
        access: AccessTier::Protected,
        description: "The DestinE Data Lake (DEDL) provides discovery, access, and big data processing services.",
    },
    CatalogEntry {
        alias: "DE_AFRICA",
        name: "Digital Earth Africa",
        url: "https://explorer.digitalearth.africa/stac/",
        access: AccessTier::Public,
        description: "Digital Earth Africa is a platform that uses spatial data and images recorded by satellites.",
    },
    CatalogEntry {
        alias: "DE_AUSTRALIA",
        name: "Digital Earth Australia",
        url: "https://explorer.sandbox.dea.ga.gov.au/stac/",
        access: AccessTier::Public,
        description: "Digital Earth Australia (DEA) is a platform that uses spatial data and images recorded by satellites.",
    },
    CatalogEntry {
        alias: "LGLN_NIEDERSACHSEN",
        name: "Digitale Orthophotos Niedersachsen",
        url: "https://dop.stac.lgln.niedersachsen.de",
        access: AccessTier::Public,
        description: "Digital orthophotos from Lower Saxony in Germany, provided by LGLN.",
    },
    CatalogEntry {
        alias: "DESTINE_HUB",
        name: "Earth Data Hub Catalogue",
        url: "https://earthdatahub.destine.eu/api/stac/v1/",
        access: AccessTier::Protected,
        description: "Destination Earth initiative of the European Commission.",
    },
    CatalogEntry {
        alias: "ELEMENT84",
        name: "Earth Search",
        url: "https://earth-search.aws.element84.com/v1/",
        access: AccessTier::Public,
        description: "A STAC API of AWS Public Datasets.",
    },
    CatalogEntry {
        alias: "DLR_EOC",
        name: "EOC EO Products Service",
        url: "https://geoservice.dlr.de/eoc/ogc/stac/v1/",
        access: AccessTier::Public,
        description: "Provides interoperable access to metadata from EO collections and products of DLR's Earth Observation Center (EOC).",
    },
    CatalogEntry {
        alias: "EODC",
        name: "EODC API (openEO)",
        url: "https://openeo.eodc.eu/v1.0/",
        access: AccessTier::Protected,
        description: "The EODC API provides access to the EODC services and data.",
    },
    CatalogEntry {
        alias: "ERS",
        name: "ERS open data",
        url: "https://s3ext.gptl.ru/stac-web-free/catalog.json",
        access: AccessTier::Public,
        description: "Some open data sets from the Russian Federal Space Agency.",
    },
    CatalogEntry {
        alias: "ESA",
        name: "ESA Catalog",
        url: "https://eocat.esa.int/eo-catalogue/",
        access: AccessTier::Public,
        description: "ESA Catalog provides interoperable access to Earth Observation metadata.",
    },
    CatalogEntry {
        alias: "EURAC",
        name: "Eurac Research (openEO)",
        url: "https://openeo.eurac.edu/",
        access: AccessTier::Protected,
        description: "The Eurac Research backend provides EO data available for processing.",
    },
    CatalogEntry {
        alias: "FEDEO",
        name: "FedEO Clearinghouse",
        url: "https://fedeo.ceos.org/",
        access: AccessTier::Public,
        description: "FedEO Clearinghouse provides interoperable access to Earth Observation metadata",
    },
    CatalogEntry {
        alias: "GEOPORTAL",
        name: "Geoportal Server",
        url: "https://gpt.geocloud.com/sentinel/stac",
        access: AccessTier::Public,
        description: "This STAC uses the open-source Esri Geoportal Server.",
    },
    CatalogEntry {
        alias: "TERRADUE_GEP",
        name: "GEP Supersites CSK and CSG data",
        url: "https://gep-supersites-stac.terradue.com/",
        access: AccessTier::Public,
        description: "GEP hosted CSK and CSG data for the Geohazard Supersites.",
    },
    CatalogEntry {
        alias: "GEE_OPENEO",
        name: "Google Earth Engine (openEO)",
        url: "https://earthengine.openeo.org/v1.0/",
        access: AccessTier::Public,
        description: "This is the Google Earth Engine Driver for openEO.",
    },
    CatalogEntry {
        alias: "HUB_OCEAN",
        name: "HUB Ocean´s Ocean Data Platform Catalog",
        url: "https://api.hubocean.earth/api/stac",
        access: AccessTier::Public,
        description: "Hub Ocean Ocean Data Platform (ODP) Public STAC API",
    },
    CatalogEntry {
        alias: "ICONEM",
        name: "Iconem STAC - 3D Cities, monuments, archeo sites",
        url: "https://app.iconem.com/api/stac",
        access: AccessTier::Protected,
        description: "Iconem 3D STAC Catalog includes datasets for 3d-scans of archeo sites.",
    },
    CatalogEntry {
        alias: "KAGIS",
        name: "KAGIS Katalog",
        url: "https://gis.ktn.gv.at/api/stac/v1/",
        access: AccessTier::Public,
        description: "STAC KAGIS - Land Kärnten (Carinthia, Austria)",
    },
    CatalogEntry {
        alias: "KENTUCKY",
        name: "Kentucky From Above STAC",
        url: "https://spved5ihrl.execute-api.us-west-2.amazonaws.com/",
        access: AccessTier::Public,
        description: "This API delivers the Kentucky Aerial Photography and Elevation Data.",
    },
    CatalogEntry {
        alias: "LANTMATERIET_ELEVATION",
        name: "Markhöjdmodell Nedladdning Lantmäteriet",
        url: "https://api.lantmateriet.se/stac-hojd/v1",
        access: AccessTier::Protected,
        description: "The catalog contains elevation data from Lantmäteriet over Sweden.",
    },
    CatalogEntry {
        alias: "MICROSOFT",
        name: "Microsoft Planetary Computer STAC API",
        url: "https://planetarycomputer.microsoft.com/api/stac/v1/",
        access: AccessTier::Public,
        description: "Searchable spatiotemporal metadata describing Earth science datasets.",
    },
    CatalogEntry {
        alias: "MTD",
        name: "MTD STAC API",
        url: "https://api.stac.teledetection.fr",
        access: AccessTier::Public,
        description: "Spatio Temporal Assets Catalog powered by 'Maison de la Teledetection'.",
    },
    CatalogEntry {
        alias: "MUNDIALIS",
        name: "mundialis Actinia (openEO)",
        url: "https://openeo.mundialis.de/api/v1.0/",
        access: AccessTier::Protected,
        description: "Access to the mundialis Actinia service via an openEO interface.",
    },
    CatalogEntry {
        alias: "NASA_CMR_CLOUD",
        name: "NASA CMR CLOUDSTAC Proxy",
        url: "https://cmr.earthdata.nasa.gov/cloudstac/",
        access: AccessTier::Public,
        description: "SpatioTemporal Asset Catalog API on top of NASA's Common Metadata Repository (S3 only).",
    },
    CatalogEntry {
        alias: "NASA_CMR",
        name: "NASA CMR STAC",
        url: "https://cmr.earthdata.nasa.gov/stac/",
        access: AccessTier::Public,
        description: "SpatioTemporal Asset Catalog API on top of NASA's Common Metadata Repository.",
    },
    CatalogEntry {
        alias: "OPENEO_PLATFORM",
        name: "openEO Platform",
        url: "https://openeocloud.vito.be/openeo/1.0.0/",
        access: AccessTier::Protected,
        description: "openEO platform provides intuitive programming libraries to process EO datasets.",
    },
    CatalogEntry {
        alias: "ESA_OSC",
        name: "Open Science Catalog",
        url: "https://esa-earthcode.github.io/open-science-catalog-metadata/catalog.json",
        access: AccessTier::Public,
        description: "Open Science Catalog (OSC) Catalog by the European Space Agency (ESA)",
    },
    CatalogEntry {
        alias: "LANTMATERIET_ORTHO",
        name: "Ortofoto Nedladdning Lantmäteriet",
        url: "https://api.lantmateriet.se/stac-bild/v1",
        access: AccessTier::Protected,
        description: "The catalog contains orthophotos from Lantmäteriet over Sweden.",
    },
    CatalogEntry {
        alias: "PAITULI",
        name: "Paituli STAC (Finland)",
        url: "https://paituli.csc.fi/geoserver/ogc/stac/v1",
        access: AccessTier::Public,
        description: "Paituli STAC includes several open Finnish datasets.",
    },
    CatalogEntry {
        alias: "PANORAMAX",
        name: "Panoramax",
        url: "https://api.panoramax.xyz/api/",
        access: AccessTier::Public,
        description: "This catalog list all geolocated pictures available in this Panoramax instance",
    },
    CatalogEntry {
        alias: "SNAPPLANET",
        name: "Sentinel-2 and Landsat-8 catalog",
        url: "https://tamn.snapplanet.io",
        access: AccessTier::Public,
        description: "Up to date Sentinel-2 and Landsat-8 catalog used for demo with rocket client.",
    },
    CatalogEntry {
        alias: "SENTINEL_HUB",
        name: "Sentinel Hub",
        url: "https://services.sentinel-hub.com/api/v1/catalog/1.0.0/",
        access: AccessTier::Protected,
        description: "Sentinel Hub Catalog is an API implementing the STAC Specification.",
    },
    CatalogEntry {
        alias: "SKYSERVE",
        name: "SkyServe Mission Data",
        url: "https://api.ellipsis-drive.com/v3/ogc/stac/catalog/8a059125-b93d-4dda-b69b-9130fbe9f55e/epat_UK6PDdbzeJpySAvkdV55lztWjjrUZZmFzlYUQPbRFK2VnCxJQZ9twUJlv4ksKGc8",
        access: AccessTier::Public,
        description: "Collection of sample raster data for skyserve missions",
    },
    CatalogEntry {
        alias: "TERRADUE_AI",
        name: "TerraDue AI Extensions",
        url: "https://ai-extensions-stac.terradue.com",
        access: AccessTier::Public,
        description: "stac-fastapi terradue.com first submission in July 2024.",
    },
    CatalogEntry {
        alias: "TERRASCOPE",
        name: "Terrascope",
        url: "https://stac.terrascope.be",
        access: AccessTier::Protected,
        description: "Terrascope is the Belgian Earth Observation Data Space.",
    },
    CatalogEntry {
        alias: "THUENEN",
        name: "Thünen Earth Observation (ThEO)",
        url: "https://eodata.thuenen.de/stac/api/v1/",
        access: AccessTier::Public,
        description: "Open-access, satellite-based products for Germany.",
    },
    CatalogEntry {
        alias: "USGS_3DEP",
        name: "USGS 3DEP Lidar Point Cloud COPC",
        url: "https://planetarycomputer.microsoft.com/api/stac/v1/collections/3dep-lidar-copc",
        access: AccessTier::Public,
        description: "Source data from the USGS 3DEP program reformatted into the COPC format.",
    },
    CatalogEntry {
        alias: "USGS",
        name: "USGS Landsat Collection 2 API",
        url: "https://landsatlook.usgs.gov/stac-server/",
        access: AccessTier::Public,
        description: "USGS authoritative source for Landsat Collection 2 data",
    },
    CatalogEntry {
        alias: "UVT",
        name: "UVT STAC Catalog",
        url: "https://stac.sage.uvt.ro",
        access: AccessTier::Public,
        description: "Spatio-Temporal Asset Catalog containing various geospatial products distributed by West University of Timisoara",
    },
    CatalogEntry {
        alias: "VITO",
        name: "VITO (openEO)",
        url: "https://openeo.vito.be/openeo/1.0/",
        access: AccessTier::Protected,
        description: "openEO API to the VITO Remote Sensing product catalog.",
    },
    CatalogEntry {
        alias: "WORLDPOP",
        name: "WorldPop STAC API",
        url: "https://api.stac.worldpop.org",
        access: AccessTier::Public,
        description: "WorldPop STAC API is a platform for accessing and analysing WorldPop geospatial data.",
    },
];

/// All registered catalogs in table order
pub fn all() -> &'static [CatalogEntry] {
    CATALOGS
}

/// Look up a catalog by alias (case-insensitive)
pub fn lookup(alias: &str) -> Option<&'static CatalogEntry> {
    CATALOGS.iter().find(|entry| entry.alias.eq_ignore_ascii_case(alias.trim()))
}

/// All aliases in table order
pub fn all_aliases() -> Vec<&'static str> {
    CATALOGS.iter().map(|entry| entry.alias).collect()
}

/// All registered API URLs in table order
pub fn all_urls() -> Vec<&'static str> {
    CATALOGS.iter().map(|entry| entry.url).collect()
}

/// Resolve an alias or a URL into an endpoint.
///
/// Registered aliases win over legacy ones; anything that looks like a URL
/// is passed through unchanged.
pub fn resolve(alias_or_url: &str) -> Result<CatalogEndpoint> {
    let key = alias_or_url.trim();
    if key.is_empty() {
        return Err(OpengeoError::ConfigInvalid {
            key: "catalog".to_string(),
            reason: "catalog alias or URL must not be empty".to_string(),
        });
    }

    if let Some(entry) = lookup(key) {
        return Ok(CatalogEndpoint::new(entry.url).with_alias(entry.alias));
    }

    if let Some((alias, url)) =
        LEGACY_ALIASES.iter().find(|(alias, _)| alias.eq_ignore_ascii_case(key))
    {
        return Ok(CatalogEndpoint::new(*url).with_alias(*alias));
    }

    if key.contains("://") {
        return Ok(CatalogEndpoint::new(key));
    }

    Err(OpengeoError::CatalogNotFound { alias: key.to_string() })
}
