use opengeo_core::catalogs::{CatalogEndpoint, SigningMode};
use opengeo_core::config::LayeredConfig;
use opengeo_core::error::Result;
use opengeo_core::ports::{CatalogClient, CatalogConnector};

use crate::client::{StacClient, StacClientOptions};
use crate::signing::PlanetaryComputerSigner;

/// Opens [`StacClient`]s, attaching a URL signer for endpoints that need one
#[derive(Debug, Clone, Default)]
pub struct StacConnector {
    options: StacClientOptions,
}

impl StacConnector {
    pub fn new(options: StacClientOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &LayeredConfig) -> Self {
        Self::new(StacClientOptions::from_config(config))
    }
}

impl CatalogConnector for StacConnector {
    fn open(&self, endpoint: &CatalogEndpoint) -> Result<Box<dyn CatalogClient>> {
        let mut client = StacClient::new(endpoint.url.clone(), self.options.clone())?;

        match endpoint.signing {
            SigningMode::None => {}
            SigningMode::PlanetaryComputer => {
                match PlanetaryComputerSigner::new(
                    self.options.request_timeout,
                    self.options.max_retries,
                ) {
                    Ok(signer) => client = client.with_signer(Box::new(signer)),
                    // Search metadata is unsigned; pixel access will fail later
                    Err(e) => tracing::warn!(
                        "Could not attach URL signer for {}: {}",
                        endpoint,
                        e
                    ),
                }
            }
        }

        tracing::debug!("Opened catalog {}", endpoint);
        Ok(Box::new(client))
    }
}
