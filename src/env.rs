//! Server environment: the shared, read-mostly bag of configuration and
//! collaborators handed to every tunnel.
//!
//! Held by each tunnel's owning task as an `Arc<Environment>`. Nothing ever
//! hands a back-reference the other way, so there is no cycle to break
//! explicitly at shutdown (contrast with the non-owning-pointer discipline
//! the source design calls for in a manually-managed language, §9).

use crate::access::{AccessPolicy, DenyLoopback};
use crate::cipher::{CodecFactory, ConfiguredCodecFactory};
use crate::config::Config;
use crate::registry::TunnelRegistry;
use crate::tunnel::transport;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Everything a tunnel needs that isn't specific to its own connection.
pub struct Environment {
    pub config: Arc<Config>,
    pub codec_factory: Arc<dyn CodecFactory>,
    pub registry: Arc<TunnelRegistry>,
    pub access_policy: Arc<dyn AccessPolicy>,
    pub tls_connector: Option<TlsConnector>,
}

impl Environment {
    pub fn new(config: Config) -> Arc<Self> {
        let config = Arc::new(config);
        let codec_factory: Arc<dyn CodecFactory> = Arc::new(ConfiguredCodecFactory::new(
            config.cipher_method.clone(),
            config.protocol.clone(),
            config.obfs.clone(),
            config.password.clone(),
        ));
        let tls_connector = config.over_tls_enable.then(transport::build_tls_connector);

        Arc::new(Self {
            config,
            codec_factory,
            registry: Arc::new(TunnelRegistry::new()),
            access_policy: Arc::new(DenyLoopback),
            tls_connector,
        })
    }
}
