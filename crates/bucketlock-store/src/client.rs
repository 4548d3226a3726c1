use std::sync::Arc;

use object_store::parse_url_opts;
use tracing::info;
use url::Url;

use crate::error::Result;
use crate::remote::ObjectStoreGateway;

/// Build a gateway from a store URL or a bare bucket name.
///
/// `s3://bucket/root`, `gs://bucket`, `az://container`, `file:///tmp/locks`
/// and `memory:///` are accepted; a bare name is read as `s3://<name>`.
/// `options` go straight to the backend builder (endpoint, region,
/// credentials), e.g. `("aws_endpoint", "https://s3.us.cloud-object-storage.appdomain.cloud")`.
pub fn connect<I, K, V>(resource: &str, options: I) -> Result<ObjectStoreGateway>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let url = if resource.contains("://") {
        Url::parse(resource)?
    } else {
        Url::parse(&format!("s3://{}", resource))?
    };

    let (store, root) = parse_url_opts(&url, options)?;
    info!(url = %url, root = %root, "Connected marker gateway");
    Ok(ObjectStoreGateway::with_root(Arc::from(store), root))
}
