//! Server address resolution with `_minecraft._tcp` SRV support.

use std::net::IpAddr;

use hickory_resolver::TokioAsyncResolver;
use tracing::debug;

use mcje_proto::version::DEFAULT_PORT;

/// SRV records only apply to plain hostnames on the default port: an
/// explicit port, an IP literal, or localhost short-circuits the lookup.
pub fn needs_srv_lookup(host: &str, port: u16) -> bool {
    port == DEFAULT_PORT && host != "localhost" && host.parse::<IpAddr>().is_err()
}

/// Resolve the address to actually connect to. Lookup failures fall back to
/// the original pair.
pub async fn resolve_address(host: &str, port: u16) -> (String, u16) {
    if !needs_srv_lookup(host, port) {
        return (host.to_string(), port);
    }

    let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => resolver,
        Err(e) => {
            debug!("no system resolver ({e}); using {host}:{port}");
            return (host.to_string(), port);
        }
    };

    match resolver.srv_lookup(format!("_minecraft._tcp.{host}")).await {
        Ok(records) => match records.iter().next() {
            Some(srv) => {
                let target = srv.target().to_utf8();
                let target = target.trim_end_matches('.').to_string();
                debug!("SRV record points {host} at {target}:{}", srv.port());
                (target, srv.port())
            }
            None => (host.to_string(), port),
        },
        Err(e) => {
            debug!("SRV lookup for {host} failed ({e}); connecting directly");
            (host.to_string(), port)
        }
    }
}
