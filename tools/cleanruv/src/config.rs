use std::fs::File;
use std::io::{self, Read};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::CleanRuvError;
use crate::ldap::check_uri;
use crate::opt::{Opt, DEFAULT_BIND_DN};
use crate::session::SessionConfig;

/// The optional config file. Every value can be overridden on the command line.
///
/// ```toml
/// uri = "ldaps://ipa1.example.com"
/// bind_dn = "cn=Directory Manager"
/// base_dn = "dc=example,dc=com"
/// ca = "/etc/ipa/ca.crt"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub uri: Option<Url>,
    pub server: Option<String>,
    pub bind_dn: Option<String>,
    pub base_dn: Option<String>,
    pub ca: Option<PathBuf>,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, CleanRuvError> {
        let mut f = File::open(path).map_err(|e| {
            CleanRuvError::Configuration(format!(
                "unable to open config '{}' - {}",
                path.display(),
                e
            ))
        })?;

        let mut contents = String::new();
        f.read_to_string(&mut contents).map_err(|e| {
            CleanRuvError::Configuration(format!(
                "unable to read config '{}' - {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(contents.as_str()).map_err(|e| {
            CleanRuvError::Configuration(format!(
                "unable to parse config '{}' - {}",
                path.display(),
                e
            ))
        })
    }
}

/// Turn `host` into its fully qualified name with `resolve`, keeping `host` as
/// it is when no usable name comes back.
pub fn canonical_hostname<F>(host: &str, resolve: F) -> String
where
    F: FnOnce(&str) -> io::Result<String>,
{
    match resolve(host) {
        Ok(name) if name.is_empty() || name.parse::<IpAddr>().is_ok() => {
            debug!(%host, %name, "no canonical name, using the hostname as is");
            host.to_string()
        }
        Ok(name) => name,
        Err(e) => {
            warn!(?e, %host, "Unable to resolve the local hostname, using it as is");
            host.to_string()
        }
    }
}

fn reverse_lookup(host: &str) -> io::Result<String> {
    let addr = dns_lookup::lookup_host(host)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}", host),
            )
        })?;
    dns_lookup::lookup_addr(&addr)
}

/// The fully qualified name of this machine, the server used when none is given.
pub fn default_host() -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    canonical_hostname(&host, reverse_lookup)
}

/// The effective settings once the command line, config file and defaults have
/// been merged. Does not hold the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub uri: Url,
    pub bind_dn: String,
    pub base_dn: String,
    pub ca: Option<PathBuf>,
    pub dry_run: bool,
}

fn uri_for_host(host: &str) -> Result<Url, CleanRuvError> {
    Url::parse(&format!("ldap://{}", host)).map_err(|e| {
        CleanRuvError::Configuration(format!("'{}' is not a valid server name - {}", host, e))
    })
}

impl Settings {
    pub fn resolve(opt: &Opt, config: Config, default_host: &str) -> Result<Self, CleanRuvError> {
        let uri = match (&opt.uri, &opt.server, config.uri, config.server) {
            (Some(uri), _, _, _) => uri.clone(),
            (None, Some(server), _, _) => uri_for_host(server)?,
            (None, None, Some(uri), _) => uri,
            (None, None, None, Some(server)) => uri_for_host(&server)?,
            (None, None, None, None) => uri_for_host(default_host)?,
        };

        check_uri(&uri)?;

        let base_dn = opt
            .base_dn
            .clone()
            .or(config.base_dn)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CleanRuvError::Configuration(
                    "a base dn is required, for example -d dc=example,dc=com".to_string(),
                )
            })?;

        let bind_dn = opt
            .bind_dn
            .clone()
            .or(config.bind_dn)
            .unwrap_or_else(|| DEFAULT_BIND_DN.to_string());

        let ca = opt.ca.clone().or(config.ca);

        let settings = Settings {
            uri,
            bind_dn,
            base_dn,
            ca,
            dry_run: opt.dry_run,
        };
        debug!(?settings);
        Ok(settings)
    }

    pub fn host(&self) -> &str {
        self.uri.host_str().unwrap_or_default()
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            base_dn: self.base_dn.clone(),
            host: self.host().to_string(),
            dry_run: self.dry_run,
        }
    }
}
