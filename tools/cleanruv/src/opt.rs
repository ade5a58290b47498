use std::path::PathBuf;

use url::Url;

pub const DEFAULT_BIND_DN: &str = "cn=Directory Manager";

#[derive(Debug, Clone, Default, clap::Parser)]
#[clap(
    name = "ds-cleanruv",
    version,
    about = "Find and clean ghost replica update vectors on a 389-ds / FreeIPA server"
)]
pub struct Opt {
    /// The replicated suffix to inspect, e.g. dc=example,dc=com
    #[clap(short = 'd', long = "base-dn")]
    pub base_dn: Option<String>,

    /// The directory server to inspect. Defaults to the local hostname.
    #[clap(short, long)]
    pub server: Option<String>,

    /// Full ldap:// or ldaps:// uri of the server. Overrides --server.
    #[clap(short = 'H', long)]
    pub uri: Option<Url>,

    /// Defaults to "cn=Directory Manager"
    #[clap(short = 'D', long = "bind-dn")]
    pub bind_dn: Option<String>,

    /// The bind password. Prompted for if not provided.
    #[clap(short, long, env = "DS_CLEANRUV_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// CA certificate (PEM) to trust when connecting with ldaps.
    #[clap(long)]
    pub ca: Option<PathBuf>,

    /// Optional config file providing defaults for the options above.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Show the CLEANRUV tasks that would be submitted, without submitting them.
    #[clap(long)]
    pub dry_run: bool,

    /// Enable debugging output
    #[clap(long, env = "DS_CLEANRUV_DEBUG")]
    pub debug: bool,
}
