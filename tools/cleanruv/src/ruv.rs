//! Reading and classifying the replica update vectors of the replication tombstone.
//!
//! A 389-ds server keeps one RUV record per replica it knows about as a value of
//! `nsds50ruv` on a special tombstone entry:
//!
//! ```text
//! {replicageneration} 5fa1c2d3000000010000
//! {replica 4 ldap://ipa1.example.com:389} 5fa1c2d4000000040000 5fa2e8a1000100040000
//! {replica 7}
//! ```
//!
//! The last form has no url and no generation - it belongs to a replica that
//! was removed without running CLEANALLRUV, and is a ghost.

use std::fmt;

use ldap3_proto::proto::{LdapFilter, LdapSearchScope};
use tracing::{debug, warn};

use crate::error::CleanRuvError;
use crate::ldap::Directory;

pub const RUV_ATTR: &str = "nsds50ruv";
pub const TOMBSTONE_UNIQUEID: &str = "ffffffff-ffffffff-ffffffff-ffffffff";
pub const TOMBSTONE_OBJECTCLASS: &str = "nstombstone";
pub const TOMBSTONE_FILTER: &str =
    "(&(nsuniqueid=ffffffff-ffffffff-ffffffff-ffffffff)(objectclass=nstombstone))";

const MARKER_GENERATION: &str = "replicageneration";
const MARKER_LDAP_URL: &str = "ldap://";

/// The filter matching the replication tombstone, equivalent to [TOMBSTONE_FILTER].
pub fn tombstone_filter() -> LdapFilter {
    LdapFilter::And(vec![
        LdapFilter::Equality("nsuniqueid".to_string(), TOMBSTONE_UNIQUEID.to_string()),
        LdapFilter::Equality("objectclass".to_string(), TOMBSTONE_OBJECTCLASS.to_string()),
    ])
}

/// Fetch the raw ruv records below `base_dn`, in the order the server returned them.
///
/// Only the first matching tombstone is read. No tombstone at all is not an
/// error, it simply yields no records.
pub async fn fetch_ruvs<D>(dir: &mut D, base_dn: &str) -> Result<Vec<String>, CleanRuvError>
where
    D: Directory + ?Sized,
{
    debug!(%base_dn, filter = TOMBSTONE_FILTER, "searching for the replication tombstone");

    let entries = dir
        .search(
            base_dn,
            LdapSearchScope::Subtree,
            tombstone_filter(),
            &[RUV_ATTR],
        )
        .await?;

    if entries.len() > 1 {
        warn!(
            count = entries.len(),
            "More than one replication tombstone matched, only the first is inspected"
        );
    }

    let ruvs = match entries.into_iter().next() {
        Some(mut entry) => {
            debug!(dn = %entry.dn, "found replication tombstone");
            entry.remove_ava(RUV_ATTR).unwrap_or_default()
        }
        None => Vec::new(),
    };

    debug!(count = ruvs.len(), "ruv records read");
    Ok(ruvs)
}

pub fn is_generation(record: &str) -> bool {
    record.contains(MARKER_GENERATION)
}

pub fn is_normal(record: &str) -> bool {
    record.contains(MARKER_LDAP_URL)
}

pub fn is_ghost(record: &str) -> bool {
    !is_generation(record) && !is_normal(record)
}

/// How a single record is labelled when listing every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuvKind {
    Generation,
    Normal,
    Ghost,
}

impl RuvKind {
    pub fn of(record: &str) -> Self {
        if is_generation(record) {
            RuvKind::Generation
        } else if is_normal(record) {
            RuvKind::Normal
        } else {
            RuvKind::Ghost
        }
    }
}

impl fmt::Display for RuvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuvKind::Generation => write!(f, "Generation"),
            RuvKind::Normal => write!(f, "Normal"),
            RuvKind::Ghost => write!(f, "*Ghost"),
        }
    }
}

/// The records of one query, split into the three views. Each view is an
/// independent filter over `all`, so a record holding both markers is listed in
/// `generation` and `normal` alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuvClassification {
    pub all: Vec<String>,
    pub generation: Vec<String>,
    pub normal: Vec<String>,
    pub ghost: Vec<String>,
}

impl RuvClassification {
    pub fn classify(records: Vec<String>) -> Self {
        let select = |pred: fn(&str) -> bool| -> Vec<String> {
            records.iter().filter(|r| pred(r)).cloned().collect()
        };

        let generation = select(is_generation);
        let normal = select(is_normal);
        let ghost = select(is_ghost);

        RuvClassification {
            all: records,
            generation,
            normal,
            ghost,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn has_ghosts(&self) -> bool {
        !self.ghost.is_empty()
    }
}
