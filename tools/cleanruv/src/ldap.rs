//! A minimal LDAPv3 client for the handful of operations the ghost fixer needs.
//!
//! The connection is opened and bound lazily on the first request, then reused
//! for every following search or modify.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use ldap3_proto::proto::{
    LdapBindCred, LdapBindRequest, LdapDerefAliases, LdapFilter, LdapModify,
    LdapModifyRequest, LdapMsg, LdapOp, LdapResult, LdapResultCode,
    LdapSearchRequest, LdapSearchResultEntry, LdapSearchScope,
};
use ldap3_proto::LdapCodec;
use openssl::ssl::{SslConnector, SslMethod};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::CleanRuvError;

pub const DEFAULT_LDAP_PORT: u16 = 389;
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// A search result entry. Attribute names are folded to lowercase since ldap
/// attribute names are case insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: &str) -> Self {
        DirectoryEntry {
            dn: dn.to_string(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_values<I, S>(mut self, attr: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .entry(attr.to_lowercase())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn get_ava(&self, attr: &str) -> Option<&[String]> {
        self.attrs.get(&attr.to_lowercase()).map(|v| v.as_slice())
    }

    pub fn remove_ava(&mut self, attr: &str) -> Option<Vec<String>> {
        self.attrs.remove(&attr.to_lowercase())
    }
}

impl From<LdapSearchResultEntry> for DirectoryEntry {
    fn from(entry: LdapSearchResultEntry) -> Self {
        let mut attrs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for attr in entry.attributes.iter() {
            attrs.entry(attr.atype.to_lowercase()).or_default().extend(
                attr.vals
                    .iter()
                    .map(|v| String::from_utf8_lossy(v).into_owned()),
            );
        }
        DirectoryEntry {
            dn: entry.dn,
            attrs,
        }
    }
}

/// The directory operations the ruv parser and the ghost resolver depend on.
#[async_trait]
pub trait Directory: Send {
    async fn search(
        &mut self,
        base: &str,
        scope: LdapSearchScope,
        filter: LdapFilter,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, CleanRuvError>;

    async fn modify(&mut self, dn: &str, changes: Vec<LdapModify>) -> Result<(), CleanRuvError>;
}

trait LdapStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> LdapStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

struct LdapInner {
    framed: Framed<Box<dyn LdapStream>, LdapCodec>,
    msgid: i32,
    // Set once the transport fails, so the next request reconnects.
    broken: bool,
}

fn describe_result(res: &LdapResult) -> String {
    if res.message.is_empty() {
        format!("{:?}", res.code)
    } else {
        format!("{:?} - {}", res.code, res.message)
    }
}

impl LdapInner {
    fn next_msgid(&mut self) -> i32 {
        self.msgid += 1;
        self.msgid
    }

    async fn send(&mut self, op: LdapOp) -> Result<i32, String> {
        let msgid = self.next_msgid();
        let msg = LdapMsg {
            msgid,
            op,
            ctrl: vec![],
        };
        self.framed.send(msg).await.map_err(|e| {
            self.broken = true;
            format!("unable to send request -> {:?}", e)
        })?;
        Ok(msgid)
    }

    async fn recv(&mut self, msgid: i32) -> Result<LdapOp, String> {
        loop {
            match self.framed.next().await {
                Some(Ok(msg)) if msg.msgid == msgid => return Ok(msg.op),
                Some(Ok(msg)) => {
                    warn!(msgid = msg.msgid, expected = msgid, "Discarding unsolicited ldap message");
                }
                Some(Err(e)) => {
                    self.broken = true;
                    return Err(format!("invalid ldap response -> {:?}", e));
                }
                None => {
                    self.broken = true;
                    return Err("connection closed by the server".to_string());
                }
            }
        }
    }

    async fn search(&mut self, req: LdapSearchRequest) -> Result<Vec<DirectoryEntry>, String> {
        let msgid = self.send(LdapOp::SearchRequest(req)).await?;

        let mut entries = Vec::new();
        loop {
            match self.recv(msgid).await? {
                LdapOp::SearchResultEntry(entry) => entries.push(DirectoryEntry::from(entry)),
                LdapOp::SearchResultReference(r) => debug!(uris = ?r.uris, "skipping referral"),
                LdapOp::SearchResultDone(res) => {
                    return if res.code == LdapResultCode::Success {
                        Ok(entries)
                    } else {
                        Err(describe_result(&res))
                    };
                }
                op => {
                    debug!(?op, "Invalid ldap response state");
                    return Err("invalid ldap response state".to_string());
                }
            }
        }
    }

    async fn modify(&mut self, req: LdapModifyRequest) -> Result<(), String> {
        let msgid = self.send(LdapOp::ModifyRequest(req)).await?;

        match self.recv(msgid).await? {
            LdapOp::ModifyResponse(res) if res.code == LdapResultCode::Success => Ok(()),
            LdapOp::ModifyResponse(res) => Err(describe_result(&res)),
            op => {
                debug!(?op, "Invalid ldap response state");
                Err("invalid ldap response state".to_string())
            }
        }
    }
}

/// Where and as whom to connect. Kept apart from the live connection so that
/// connecting only borrows this part of the client.
struct LdapTarget {
    uri: Url,
    ca: Option<PathBuf>,
    bind_dn: String,
    bind_pw: String,
}

impl LdapTarget {
    fn port(&self) -> u16 {
        self.uri.port().unwrap_or(if self.uri.scheme() == "ldaps" {
            DEFAULT_LDAPS_PORT
        } else {
            DEFAULT_LDAP_PORT
        })
    }

    async fn open_stream(&self, host: &str) -> Result<Box<dyn LdapStream>, CleanRuvError> {
        let port = self.port();
        debug!(%host, %port, "connecting");

        let tcpstream = TcpStream::connect((host, port)).await.map_err(|e| {
            error!(?e, "Failed to connect to {}", self.uri);
            CleanRuvError::DirectoryUnavailable(format!("{} - {}", self.uri, e))
        })?;

        if self.uri.scheme() != "ldaps" {
            return Ok(Box::new(tcpstream));
        }

        let tls_err = |e: &dyn std::fmt::Display| {
            error!("Failed to initialise TLS -> {}", e);
            CleanRuvError::DirectoryUnavailable(format!("TLS setup with {} failed - {}", host, e))
        };

        let mut tls_parms =
            SslConnector::builder(SslMethod::tls_client()).map_err(|e| tls_err(&e))?;
        if let Some(ca) = self.ca.as_ref() {
            tls_parms.set_ca_file(ca).map_err(|e| tls_err(&e))?;
        }
        let tls_parms = tls_parms.build();

        let ssl = tls_parms
            .configure()
            .and_then(|c| c.into_ssl(host))
            .map_err(|e| tls_err(&e))?;

        let mut tlsstream = SslStream::new(ssl, tcpstream).map_err(|e| tls_err(&e))?;
        Pin::new(&mut tlsstream)
            .connect()
            .await
            .map_err(|e| tls_err(&e))?;

        Ok(Box::new(tlsstream))
    }

    async fn connect(&self) -> Result<LdapInner, CleanRuvError> {
        let host = self.uri.host_str().ok_or_else(|| {
            CleanRuvError::DirectoryUnavailable(format!("no host present in uri {}", self.uri))
        })?;

        let stream = self.open_stream(host).await?;

        let mut inner = LdapInner {
            framed: Framed::new(stream, LdapCodec::default()),
            msgid: 0,
            broken: false,
        };

        let bind = LdapOp::BindRequest(LdapBindRequest {
            dn: self.bind_dn.clone(),
            cred: LdapBindCred::Simple(self.bind_pw.clone()),
        });

        let bind_result = match inner.send(bind).await {
            Ok(msgid) => inner.recv(msgid).await,
            Err(e) => Err(e),
        };

        match bind_result {
            Ok(LdapOp::BindResponse(res)) if res.res.code == LdapResultCode::Success => {
                debug!(bind_dn = ?self.bind_dn, uri = %self.uri, "bound");
                Ok(inner)
            }
            Ok(LdapOp::BindResponse(res)) => {
                error!(bind_dn = ?self.bind_dn, "Failed to bind (authenticate) to the directory");
                Err(CleanRuvError::DirectoryUnavailable(describe_result(&res.res)))
            }
            Ok(op) => {
                debug!(?op, "Invalid ldap response state");
                Err(CleanRuvError::DirectoryUnavailable(
                    "invalid response to bind request".to_string(),
                ))
            }
            Err(e) => {
                error!(?e, "Failed to bind (authenticate) to the directory");
                Err(CleanRuvError::DirectoryUnavailable(e))
            }
        }
    }
}

/// Only `ldap://` and `ldaps://` uris naming a host can be connected to.
pub fn check_uri(uri: &Url) -> Result<(), CleanRuvError> {
    match uri.scheme() {
        "ldap" | "ldaps" => {}
        scheme => {
            return Err(CleanRuvError::Configuration(format!(
                "unsupported uri scheme '{}', expected ldap or ldaps",
                scheme
            )))
        }
    }

    if uri.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(CleanRuvError::Configuration(format!(
            "no host present in uri {}",
            uri
        )));
    }
    Ok(())
}

pub struct LdapClient {
    target: LdapTarget,
    conn: Option<LdapInner>,
}

impl std::fmt::Debug for LdapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapClient")
            .field("uri", &self.target.uri.as_str())
            .field("bind_dn", &self.target.bind_dn)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl LdapClient {
    pub fn new(
        uri: Url,
        ca: Option<PathBuf>,
        bind_dn: String,
        bind_pw: String,
    ) -> Result<Self, CleanRuvError> {
        check_uri(&uri)?;

        Ok(LdapClient {
            target: LdapTarget {
                uri,
                ca,
                bind_dn,
                bind_pw,
            },
            conn: None,
        })
    }

    async fn inner(&mut self) -> Result<&mut LdapInner, CleanRuvError> {
        if self.conn.is_none() {
            let inner = self.target.connect().await?;
            self.conn = Some(inner);
        }
        self.conn.as_mut().ok_or_else(|| {
            CleanRuvError::DirectoryUnavailable("no connection available".to_string())
        })
    }

    fn drop_if_broken(&mut self) {
        if self.conn.as_ref().is_some_and(|c| c.broken) {
            warn!(uri = %self.target.uri, "connection lost, will reconnect on next request");
            self.conn = None;
        }
    }

    /// Politely close the connection if one was opened. Errors are ignored.
    pub async fn unbind(&mut self) {
        if let Some(mut inner) = self.conn.take() {
            if let Err(e) = inner.send(LdapOp::UnbindRequest).await {
                debug!(?e, "unbind failed");
            }
        }
    }
}

#[async_trait]
impl Directory for LdapClient {
    async fn search(
        &mut self,
        base: &str,
        scope: LdapSearchScope,
        filter: LdapFilter,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, CleanRuvError> {
        let req = LdapSearchRequest {
            base: base.to_string(),
            scope,
            aliases: LdapDerefAliases::Never,
            sizelimit: 0,
            timelimit: 0,
            typesonly: false,
            filter,
            attrs: attrs.iter().map(|a| a.to_string()).collect(),
        };

        let result = self.inner().await?.search(req).await;
        self.drop_if_broken();

        result.map_err(|e| {
            error!(?e, "Failed to search the directory");
            CleanRuvError::DirectoryUnavailable(e)
        })
    }

    async fn modify(&mut self, dn: &str, changes: Vec<LdapModify>) -> Result<(), CleanRuvError> {
        let req = LdapModifyRequest {
            dn: dn.to_string(),
            changes,
        };

        let result = self.inner().await?.modify(req).await;
        self.drop_if_broken();

        result.map_err(|e| {
            error!(?e, %dn, "Failed to modify");
            CleanRuvError::DirectoryModifyFailed(e)
        })
    }
}
