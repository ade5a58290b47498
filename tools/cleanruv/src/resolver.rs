//! Walks the operator through each ghost ruv and submits CLEANRUV tasks for the
//! ones they confirm.
//!
//! Every ghost goes through the same small state machine:
//!
//! ```text
//! Presented -> AwaitingChoice -+-> Ignored
//!                              +-> ConfirmPending -+-> Deleted
//!                                                  +-> Aborted
//!                                                  +-> Failed
//! ```
//!
//! Anything that is not an explicit `1` followed by an explicit yes ends in a
//! terminal state without touching the directory.

use std::fmt;
use std::str::FromStr;

use ldap3_proto::proto::{LdapModify, LdapModifyType, LdapPartialAttribute};
use tracing::{debug, error, info, warn};

use crate::error::CleanRuvError;
use crate::ldap::Directory;
use crate::operator::Operator;
use crate::ruv::RuvClassification;

pub const CLEANRUV_ATTR: &str = "nsds5task";
pub const CLEANRUV_TASK: &str = "CLEANRUV";

pub const GHOST_CHOICE_PROMPT: &str = "\n 0 - Ignore \t 1 - Delete Ghost RUV";
pub const CONFIRM_PROMPT: &str = "Are you certain that you can delete this ghost record?";

/// The replica configuration entry of a suffix. `=` in the suffix is escaped as
/// `\3D` since the suffix is itself the value of an rdn.
pub fn replica_config_dn(base_dn: &str) -> String {
    format!(
        "cn=replica,cn={},cn=mapping tree,cn=config",
        base_dn.replace('=', "\\3D")
    )
}

/// Read the replica id from the `{replica <id> [url]}` header of a record.
pub fn replica_id(record: &str) -> Result<u16, CleanRuvError> {
    let header = record
        .trim_start()
        .strip_prefix('{')
        .and_then(|rest| rest.split_once('}'))
        .map(|(header, _)| header)
        .ok_or_else(|| {
            CleanRuvError::MalformedRuv(format!("no {{replica <id>}} header in '{}'", record))
        })?;

    let mut words = header.split_whitespace();
    match (words.next(), words.next()) {
        (Some("replica"), Some(id)) if id.bytes().all(|b| b.is_ascii_digit()) => {
            id.parse::<u16>().map_err(|_| {
                CleanRuvError::MalformedRuv(format!("replica id {} is out of range", id))
            })
        }
        _ => Err(CleanRuvError::MalformedRuv(format!(
            "no replica id in header '{{{}}}'",
            header
        ))),
    }
}

/// The single modification that asks the server to clean a replica id out of
/// every ruv in the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanRuvDirective {
    pub target_dn: String,
    pub replica_id: u16,
}

impl CleanRuvDirective {
    pub fn new(base_dn: &str, record: &str) -> Result<Self, CleanRuvError> {
        Ok(CleanRuvDirective {
            target_dn: replica_config_dn(base_dn),
            replica_id: replica_id(record)?,
        })
    }

    pub fn task_value(&self) -> String {
        format!("{}{}", CLEANRUV_TASK, self.replica_id)
    }

    pub fn changes(&self) -> Vec<LdapModify> {
        vec![LdapModify {
            operation: LdapModifyType::Replace,
            modification: LdapPartialAttribute {
                atype: CLEANRUV_ATTR.to_string(),
                vals: vec![self.task_value().into_bytes()],
            },
        }]
    }
}

impl fmt::Display for CleanRuvDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dn: {}\nchangetype: modify\nreplace: {}\n{}: {}",
            self.target_dn,
            CLEANRUV_ATTR,
            CLEANRUV_ATTR,
            self.task_value()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostChoice {
    Ignore,
    Delete,
}

impl FromStr for GhostChoice {
    type Err = CleanRuvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(GhostChoice::Ignore),
            "1" => Ok(GhostChoice::Delete),
            other => Err(CleanRuvError::InvalidOperatorInput(format!(
                "'{}' is not a valid choice",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GhostOutcome {
    Ignored,
    Aborted,
    /// Confirmed, but not submitted since this is a dry run.
    DryRun(CleanRuvDirective),
    Deleted(CleanRuvDirective),
    Failed(CleanRuvError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGhost {
    pub record: String,
    pub outcome: GhostOutcome,
}

enum GhostState {
    Presented,
    AwaitingChoice,
    ConfirmPending(CleanRuvDirective),
    Done(GhostOutcome),
}

pub struct GhostResolver<'a, D: ?Sized, O: ?Sized> {
    dir: &'a mut D,
    operator: &'a mut O,
    base_dn: &'a str,
    dry_run: bool,
}

impl<'a, D, O> GhostResolver<'a, D, O>
where
    D: Directory + ?Sized,
    O: Operator + ?Sized,
{
    pub fn new(dir: &'a mut D, operator: &'a mut O, base_dn: &'a str) -> Self {
        GhostResolver {
            dir,
            operator,
            base_dn,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Offer every ghost of the classification to the operator, in order.
    pub async fn resolve_all(&mut self, ruvs: &RuvClassification) -> Vec<ResolvedGhost> {
        let mut resolved = Vec::with_capacity(ruvs.ghost.len());
        for record in ruvs.ghost.iter() {
            let outcome = self.resolve(record).await;
            debug!(%record, ?outcome, "ghost resolved");
            resolved.push(ResolvedGhost {
                record: record.clone(),
                outcome,
            });
        }
        resolved
    }

    pub async fn resolve(&mut self, record: &str) -> GhostOutcome {
        let mut state = GhostState::Presented;
        loop {
            state = match state {
                GhostState::Presented => {
                    self.operator
                        .show(&format!("\n======================================\nGhost: {}", record));
                    GhostState::AwaitingChoice
                }
                GhostState::AwaitingChoice => self.await_choice(record),
                GhostState::ConfirmPending(directive) => self.confirm(directive).await,
                GhostState::Done(outcome) => return outcome,
            };
        }
    }

    fn await_choice(&mut self, record: &str) -> GhostState {
        let choice = self
            .operator
            .read_line(GHOST_CHOICE_PROMPT)
            .map_err(|e| CleanRuvError::InvalidOperatorInput(e.to_string()))
            .and_then(|input| input.parse::<GhostChoice>());

        match choice {
            Ok(GhostChoice::Delete) => match CleanRuvDirective::new(self.base_dn, record) {
                Ok(directive) => GhostState::ConfirmPending(directive),
                Err(e) => {
                    warn!(?e, %record, "Unable to build cleanup task");
                    self.operator.show(&format!("Sorry, {}", e));
                    GhostState::Done(GhostOutcome::Failed(e))
                }
            },
            Ok(GhostChoice::Ignore) => {
                self.operator.show("Ghost RUV ignored.");
                GhostState::Done(GhostOutcome::Ignored)
            }
            Err(e) => {
                debug!(?e, "treating operator input as ignore");
                self.operator.show("Ghost RUV ignored.");
                GhostState::Done(GhostOutcome::Ignored)
            }
        }
    }

    async fn confirm(&mut self, directive: CleanRuvDirective) -> GhostState {
        match self.operator.confirm(CONFIRM_PROMPT) {
            Ok(true) => {}
            Ok(false) => return GhostState::Done(GhostOutcome::Aborted),
            Err(e) => {
                warn!(?e, "Unable to read confirmation, not deleting");
                return GhostState::Done(GhostOutcome::Aborted);
            }
        }

        if self.dry_run {
            info!(replica_id = directive.replica_id, "dry-run, cleanup task not submitted");
            self.operator
                .show(&format!("Dry run, would have submitted:\n{}", directive));
            return GhostState::Done(GhostOutcome::DryRun(directive));
        }

        match self
            .dir
            .modify(&directive.target_dn, directive.changes())
            .await
        {
            Ok(()) => {
                info!(
                    replica_id = directive.replica_id,
                    target_dn = %directive.target_dn,
                    "CLEANRUV task submitted"
                );
                self.operator.show(&format!(
                    "{} submitted, the ghost will disappear once the task completes.",
                    directive.task_value()
                ));
                GhostState::Done(GhostOutcome::Deleted(directive))
            }
            Err(e) => {
                error!(?e, replica_id = directive.replica_id, "CLEANRUV task failed");
                self.operator.show(&format!("Sorry, {}", e));
                GhostState::Done(GhostOutcome::Failed(e))
            }
        }
    }
}
