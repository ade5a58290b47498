//! The interactive loop. Every cycle starts from a fresh query, so the effect of
//! a cleanup task is only visible on the following cycle.

use std::ops::ControlFlow;

use tracing::{debug, info, warn};

use crate::error::CleanRuvError;
use crate::ldap::Directory;
use crate::operator::Operator;
use crate::resolver::{GhostOutcome, GhostResolver};
use crate::ruv::{fetch_ruvs, RuvClassification, RuvKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const RULE: &str = "======================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_dn: String,
    /// Only used for display.
    pub host: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Exit,
    SeeAll,
    FixGhosts,
}

impl MenuChoice {
    /// `2` is only a valid choice while there are ghosts to fix.
    pub fn parse(input: &str, ghosts_offered: bool) -> Result<Self, CleanRuvError> {
        match input.trim() {
            "0" => Ok(MenuChoice::Exit),
            "1" => Ok(MenuChoice::SeeAll),
            "2" if ghosts_offered => Ok(MenuChoice::FixGhosts),
            other => Err(CleanRuvError::InvalidOperatorInput(format!(
                "'{}' is not a menu option",
                other
            ))),
        }
    }
}

pub fn menu_prompt(ghosts_offered: bool) -> &'static str {
    if ghosts_offered {
        " 0 - Exit \t 1 - See all \t 2 - Fix Ghost RUVs"
    } else {
        " 0 - Exit \t 1 - See all"
    }
}

pub fn render_summary(ruvs: &RuvClassification, host: &str) -> String {
    let alarm = if ruvs.has_ghosts() {
        " !!!!!!!!!!!!!!"
    } else {
        ""
    };

    format!(
        "\n\n{RULE}\n Ghost Replicas Fixer (clean-all-ruv) \n Version: {VERSION}\n Host: {host}\n{RULE}\n               RUV's\n Ghosts: {}{alarm}\n Generation: {}\n Normal: {}\n Total: {}\n{RULE}",
        ruvs.ghost.len(),
        ruvs.generation.len(),
        ruvs.normal.len(),
        ruvs.all.len(),
    )
}

pub fn render_all(ruvs: &RuvClassification) -> String {
    let mut out = String::from("\n All RUVs:");
    for record in ruvs.all.iter() {
        out.push_str(&format!("\n {} - {}", RuvKind::of(record), record));
    }
    out
}

/// Run one query / display / act cycle.
pub async fn run_cycle<D, O>(
    dir: &mut D,
    operator: &mut O,
    config: &SessionConfig,
) -> Result<ControlFlow<()>, CleanRuvError>
where
    D: Directory + ?Sized,
    O: Operator + ?Sized,
{
    let ruvs = RuvClassification::classify(fetch_ruvs(dir, &config.base_dn).await?);

    if ruvs.is_empty() {
        operator.show(&format!("No RUVs were found at {}", config.host));
        return Ok(ControlFlow::Break(()));
    }

    debug!(
        ghost = ruvs.ghost.len(),
        generation = ruvs.generation.len(),
        normal = ruvs.normal.len(),
        total = ruvs.all.len(),
        "ruvs classified"
    );

    operator.show(&render_summary(&ruvs, &config.host));

    let ghosts_offered = ruvs.has_ghosts();
    let input = match operator.read_line(menu_prompt(ghosts_offered)) {
        Ok(input) => input,
        Err(e) => {
            // stdin is gone, there is no one left to ask.
            warn!(?e, "Unable to read menu choice, exiting");
            return Ok(ControlFlow::Break(()));
        }
    };

    match MenuChoice::parse(&input, ghosts_offered) {
        Ok(MenuChoice::Exit) => Ok(ControlFlow::Break(())),
        Ok(MenuChoice::SeeAll) => {
            operator.show(&render_all(&ruvs));
            if let Err(e) = operator.pause("[Enter to continue]") {
                debug!(?e, "pause interrupted");
            }
            Ok(ControlFlow::Continue(()))
        }
        Ok(MenuChoice::FixGhosts) => {
            let resolved = GhostResolver::new(dir, operator, &config.base_dn)
                .dry_run(config.dry_run)
                .resolve_all(&ruvs)
                .await;

            let submitted = resolved
                .iter()
                .filter(|r| matches!(r.outcome, GhostOutcome::Deleted(_)))
                .count();
            let failed = resolved
                .iter()
                .filter(|r| matches!(r.outcome, GhostOutcome::Failed(_)))
                .count();
            info!(submitted, failed, offered = resolved.len(), "ghost resolution complete");
            Ok(ControlFlow::Continue(()))
        }
        Err(e) => {
            debug!(?e, "ignoring menu input");
            Ok(ControlFlow::Continue(()))
        }
    }
}

/// Cycle until the operator exits or there is nothing left to look at. Only a
/// failure to query the directory ends the session with an error.
pub async fn run_session<D, O>(
    dir: &mut D,
    operator: &mut O,
    config: &SessionConfig,
) -> Result<(), CleanRuvError>
where
    D: Directory + ?Sized,
    O: Operator + ?Sized,
{
    loop {
        if run_cycle(dir, operator, config).await?.is_break() {
            return Ok(());
        }
    }
}
