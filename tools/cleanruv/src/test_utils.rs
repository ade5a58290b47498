use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use ldap3_proto::proto::{LdapFilter, LdapModify, LdapSearchScope};

use crate::error::CleanRuvError;
use crate::ldap::{Directory, DirectoryEntry};
use crate::operator::Operator;
use crate::resolver::{replica_id, CLEANRUV_ATTR, CLEANRUV_TASK};
use crate::ruv::RUV_ATTR;

pub(crate) const TOMBSTONE_DN: &str =
    "nsuniqueid=ffffffff-ffffffff-ffffffff-ffffffff,dc=example,dc=com";

/// An in-memory directory holding the replication tombstone. A successful
/// CLEANRUV modify drops the matching records, as the server task would.
#[derive(Debug, Default)]
pub(crate) struct MockDirectory {
    pub entries: Vec<DirectoryEntry>,
    pub search_error: Option<String>,
    pub modify_error: Option<String>,
    pub searches: usize,
    /// (dn, attribute, values) of every accepted modification.
    pub modifies: Vec<(String, String, Vec<String>)>,
}

impl MockDirectory {
    pub fn with_records(records: Vec<String>) -> Self {
        MockDirectory {
            entries: vec![DirectoryEntry::new(TOMBSTONE_DN).with_values(RUV_ATTR, records)],
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<String> {
        self.entries
            .first()
            .and_then(|e| e.get_ava(RUV_ATTR))
            .map(|v| v.to_vec())
            .unwrap_or_default()
    }

    fn clean(&mut self, task: &str) {
        let Some(id) = task
            .strip_prefix(CLEANRUV_TASK)
            .and_then(|id| id.parse::<u16>().ok())
        else {
            return;
        };

        for entry in self.entries.iter_mut() {
            if let Some(values) = entry.attrs.get_mut(RUV_ATTR) {
                values.retain(|r| replica_id(r) != Ok(id));
            }
        }
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn search(
        &mut self,
        _base: &str,
        _scope: LdapSearchScope,
        _filter: LdapFilter,
        _attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>, CleanRuvError> {
        self.searches += 1;
        match &self.search_error {
            Some(e) => Err(CleanRuvError::DirectoryUnavailable(e.clone())),
            None => Ok(self.entries.clone()),
        }
    }

    async fn modify(&mut self, dn: &str, changes: Vec<LdapModify>) -> Result<(), CleanRuvError> {
        if let Some(e) = &self.modify_error {
            return Err(CleanRuvError::DirectoryModifyFailed(e.clone()));
        }

        for change in changes {
            let values: Vec<String> = change
                .modification
                .vals
                .iter()
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .collect();

            if change.modification.atype == CLEANRUV_ATTR {
                for v in values.iter() {
                    self.clean(v);
                }
            }

            self.modifies
                .push((dn.to_string(), change.modification.atype, values));
        }
        Ok(())
    }
}

/// Replays canned operator answers. Running out of answers behaves like a
/// closed stdin.
#[derive(Debug, Default)]
pub(crate) struct ScriptedOperator {
    lines: VecDeque<String>,
    confirms: VecDeque<bool>,
    pub output: Vec<String>,
    pub prompts: Vec<String>,
}

impl ScriptedOperator {
    pub fn push_line(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
    }

    pub fn push_confirm(&mut self, answer: bool) {
        self.confirms.push_back(answer);
    }

    pub fn pending_confirms(&self) -> usize {
        self.confirms.len()
    }

    pub fn saw(&self, text: &str) -> bool {
        self.output.iter().any(|o| o.contains(text))
    }
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "no more scripted input")
}

impl Operator for ScriptedOperator {
    fn show(&mut self, text: &str) {
        self.output.push(text.to_string());
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        self.prompts.push(prompt.to_string());
        self.lines.pop_front().ok_or_else(eof)
    }

    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        self.prompts.push(prompt.to_string());
        self.confirms.pop_front().ok_or_else(eof)
    }

    fn pause(&mut self, prompt: &str) -> io::Result<()> {
        self.prompts.push(prompt.to_string());
        Ok(())
    }
}
