//! Replication topology and backlog records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::callstat::Call;
use crate::error::Error;
use crate::reporter::GroupId;

/// A domain-wide replication topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Domain {
    pub name: String,
    #[serde(rename = "group")]
    pub groups: Vec<Group>,
}

/// A replication group: a set of folders replicated between members.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Group {
    pub name: String,
    pub id: GroupId,
    #[serde(default, rename = "folder")]
    pub folders: Vec<Folder>,
    #[serde(default, rename = "member")]
    pub members: Vec<Member>,
}

/// A replicated folder. Backlog counts are reported in folder order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub id: Option<Uuid>,
}

/// A server participating in a replication group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    pub name: String,
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Host name of the member's computer. Empty when unresolved.
    #[serde(default)]
    pub host: String,
    /// Inbound connections of the member.
    #[serde(default, rename = "connection")]
    pub connections: Vec<Connection>,
}

/// An inbound replication connection from another member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Connection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Host name of the sending member. Empty when unresolved.
    #[serde(default)]
    pub from_host: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// One connection to be polled: `from` sends to `to` within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub group_name: String,
    pub group_id: GroupId,
    pub folders: Vec<Folder>,
    pub from: String,
    pub to: String,
}

/// Backlog of a single replicated folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderBacklog {
    pub folder: Folder,
    /// Number of outstanding changes. Negative when the folder's query
    /// failed.
    pub backlog: i64,
}

/// Backlog of one replication connection, per folder.
#[derive(Debug, Clone)]
pub struct Backlog {
    pub group_name: String,
    pub group_id: GroupId,
    pub from: String,
    pub to: String,
    pub folders: Vec<FolderBacklog>,
    /// Timing of the queries that produced the record.
    pub call: Call,
    pub error: Option<Error>,
}

impl Backlog {
    /// Build a record for `target` from the per-folder counts returned by
    /// the sending member.
    ///
    /// Counts are attached only when there is one for each of the group's
    /// folders.
    pub fn new(target: Target, result: Result<Vec<i64>, Error>, call: Call) -> Self {
        let (folders, error) = match result {
            Ok(values) if values.len() == target.folders.len() => {
                let folders = target
                    .folders
                    .into_iter()
                    .zip(values)
                    .map(|(folder, backlog)| FolderBacklog { folder, backlog })
                    .collect();
                (folders, None)
            }
            Ok(values) => {
                tracing::warn!(
                    group = %target.group_name,
                    from = %target.from,
                    to = %target.to,
                    expected = target.folders.len(),
                    received = values.len(),
                    "Backlog folder count does not match topology"
                );
                (Vec::new(), None)
            }
            Err(err) => (Vec::new(), Some(err)),
        };

        Self {
            group_name: target.group_name,
            group_id: target.group_id,
            from: target.from,
            to: target.to,
            folders,
            call,
            error,
        }
    }

    /// Total backlog across folders. Failed folders are not counted.
    pub fn sum(&self) -> u64 {
        self.folders
            .iter()
            .filter(|f| f.backlog > 0)
            .map(|f| f.backlog as u64)
            .sum()
    }

    /// Returns true if the record is error free, has folders, and every
    /// folder has a backlog of zero.
    pub fn is_zero(&self) -> bool {
        self.error.is_none()
            && !self.folders.is_empty()
            && self.folders.iter().all(|f| f.backlog == 0)
    }
}
