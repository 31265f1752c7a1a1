//! Replication topology.
//!
//! Discovering the topology from a directory service is outside this crate;
//! a [`TopologySource`] supplies a snapshot of it at the start of every
//! polling round.

pub mod source;
pub mod types;

pub use source::{load_domain, FileTopology, StaticTopology, TopologySnapshot, TopologySource};
pub use types::{Backlog, Connection, Domain, Folder, FolderBacklog, Group, Member, Target};

/// Enumerate the enabled connections of `domain`.
///
/// Each connection is reported from its sending member (`from`) to the
/// member that owns it (`to`). Members and connections without a host name
/// are skipped.
pub fn connections(domain: &Domain) -> Vec<Target> {
    let mut targets = Vec::new();
    for group in &domain.groups {
        for member in &group.members {
            if member.host.is_empty() {
                continue;
            }
            for conn in &member.connections {
                if conn.from_host.is_empty() || !conn.enabled {
                    continue;
                }
                targets.push(Target {
                    group_name: group.name.clone(),
                    group_id: group.id,
                    folders: group.folders.clone(),
                    from: conn.from_host.clone(),
                    to: member.host.clone(),
                });
            }
        }
    }
    targets
}
