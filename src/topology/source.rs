//! Topology snapshot sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::topology::Domain;

/// A domain topology as of the time it was read.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub domain: Arc<Domain>,
    pub timestamp: SystemTime,
}

/// Supplies the replication topology at the start of each round.
pub trait TopologySource: Send + Sync {
    fn value(&self) -> Result<TopologySnapshot>;
}

/// An in-memory topology that can be replaced at any time.
pub struct StaticTopology {
    current: RwLock<TopologySnapshot>,
}

impl StaticTopology {
    pub fn new(domain: Domain) -> Self {
        Self {
            current: RwLock::new(TopologySnapshot {
                domain: Arc::new(domain),
                timestamp: SystemTime::now(),
            }),
        }
    }

    /// Replace the topology returned to future rounds.
    pub fn replace(&self, domain: Domain) {
        *self.current.write() = TopologySnapshot {
            domain: Arc::new(domain),
            timestamp: SystemTime::now(),
        };
    }
}

impl TopologySource for StaticTopology {
    fn value(&self) -> Result<TopologySnapshot> {
        Ok(self.current.read().clone())
    }
}

/// A topology read from a TOML file on every round.
pub struct FileTopology {
    path: PathBuf,
}

impl FileTopology {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TopologySource for FileTopology {
    fn value(&self) -> Result<TopologySnapshot> {
        let domain = load_domain(&self.path)?;
        Ok(TopologySnapshot {
            domain: Arc::new(domain),
            timestamp: SystemTime::now(),
        })
    }
}

/// Read a domain topology from a TOML file.
pub fn load_domain(path: &Path) -> Result<Domain> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Topology(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| Error::Topology(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_topology_replace() {
        let source = StaticTopology::new(Domain {
            name: "first".into(),
            groups: Vec::new(),
        });
        assert_eq!(source.value().unwrap().domain.name, "first");

        source.replace(Domain {
            name: "second".into(),
            groups: Vec::new(),
        });
        assert_eq!(source.value().unwrap().domain.name, "second");
    }

    #[test]
    fn test_file_topology() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"example.com\"").unwrap();

        let source = FileTopology::new(file.path());
        assert_eq!(source.value().unwrap().domain.name, "example.com");

        let missing = FileTopology::new("/nonexistent/topology.toml");
        assert!(matches!(missing.value(), Err(Error::Topology(_))));
    }
}
