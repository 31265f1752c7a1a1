//! Values exchanged with the remote health-report capability.

use uuid::Uuid;

/// Identifier of a replication group.
pub type GroupId = Uuid;

/// Reference version vector of a replication group member.
///
/// The vector is an opaque token used as the point of comparison for backlog
/// queries against other members. Copies are made explicitly with
/// [`Vector::duplicate`] so that the canonical copy held by a cache is never
/// shared with callers.
#[derive(Debug, PartialEq, Eq)]
pub struct Vector {
    group: GroupId,
    data: Vec<u8>,
}

impl Vector {
    pub fn new(group: GroupId, data: Vec<u8>) -> Self {
        Self { group, data }
    }

    /// The replication group this vector describes.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Raw vector data as returned by the remote server.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Return an independent copy of the vector.
    pub fn duplicate(&self) -> Vector {
        Vector {
            group: self.group,
            data: self.data.clone(),
        }
    }
}

/// Options controlling the content of a health report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFlags {
    /// Include backlog information. Requires a reference vector.
    pub backlog: bool,
    /// Include per-file details.
    pub files: bool,
}

/// A health report generated by a replication member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Binary report payload.
    pub data: Vec<u8>,
    /// Human readable report text.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_is_independent() {
        let group = Uuid::new_v4();
        let original = Vector::new(group, vec![1, 2, 3]);
        let copy = original.duplicate();
        drop(original);

        assert_eq!(copy.group(), group);
        assert_eq!(copy.data(), &[1, 2, 3]);
    }
}
