//! Common types shared between the launcher and its collaborators.

/// Index of a simulated party.
///
/// Parties are numbered `0..n_nodes`; the fabric knows them by the
/// `node<index>` name produced by [`PartyId::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartyId(pub usize);

impl PartyId {
    /// Returns the raw party index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Returns the fabric-level node name (`node0`, `node1`, ...).
    pub fn name(&self) -> String {
        format!("node{}", self.0)
    }

    /// Returns ids for every party in `0..n_nodes`.
    pub fn all(n_nodes: usize) -> Vec<PartyId> {
        (0..n_nodes).map(PartyId).collect()
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Connectivity of the quantum channel fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// Every party is linked to every other party.
    #[default]
    Complete,

    /// Parties linked in a closed cycle.
    Ring,

    /// Parties linked in an open chain.
    Path,
}

impl Topology {
    /// Returns the topology name as understood by the fabric.
    pub fn name(&self) -> &'static str {
        match self {
            Topology::Complete => "complete",
            Topology::Ring => "ring",
            Topology::Path => "path",
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parses `complete`, `ring` or `path`, ignoring case.
impl std::str::FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "complete" => Ok(Topology::Complete),
            "ring" => Ok(Topology::Ring),
            "path" => Ok(Topology::Path),
            _ => Err(format!("Unknown topology: {}", s)),
        }
    }
}

/// How a party process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartyExit {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl PartyExit {
    /// Returns true if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for PartyExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_names() {
        assert_eq!(PartyId(0).name(), "node0");
        assert_eq!(PartyId(12).to_string(), "node12");

        let all = PartyId::all(3);
        assert_eq!(all, vec![PartyId(0), PartyId(1), PartyId(2)]);
    }

    #[test]
    fn test_topology_parse() {
        assert_eq!("complete".parse::<Topology>(), Ok(Topology::Complete));
        assert_eq!("RING".parse::<Topology>(), Ok(Topology::Ring));
        assert_eq!("Path".parse::<Topology>(), Ok(Topology::Path));
        assert!("line".parse::<Topology>().is_err());
        assert!("star".parse::<Topology>().is_err());
        assert_eq!(Topology::default().to_string(), "complete");
    }
}
