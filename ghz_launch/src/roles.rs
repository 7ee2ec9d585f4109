//! Party role assignment.
//!
//! One party is the sender of the anonymous message. When adversaries are
//! requested, the party controlling the GHZ source (always the highest index)
//! is one of them, and the rest are drawn uniformly from the remaining
//! non-sender parties.

use crate::config::write_atomic;
use crate::error::{DomainError, LaunchError};
use crate::security::check_nodes;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Roles chosen for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// The party sending the anonymous message, never the source controller
    pub sender: usize,

    /// Adversarial parties; the source controller first when non-empty
    pub adversaries: Vec<usize>,

    /// Whether the adversary set is pinned so the verifier is never adversarial
    pub honest_verifier: bool,
}

/// The role of a single party, as passed on its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Sender,
    Adversary {
        /// Every adversary in the run, in assignment order
        coalition: Vec<usize>,
        /// Whether adversarial qubits are left out of the GHZ state
        unentangled: bool,
    },
    Honest,
}

impl Role {
    /// Renders the role as command-line words.
    ///
    /// `sender`, `honest`, or `adversary <i-j-k> <0|1>`.
    pub fn token(&self) -> Vec<String> {
        match self {
            Role::Sender => vec!["sender".to_string()],
            Role::Honest => vec!["honest".to_string()],
            Role::Adversary {
                coalition,
                unentangled,
            } => vec![
                "adversary".to_string(),
                coalition
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join("-"),
                u8::from(*unentangled).to_string(),
            ],
        }
    }
}

impl RoleAssignment {
    /// Returns the index of the party controlling the GHZ source.
    pub fn source_controller(n_nodes: usize) -> usize {
        n_nodes - 1
    }

    /// Returns true if `party` is adversarial.
    pub fn is_adversary(&self, party: usize) -> bool {
        self.adversaries.contains(&party)
    }

    /// Returns the role of `party`.
    pub fn role_of(&self, party: usize, unentangled: bool) -> Role {
        if party == self.sender {
            Role::Sender
        } else if self.is_adversary(party) {
            Role::Adversary {
                coalition: self.adversaries.clone(),
                unentangled,
            }
        } else {
            Role::Honest
        }
    }
}

/// Picks the sender and adversary set.
///
/// A pure function of its arguments: the same seeded `rng` always yields the
/// same assignment.
///
/// # Errors
/// `DomainError` if `n_nodes < 2` or more adversaries are requested than the
/// source controller plus the `n_nodes - 2` remaining candidates.
pub fn assign<R: Rng>(
    n_nodes: usize,
    requested_adversaries: usize,
    honest_verifier: bool,
    rng: &mut R,
) -> Result<RoleAssignment, DomainError> {
    check_nodes(n_nodes)?;

    let source = RoleAssignment::source_controller(n_nodes);
    let candidates_available = n_nodes - 2;
    if requested_adversaries > 0 && requested_adversaries - 1 > candidates_available {
        return Err(DomainError::new(
            "adversaries",
            requested_adversaries,
            format!(
                "at most {} adversaries are possible with {} parties (the sender is always honest)",
                candidates_available + 1,
                n_nodes
            ),
        ));
    }

    let sender = rng.gen_range(0..source);

    let mut adversaries = Vec::with_capacity(requested_adversaries);
    if requested_adversaries > 0 {
        adversaries.push(source);

        let candidates: Vec<usize> = (0..n_nodes)
            .filter(|&i| i != sender && i != source)
            .collect();
        adversaries.extend(
            sample(rng, candidates.len(), requested_adversaries - 1)
                .into_iter()
                .map(|slot| candidates[slot]),
        );
    }

    debug!("Assigned sender={} adversaries={:?}", sender, adversaries);

    Ok(RoleAssignment {
        sender,
        adversaries,
        honest_verifier,
    })
}

/// On-disk form of the adversary pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PinFile {
    adversary: Vec<usize>,
}

/// Side file pinning the adversary set in honest-verifier mode.
///
/// Its presence tells the verifier-selection step which parties it must
/// never pick.
pub struct AdversaryPin {
    path: PathBuf,
}

impl AdversaryPin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the pin in honest-verifier mode, removes any stale pin otherwise.
    pub fn sync(&self, assignment: &RoleAssignment) -> Result<(), LaunchError> {
        if assignment.honest_verifier {
            self.write(&assignment.adversaries)?;
            info!("{} file generated", self.path.display());
            Ok(())
        } else {
            self.clear()
        }
    }

    /// Writes `adversaries` to the pin file.
    pub fn write(&self, adversaries: &[usize]) -> Result<(), LaunchError> {
        let pin = PinFile {
            adversary: adversaries.to_vec(),
        };
        let json = serde_json::to_string(&pin).map_err(|source| LaunchError::Json {
            what: "adversary pin",
            source,
        })?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// Removes the pin file if present.
    pub fn clear(&self) -> Result<(), LaunchError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed stale {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LaunchError::io(&self.path, e)),
        }
    }

    /// Reads the pinned adversaries, `None` if no pin exists.
    pub fn load(&self) -> Result<Option<Vec<usize>>, LaunchError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LaunchError::io(&self.path, e)),
        };
        let pin: PinFile = serde_json::from_str(&raw).map_err(|source| LaunchError::Json {
            what: "adversary pin",
            source,
        })?;
        Ok(Some(pin.adversary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn test_no_adversaries() {
        for seed in 0..50 {
            let roles = assign(3, 0, false, &mut rng(seed)).unwrap();
            assert!(roles.adversaries.is_empty());
            assert!(roles.sender <= 1);
        }
    }

    #[test]
    fn test_source_controller_is_first_adversary() {
        let roles = assign(5, 2, true, &mut rng(9)).unwrap();

        assert_eq!(roles.adversaries.len(), 2);
        assert_eq!(roles.adversaries[0], 4);
        assert!(!roles.is_adversary(roles.sender));
    }

    #[test]
    fn test_every_possible_adversary() {
        // 6 parties: source controller + 4 non-sender candidates
        let roles = assign(6, 5, false, &mut rng(3)).unwrap();

        let mut expected: Vec<usize> = (0..6).filter(|&i| i != roles.sender).collect();
        let mut got = roles.adversaries.clone();
        expected.sort_unstable();
        got.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_too_many_adversaries() {
        let err = assign(5, 5, false, &mut rng(1)).unwrap_err();
        assert_eq!(err.field, "adversaries");
        assert_eq!(err.value, "5");

        let err = assign(2, 2, false, &mut rng(1)).unwrap_err();
        assert_eq!(err.field, "adversaries");

        // Two parties: the source controller alone is fine
        let roles = assign(2, 1, false, &mut rng(1)).unwrap();
        assert_eq!(roles.sender, 0);
        assert_eq!(roles.adversaries, vec![1]);
    }

    #[test]
    fn test_too_few_parties() {
        assert_eq!(assign(1, 0, false, &mut rng(1)).unwrap_err().field, "n_nodes");
    }

    #[test]
    fn test_same_seed_same_roles() {
        let a = assign(10, 4, false, &mut rng(77)).unwrap();
        let b = assign(10, 4, false, &mut rng(77)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sender_covers_all_candidates() {
        let senders: HashSet<usize> = (0..200)
            .map(|seed| assign(4, 0, false, &mut rng(seed)).unwrap().sender)
            .collect();
        assert_eq!(senders, HashSet::from([0, 1, 2]));
    }

    #[test]
    fn test_role_tokens() {
        let roles = RoleAssignment {
            sender: 1,
            adversaries: vec![4, 0],
            honest_verifier: false,
        };

        assert_eq!(roles.role_of(1, true).token(), vec!["sender"]);
        assert_eq!(roles.role_of(2, true).token(), vec!["honest"]);
        assert_eq!(roles.role_of(0, true).token(), vec!["adversary", "4-0", "1"]);
        assert_eq!(roles.role_of(4, false).token(), vec!["adversary", "4-0", "0"]);
    }

    #[test]
    fn test_pin_written_in_honest_verifier_mode() {
        let dir = tempdir().unwrap();
        let pin = AdversaryPin::new(dir.path().join("adv.json"));

        let roles = assign(5, 2, true, &mut rng(5)).unwrap();
        pin.sync(&roles).unwrap();

        let pinned = pin.load().unwrap().unwrap();
        assert_eq!(pinned.len(), 2);
        assert!(pinned.contains(&4));
        assert!(!pinned.contains(&roles.sender));

        let raw = fs::read_to_string(pin.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["adversary"], serde_json::json!(roles.adversaries));
    }

    #[test]
    fn test_stale_pin_removed() {
        let dir = tempdir().unwrap();
        let pin = AdversaryPin::new(dir.path().join("adv.json"));
        pin.write(&[4, 2]).unwrap();

        let roles = assign(5, 2, false, &mut rng(5)).unwrap();
        pin.sync(&roles).unwrap();
        assert!(!pin.path().exists());
        assert_eq!(pin.load().unwrap(), None);

        // Clearing twice is fine
        pin.sync(&roles).unwrap();
    }

    proptest! {
        #[test]
        fn prop_assignment_invariants(
            n_nodes in 2usize..40,
            requested_frac in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let max = n_nodes - 1;
            let requested = (requested_frac * max as f64).round() as usize;
            let roles = assign(n_nodes, requested, false, &mut rng(seed)).unwrap();

            prop_assert!(roles.sender <= n_nodes - 2);
            prop_assert!(!roles.adversaries.contains(&roles.sender));
            prop_assert_eq!(roles.adversaries.len(), requested);

            let unique: HashSet<_> = roles.adversaries.iter().collect();
            prop_assert_eq!(unique.len(), roles.adversaries.len());
            prop_assert!(roles.adversaries.iter().all(|&a| a < n_nodes));

            if requested > 0 {
                prop_assert_eq!(roles.adversaries[0], n_nodes - 1);
            }
        }

        #[test]
        fn prop_over_request_rejected(n_nodes in 2usize..40, extra in 1usize..10, seed in any::<u64>()) {
            let result = assign(n_nodes, n_nodes - 1 + extra, false, &mut rng(seed));
            prop_assert!(result.is_err());
        }
    }
}
