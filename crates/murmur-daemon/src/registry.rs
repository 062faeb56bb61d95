//! Group registry: one membership tree per group, mutated only by
//! applying log entries in order.
//!
//! Writes go through a single owner (EventSync); readers take
//! copy-on-read snapshots so a leaf set is never matched against a
//! stale or half-updated root.

use murmur_crypto::merkle::MerkleTree;
use murmur_types::{
    GroupEvent, GroupId, GroupName, LogEntry, MerkleRoot, MurmurError, MurmurResult,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How many historical roots each group retains for the verifier's
/// root-acceptance window.
pub const MAX_RECENT_ROOTS: usize = 256;

struct Group {
    name: GroupName,
    tree: MerkleTree,
    recent_roots: VecDeque<MerkleRoot>,
}

impl Group {
    fn new(name: GroupName, depth: usize) -> Self {
        let tree = MerkleTree::new(depth);
        let mut recent_roots = VecDeque::new();
        recent_roots.push_back(tree.root());
        Self {
            name,
            tree,
            recent_roots,
        }
    }

    fn record_root(&mut self) {
        self.recent_roots.push_back(self.tree.root());
        if self.recent_roots.len() > MAX_RECENT_ROOTS {
            self.recent_roots.pop_front();
        }
    }
}

/// Consistent read view of one group, detached from registry writes.
#[derive(Clone)]
pub struct GroupSnapshot {
    pub id: GroupId,
    pub name: GroupName,
    /// Registry version at snapshot time; bumps once per applied event.
    pub version: u64,
    pub tree: MerkleTree,
}

impl GroupSnapshot {
    pub fn root(&self) -> MerkleRoot {
        self.tree.root()
    }

    pub fn member_count(&self) -> usize {
        self.tree.len()
    }
}

/// Registry state: a pure function of the applied event sequence.
pub struct GroupRegistry {
    depth: usize,
    groups: HashMap<GroupId, Group>,
    /// Sequence of the last applied log entry; 0 before genesis.
    applied: u64,
    version: u64,
}

pub type SharedRegistry = Arc<RwLock<GroupRegistry>>;

impl GroupRegistry {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            groups: HashMap::new(),
            applied: 0,
            version: 0,
        }
    }

    pub fn shared(depth: usize) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(depth)))
    }

    /// Apply one log entry. Entries at or below the applied cursor are
    /// skipped (at-least-once delivery after resubscription).
    pub fn apply(&mut self, entry: &LogEntry) -> MurmurResult<()> {
        if entry.sequence <= self.applied {
            debug!(sequence = entry.sequence, "Skipping already-applied entry");
            return Ok(());
        }

        match &entry.event {
            GroupEvent::GroupCreated { id, name } => {
                if self.groups.contains_key(id) {
                    return Err(MurmurError::DuplicateGroup(*id));
                }
                self.groups.insert(*id, Group::new(name.clone(), self.depth));
                info!(group = %id, name = %name, "Group created");
            }
            GroupEvent::MemberAdded {
                group_id,
                index,
                commitment,
            } => {
                let group = self
                    .groups
                    .get_mut(group_id)
                    .ok_or(MurmurError::UnknownGroup(*group_id))?;

                // The log is expected to be self-consistent; a declared
                // index that disagrees with the slot we would assign
                // means the stream cannot be trusted. Checked before
                // mutation so the tree stays intact.
                let assigned = group.tree.len();
                if *index != assigned {
                    warn!(
                        group = %group_id,
                        declared = index,
                        assigned,
                        "Event log index mismatch"
                    );
                    return Err(MurmurError::EventLogInconsistent {
                        group: *group_id,
                        declared: *index,
                        assigned,
                    });
                }

                group.tree.insert_bytes(commitment.as_bytes())?;
                group.record_root();
                debug!(group = %group_id, index, "Member added");
            }
        }

        self.applied = entry.sequence;
        self.version += 1;
        Ok(())
    }

    pub fn snapshot(&self, id: GroupId) -> MurmurResult<GroupSnapshot> {
        let group = self.groups.get(&id).ok_or(MurmurError::UnknownGroup(id))?;
        Ok(GroupSnapshot {
            id,
            name: group.name.clone(),
            version: self.version,
            tree: group.tree.clone(),
        })
    }

    /// Whether `root` is the group's current root or one of its last
    /// [`MAX_RECENT_ROOTS`] historical roots.
    pub fn is_root_accepted(&self, id: GroupId, root: &MerkleRoot) -> MurmurResult<bool> {
        let group = self.groups.get(&id).ok_or(MurmurError::UnknownGroup(id))?;
        Ok(group.recent_roots.iter().any(|r| r == root))
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn last_applied(&self) -> u64 {
        self.applied
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Teardown to genesis state. The next sync pass rebuilds
    /// everything from the log.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.applied = 0;
        self.version = 0;
        info!("Registry reset to genesis");
    }
}
