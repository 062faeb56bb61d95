//! End-to-end: event log -> sync -> registry -> proof -> verifier.

use murmur_crypto::hash_to_field_bytes;
use murmur_crypto::identity::Identity;
use murmur_crypto::zk::MembershipProver;
use murmur_daemon::log::{EventLog, MemoryEventLog};
use murmur_daemon::prover::ProofEngine;
use murmur_daemon::registry::GroupRegistry;
use murmur_daemon::signal::RejectReason;
use murmur_daemon::storage::SignalStorage;
use murmur_daemon::sync::EventSync;
use murmur_daemon::verifier::SignalVerifier;
use murmur_types::{Commitment, ExternalNullifier, GroupAction, GroupId, GroupName};
use std::sync::Arc;
use std::time::Duration;

const TEST_DEPTH: usize = 4;

async fn synced_registry(
    log: Arc<MemoryEventLog>,
) -> (murmur_daemon::registry::SharedRegistry, Arc<SignalStorage>) {
    let registry = GroupRegistry::shared(TEST_DEPTH);
    let storage = Arc::new(SignalStorage::in_memory().unwrap());
    let sync = EventSync::new(registry.clone(), log, storage.clone());
    sync.catch_up(Duration::from_millis(50)).await.unwrap();
    (registry, storage)
}

#[tokio::test]
async fn login_accepted_once_then_replay_rejected() {
    let log = Arc::new(MemoryEventLog::new());

    // Group with identity A's commitment at index 2.
    log.submit(GroupAction::CreateGroup {
        name: GroupName::new("devcon").unwrap(),
    })
    .await
    .unwrap();

    let identity = Identity::generate();
    for commitment in [
        Commitment::from_bytes([0x11; 32]),
        Commitment::from_bytes([0x22; 32]),
        identity.commitment(),
    ] {
        log.submit(GroupAction::AddMember {
            group_id: GroupId(1),
            commitment,
        })
        .await
        .unwrap();
    }

    let (registry, storage) = synced_registry(log).await;
    let snapshot = registry.read().await.snapshot(GroupId(1)).unwrap();
    assert_eq!(snapshot.tree.index_of_bytes(identity.commitment().as_bytes()), Some(2));

    let (prover, membership_verifier) = MembershipProver::setup(TEST_DEPTH).unwrap();
    let engine = ProofEngine::new(Arc::new(prover));
    let verifier = SignalVerifier::new(registry.clone(), membership_verifier, storage).unwrap();

    let scope = ExternalNullifier::from_bytes(hash_to_field_bytes(b"login"));
    let proof = engine
        .generate(&identity, &snapshot, scope, b"login".to_vec())
        .await
        .unwrap();

    let first = verifier.verify(GroupId(1), &proof).await.unwrap();
    assert!(first.accepted);

    // Second call with identical arguments reproduces the same
    // nullifier hash and must be rejected.
    let again = engine
        .generate(&identity, &snapshot, scope, b"login".to_vec())
        .await
        .unwrap();
    assert_eq!(again.nullifier_hash, proof.nullifier_hash);

    let second = verifier.verify(GroupId(1), &again).await.unwrap();
    assert!(!second.accepted);
    assert_eq!(second.reason, Some(RejectReason::NullifierAlreadyUsed));
}

#[tokio::test]
async fn outsider_fails_before_proving() {
    let log = Arc::new(MemoryEventLog::new());
    log.submit(GroupAction::CreateGroup {
        name: GroupName::new("devcon").unwrap(),
    })
    .await
    .unwrap();
    log.submit(GroupAction::AddMember {
        group_id: GroupId(1),
        commitment: Commitment::from_bytes([0x11; 32]),
    })
    .await
    .unwrap();

    let (registry, _) = synced_registry(log).await;
    let snapshot = registry.read().await.snapshot(GroupId(1)).unwrap();

    let (prover, _) = MembershipProver::setup(TEST_DEPTH).unwrap();
    let engine = ProofEngine::new(Arc::new(prover));

    let err = engine
        .generate(
            &Identity::generate(),
            &snapshot,
            ExternalNullifier::from_bytes([0x01; 32]),
            b"login".to_vec(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, murmur_types::MurmurError::MemberNotFound));
}

#[tokio::test]
async fn full_replay_reproduces_live_state() {
    let log = Arc::new(MemoryEventLog::new());
    log.submit(GroupAction::CreateGroup {
        name: GroupName::new("alpha").unwrap(),
    })
    .await
    .unwrap();
    log.submit(GroupAction::CreateGroup {
        name: GroupName::new("beta").unwrap(),
    })
    .await
    .unwrap();
    for byte in 0x10u8..0x18 {
        let group = if byte % 2 == 0 { GroupId(1) } else { GroupId(2) };
        log.submit(GroupAction::AddMember {
            group_id: group,
            commitment: Commitment::from_bytes([byte; 32]),
        })
        .await
        .unwrap();
    }

    let (live, _) = synced_registry(log.clone()).await;
    let (replayed, _) = synced_registry(log).await;

    let live = live.read().await;
    let replayed = replayed.read().await;
    assert_eq!(live.group_ids(), replayed.group_ids());
    for id in live.group_ids() {
        assert_eq!(
            live.snapshot(id).unwrap().root(),
            replayed.snapshot(id).unwrap().root()
        );
    }
}

#[tokio::test]
async fn multiple_groups_are_independent() {
    let log = Arc::new(MemoryEventLog::new());
    log.submit(GroupAction::CreateGroup {
        name: GroupName::new("alpha").unwrap(),
    })
    .await
    .unwrap();
    log.submit(GroupAction::CreateGroup {
        name: GroupName::new("beta").unwrap(),
    })
    .await
    .unwrap();
    log.submit(GroupAction::AddMember {
        group_id: GroupId(1),
        commitment: Commitment::from_bytes([0x11; 32]),
    })
    .await
    .unwrap();

    let (registry, _) = synced_registry(log).await;
    let registry = registry.read().await;

    let alpha = registry.snapshot(GroupId(1)).unwrap();
    let beta = registry.snapshot(GroupId(2)).unwrap();
    assert_eq!(alpha.member_count(), 1);
    assert_eq!(beta.member_count(), 0);
    assert_ne!(alpha.root(), beta.root());
}
