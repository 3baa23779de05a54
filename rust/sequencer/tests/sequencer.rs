use std::path::Path;
use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use xane_rollup::{
    BalanceKey, Felt, Keypair, PairKey, Payload, PositionKey, RollupConfig, RollupError,
    RollupStorage, Signed, TreeKind, EMPTY_LEAF,
};
use xane_sequencer::{Sequencer, SequencerConfig, SequencerError, Snapshot, SnapshotError};

const BASE: u64 = 1;
const QUOTE: u64 = 2;

fn config(dir: &Path) -> SequencerConfig {
    SequencerConfig {
        rollup: RollupConfig::with_height(8),
        snapshot_path: dir.join("snapshot.json"),
        log_filter: "info".to_string(),
    }
}

fn keypair(seed: u64) -> Keypair {
    Keypair::random(&mut StdRng::seed_from_u64(seed))
}

fn pair() -> PairKey {
    PairKey::new(Felt::from(BASE), Felt::from(QUOTE))
}

fn key(token: u64, owner: &Keypair) -> BalanceKey {
    BalanceKey {
        token_id: Felt::from(token),
        owner: owner.address(),
    }
}

fn sign<P: Payload>(sequencer: &Sequencer, keypair: &Keypair, payload: P) -> Signed<P> {
    Signed::sign(keypair, &sequencer.state().unwrap(), payload).unwrap()
}

/// Alice seeds a 1000/2000 pool; Bob holds quote tokens only.
fn trading_sequencer(dir: &Path) -> (Sequencer, Keypair, Keypair) {
    let sequencer = Sequencer::open(&config(dir)).unwrap();
    let (alice, bob) = (keypair(1), keypair(2));
    sequencer.deposit(&key(BASE, &alice), 5000).unwrap();
    sequencer.deposit(&key(QUOTE, &alice), 5000).unwrap();
    sequencer.deposit(&key(QUOTE, &bob), 1000).unwrap();

    let payload = sequencer
        .prepare_create_pool(alice.address(), Felt::from(BASE), Felt::from(QUOTE), 1000, 2000)
        .unwrap();
    let request = sign(&sequencer, &alice, payload);
    sequencer.create_pool(&request).unwrap();
    (sequencer, alice, bob)
}

#[test]
fn opens_empty_without_snapshot() {
    let dir = TempDir::new().unwrap();
    let sequencer = Sequencer::open(&config(dir.path())).unwrap();
    let empty = RollupStorage::empty(RollupConfig::with_height(8)).unwrap();
    assert_eq!(sequencer.state().unwrap(), *empty.state().unwrap());
    assert_eq!(sequencer.balance(&key(BASE, &keypair(1))).unwrap().amount, 0);
    assert!(sequencer.pool(&pair()).is_err());
    assert!(!dir.path().join("snapshot.json").exists());
}

#[test]
fn saved_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let (sequencer, alice, bob) = trading_sequencer(dir.path());

    let payload = sequencer.prepare_buy(bob.address(), &pair(), 100, 222).unwrap();
    let request = sign(&sequencer, &bob, payload);
    let outcome = sequencer.buy(&request).unwrap();
    assert_eq!(outcome.quote_token_amount, 222);
    sequencer.save().unwrap();

    let reopened = Sequencer::open(&config(dir.path())).unwrap();
    assert_eq!(reopened.state().unwrap(), sequencer.state().unwrap());
    assert_eq!(reopened.commitment().unwrap(), sequencer.commitment().unwrap());

    let pool = reopened.pool(&pair()).unwrap();
    assert_eq!(pool.base_token_amount, 900);
    assert_eq!(pool.quote_token_amount, 2222);
    assert_eq!(reopened.balance(&key(BASE, &bob)).unwrap().amount, 100);
    assert_eq!(reopened.balance(&key(QUOTE, &bob)).unwrap().amount, 778);
    let position = PositionKey {
        base_token_id: Felt::from(BASE),
        quote_token_id: Felt::from(QUOTE),
        provider: alice.address(),
    };
    assert_eq!(reopened.position(&position).unwrap().lp_points, pool.lp_points);

    // The restored stores keep producing valid witnesses.
    let payload = reopened.prepare_sell(bob.address(), &pair(), 50, 0).unwrap();
    let request = sign(&reopened, &bob, payload);
    reopened.sell(&request).unwrap();
}

#[test]
fn refuses_tampered_snapshot() {
    let dir = TempDir::new().unwrap();
    let (sequencer, _, _) = trading_sequencer(dir.path());
    sequencer.save().unwrap();

    let path = sequencer.snapshot_path().to_path_buf();
    let mut snapshot = Snapshot::load(&path).unwrap();
    snapshot.balances[0].amount = "4999".to_string();
    snapshot.save(&path).unwrap();

    assert!(matches!(
        Sequencer::open(&config(dir.path())),
        Err(SequencerError::Snapshot(SnapshotError::RootMismatch {
            tree: TreeKind::Balances
        }))
    ));
}

#[test]
fn rejected_transitions_leave_state_untouched() {
    let dir = TempDir::new().unwrap();
    let (sequencer, _, bob) = trading_sequencer(dir.path());
    let before = sequencer.snapshot().unwrap();

    let payload = sequencer.prepare_buy(bob.address(), &pair(), 100, 221).unwrap();
    let request = sign(&sequencer, &bob, payload);
    assert!(matches!(
        sequencer.buy(&request),
        Err(SequencerError::Rollup(RollupError::LimitExceeded))
    ));
    assert!(matches!(
        sequencer.withdraw(&key(BASE, &bob), 1),
        Err(SequencerError::Rollup(RollupError::Store(_)))
    ));
    assert_eq!(sequencer.snapshot().unwrap(), before);
}

#[test]
fn stale_request_is_rejected_after_commit() {
    let dir = TempDir::new().unwrap();
    let (sequencer, _, bob) = trading_sequencer(dir.path());

    let first = sequencer.prepare_buy(bob.address(), &pair(), 10, 1000).unwrap();
    let second = sequencer.prepare_buy(bob.address(), &pair(), 10, 1000).unwrap();
    let first = sign(&sequencer, &bob, first);
    let second = sign(&sequencer, &bob, second);

    sequencer.buy(&first).unwrap();
    assert!(matches!(
        sequencer.buy(&second),
        Err(SequencerError::Rollup(RollupError::RootMismatch {
            tree: TreeKind::Balances
        }))
    ));
}

#[test]
fn concurrent_readers_see_committed_state() {
    let dir = TempDir::new().unwrap();
    let (sequencer, _, bob) = trading_sequencer(dir.path());
    let expected = sequencer.state().unwrap();

    thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let state = sequencer.state().unwrap();
                    let pool = sequencer.pool(&pair()).unwrap();
                    (state, pool.k)
                })
            })
            .collect();
        for reader in readers {
            let (state, k) = reader.join().unwrap();
            assert_eq!(state, expected);
            assert_eq!(k, 2_000_000);
        }
    });

    sequencer.deposit(&key(BASE, &bob), 5).unwrap();
    let after = sequencer.state().unwrap();
    assert_ne!(after.balances_root, expected.balances_root);
    assert_eq!(after.pools_root, expected.pools_root);
    assert_ne!(after.pools_root, EMPTY_LEAF);
}

#[test]
fn in_memory_snapshot_matches_saved_file() {
    let dir = TempDir::new().unwrap();
    let (sequencer, _, _) = trading_sequencer(dir.path());
    let snapshot = sequencer.snapshot().unwrap();
    assert_eq!(snapshot.balances.len(), 3);
    assert_eq!(snapshot.pools.len(), 1);
    assert_eq!(snapshot.liquidities.len(), 1);

    sequencer.save().unwrap();
    assert_eq!(Snapshot::load(sequencer.snapshot_path()).unwrap(), snapshot);
}
