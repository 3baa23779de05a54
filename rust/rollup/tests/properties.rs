use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use xane_rollup::{
    BalanceKey, CollectionStore, Felt, Keypair, PairKey, Payload, Record, RollupConfig,
    RollupError, RollupStorage, Signed,
};

const BASE: u64 = 1;
const QUOTE: u64 = 2;

#[derive(Debug, Clone)]
enum Action {
    AddLiquidity { actor: usize, base: u64 },
    RemoveLiquidity { actor: usize, lp_points: u64 },
    Buy { actor: usize, base: u64 },
    Sell { actor: usize, base: u64 },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..3usize, 1..500u64).prop_map(|(actor, base)| Action::AddLiquidity { actor, base }),
        (0..3usize, 1..40_000u64)
            .prop_map(|(actor, lp_points)| Action::RemoveLiquidity { actor, lp_points }),
        (0..3usize, 1..600u64).prop_map(|(actor, base)| Action::Buy { actor, base }),
        (0..3usize, 1..600u64).prop_map(|(actor, base)| Action::Sell { actor, base }),
    ]
}

fn pair() -> PairKey {
    PairKey::new(Felt::from(BASE), Felt::from(QUOTE))
}

fn sign<P: Payload>(storage: &RollupStorage, keypair: &Keypair, payload: P) -> Signed<P> {
    Signed::sign(keypair, storage.state().unwrap(), payload).unwrap()
}

fn setup() -> (RollupStorage, Vec<Keypair>) {
    let mut storage = RollupStorage::empty(RollupConfig::with_height(6)).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let actors: Vec<Keypair> = (0..3).map(|_| Keypair::random(&mut rng)).collect();
    for actor in &actors {
        for token in [BASE, QUOTE] {
            let key = BalanceKey {
                token_id: Felt::from(token),
                owner: actor.address(),
            };
            storage.deposit(&key, 10_000).unwrap();
        }
    }
    let (base, quote) = (Felt::from(BASE), Felt::from(QUOTE));
    let payload = storage
        .prepare_create_pool(actors[0].address(), base, quote, 1000, 2000)
        .unwrap();
    let request = sign(&storage, &actors[0], payload);
    storage.apply_create_pool(&request).unwrap();
    (storage, actors)
}

fn apply(
    storage: &mut RollupStorage,
    actors: &[Keypair],
    action: &Action,
) -> Result<(), RollupError> {
    match *action {
        Action::AddLiquidity { actor, base } => {
            let keypair = &actors[actor];
            let payload =
                storage.prepare_add_liquidity(keypair.address(), &pair(), base, u64::MAX)?;
            let request = sign(storage, keypair, payload);
            storage.apply_add_liquidity(&request).map(|_| ())
        }
        Action::RemoveLiquidity { actor, lp_points } => {
            let keypair = &actors[actor];
            let payload =
                storage.prepare_remove_liquidity(keypair.address(), &pair(), lp_points, 0, 0)?;
            let request = sign(storage, keypair, payload);
            storage.apply_remove_liquidity(&request).map(|_| ())
        }
        Action::Buy { actor, base } => {
            let keypair = &actors[actor];
            let payload = storage.prepare_buy(keypair.address(), &pair(), base, u64::MAX)?;
            let request = sign(storage, keypair, payload);
            storage.apply_buy(&request).map(|_| ())
        }
        Action::Sell { actor, base } => {
            let keypair = &actors[actor];
            let payload = storage.prepare_sell(keypair.address(), &pair(), base, 0)?;
            let request = sign(storage, keypair, payload);
            storage.apply_sell(&request).map(|_| ())
        }
    }
}

fn assert_root_integrity<R: Record>(store: &CollectionStore<R>) {
    for record in store.records() {
        let witness = store.witness_for(&record.key()).unwrap();
        assert_eq!(witness.calculate_root(record.content_hash()), store.root());
    }
}

fn fingerprint(storage: &RollupStorage) -> String {
    format!(
        "{:?}|{:?}|{:?}|{:?}",
        storage.state(),
        storage.balances().records(),
        storage.pools().records(),
        storage.liquidities().records()
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn invariants_hold_across_random_trading(actions in prop::collection::vec(action(), 1..10)) {
        let (mut storage, actors) = setup();
        for action in &actions {
            let before = fingerprint(&storage);
            if apply(&mut storage, &actors, action).is_err() {
                prop_assert_eq!(fingerprint(&storage), before);
            }
            prop_assert!(storage.is_synchronized());

            assert_root_integrity(storage.balances());
            assert_root_integrity(storage.pools());
            assert_root_integrity(storage.liquidities());

            let pool = storage.pools().get(&pair()).unwrap();
            prop_assert_eq!(pool.k, pool.base_token_amount * pool.quote_token_amount);
            let total: u64 = storage
                .liquidities()
                .records()
                .iter()
                .map(|position| position.lp_points)
                .sum();
            prop_assert_eq!(total, pool.lp_points);
        }
    }

    #[test]
    fn restore_rebuilds_identical_roots(amounts in prop::collection::vec(1..1_000u64, 1..20)) {
        let mut storage = RollupStorage::empty(RollupConfig::with_height(6)).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let owner = Keypair::random(&mut rng).address();
        for (token, amount) in amounts.iter().enumerate() {
            let key = BalanceKey { token_id: Felt::from(token as u64), owner };
            storage.deposit(&key, *amount).unwrap();
        }
        let restored = RollupStorage::restore(
            *storage.config(),
            storage.balances().records().to_vec(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        prop_assert_eq!(restored.state().unwrap(), storage.state().unwrap());
    }
}
