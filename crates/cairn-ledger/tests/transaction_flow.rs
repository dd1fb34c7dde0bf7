//! End-to-end transaction flows against the stub ledger
//!
//! These tests drive the public surface the way a wallet would: build a
//! fee-tracked transaction, settle it from a funding coin, and submit it
//! atomically with real signatures checked against real darc rules.

use cairn_core::{Darc, KeyPair};
use cairn_ledger::spawner::ARG_COINS;
use cairn_ledger::testing::StubLedger;
use cairn_ledger::{
    commands, contracts, CredentialTransaction, FeeSchedule, FundingCoin, InstanceId,
    InstructionKind, LedgerClient, LedgerError, UserSkeleton,
};
use std::sync::Arc;

const COSTS: FeeSchedule = FeeSchedule {
    cost_darc: 100,
    cost_coin: 200,
    cost_credential: 300,
    cost_secret_write: 400,
    cost_secret_read: 500,
};

/// A stub ledger plus a funded coin whose darc is signed by `funder`
fn funded_ledger(funder: &KeyPair, balance: u64) -> (Arc<StubLedger>, FundingCoin) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let ledger = Arc::new(StubLedger::new(COSTS));
    let funding_darc = Darc::basic(&[funder.identity()], &[funder.identity()], "funding");
    let coin_instance = InstanceId::derived(contracts::COIN, b"funding");
    ledger.register_darc(&funding_darc);
    ledger.register_coin(coin_instance, funding_darc.base_id(), balance);
    let coin = FundingCoin {
        instance: coin_instance,
        signers: vec![funder.clone()],
    };
    (ledger, coin)
}

#[tokio::test]
async fn spawned_darc_must_be_signed_by_its_controller() {
    let id_a = KeyPair::from_seed([1; 32]);
    let id_b = KeyPair::from_seed([2; 32]);
    let (ledger, coin) = funded_ledger(&id_a, 10_000);

    // Signed by the identity the new darc's sign rule names: accepted.
    let mut tx =
        CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin.clone());
    tx.spawn_darc_basic("sign", &[id_a.identity()]).unwrap();
    tx.send(&[vec![id_a.clone()]], 0).await.unwrap();

    // Same transaction signed by someone else: rejected, and the reason
    // names the unsatisfied sign rule.
    let mut tx = CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin);
    tx.spawn_darc_basic("sign", &[id_a.identity()]).unwrap();
    let err = tx.send(&[vec![id_b]], 0).await.unwrap_err();
    match err {
        LedgerError::Submission { reason } => assert!(
            reason.contains("_sign"),
            "reason should name the sign rule: {reason}"
        ),
        other => panic!("expected a submission error, got {other:?}"),
    }
}

#[tokio::test]
async fn create_user_settles_fees_and_commits_atomically() {
    let device = KeyPair::from_seed([7; 32]);
    let (ledger, coin) = funded_ledger(&device, 10_000);
    let funding_instance = coin.instance;

    let mut tx = CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin);
    let user = UserSkeleton::with_keypair("ada", device);
    let user_coin = tx.create_user(&user, 150).unwrap();

    let expected_cost = 4 * COSTS.cost_darc + COSTS.cost_coin + 150 + COSTS.cost_credential;
    assert_eq!(tx.cost(), expected_cost);

    let (sent, ack) = tx.send_coins(1).await.unwrap();
    assert!(ack.block_index.is_some());

    // The settlement fetch was prepended, drawing the exact total.
    let instructions = sent.instructions();
    assert_eq!(instructions.len(), 7);
    assert_eq!(instructions[0].target, funding_instance);
    assert!(matches!(
        &instructions[0].kind,
        InstructionKind::Invoke { command, .. } if command == commands::FETCH
    ));
    assert_eq!(
        instructions[0].arg(ARG_COINS),
        Some(expected_cost.to_le_bytes().as_slice())
    );

    // Fees left the funding coin; the user's coin was minted at 150.
    assert_eq!(
        ledger.balance(funding_instance),
        Some(10_000 - expected_cost)
    );
    assert_eq!(ledger.balance(user_coin.instance), Some(150));

    // All four darcs exist at their base ids.
    for darc in [
        user.darc_sign(),
        user.darc_device(),
        user.darc_cred(),
        user.darc_coin(),
    ] {
        assert_eq!(
            ledger.darc(darc.base_id()).map(|d| d.version()),
            Some(0)
        );
    }

    // The credential is resolvable at its derived id.
    let cred_instance = InstanceId::derived(contracts::CREDENTIAL, &user.coin_seed());
    let proof = ledger.resolve_proof(cred_instance).await.unwrap();
    assert_eq!(proof.value, user.credential().to_bytes().unwrap());
}

#[tokio::test]
async fn insufficient_funds_rejects_the_whole_unit() {
    let device = KeyPair::from_seed([7; 32]);
    let (ledger, coin) = funded_ledger(&device, 10);

    let mut tx = CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin);
    let user = UserSkeleton::with_keypair("ada", device);
    tx.create_user(&user, 150).unwrap();

    let err = tx.send_coins(0).await.unwrap_err();
    assert!(matches!(err, LedgerError::Submission { .. }));

    // Atomicity: nothing of the rejected unit is visible.
    assert!(ledger.darc(user.darc_sign().base_id()).is_none());
    assert!(ledger.accepted().is_empty());
}

#[tokio::test]
async fn bounded_wait_reports_timeout_distinct_from_rejection() {
    let id_a = KeyPair::from_seed([1; 32]);
    let (ledger, coin) = funded_ledger(&id_a, 10_000);
    ledger.force_timeout(true);

    let mut tx = CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin);
    tx.spawn_darc_basic("sign", &[id_a.identity()]).unwrap();
    let err = tx.send(&[vec![id_a]], 3).await.unwrap_err();
    assert!(matches!(err, LedgerError::Timeout { blocks: 3 }));
}

#[tokio::test]
async fn evolution_is_checked_against_the_previous_version() {
    let owner = KeyPair::from_seed([1; 32]);
    let outsider = KeyPair::from_seed([2; 32]);
    let (ledger, coin) = funded_ledger(&owner, 10_000);

    let darc = Darc::basic(&[owner.identity()], &[owner.identity()], "account");
    ledger.register_darc(&darc);

    // The owner may evolve.
    let mut tx =
        CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin.clone());
    tx.evolve_darc_add_rules(&darc, &[]).unwrap();
    tx.send(&[vec![owner.clone()]], 0).await.unwrap();
    assert_eq!(ledger.darc(darc.base_id()).map(|d| d.version()), Some(1));

    // An outsider may not, and the stale candidate built from version 0
    // is rejected even for the owner.
    let mut tx =
        CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin.clone());
    tx.evolve_darc_add_rules(&darc, &[]).unwrap();
    let err = tx.send(&[vec![outsider]], 0).await.unwrap_err();
    assert!(matches!(err, LedgerError::Submission { .. }));

    let mut tx = CredentialTransaction::new(ledger.clone(), ledger.spawner_handle(), coin);
    tx.evolve_darc_add_rules(&darc, &[]).unwrap();
    let err = tx.send(&[vec![owner]], 0).await.unwrap_err();
    match err {
        LedgerError::Submission { reason } => {
            assert!(reason.contains("stale"), "unexpected reason: {reason}")
        }
        other => panic!("expected a submission error, got {other:?}"),
    }
}
