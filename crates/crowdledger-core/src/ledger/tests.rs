use serde_json::json;

use super::*;
use crate::contracts::{campaign_manager, gas_lot};
use crate::crypto::Keypair;
use crate::tx::Transaction;

const CHAIN_ID: u64 = 31337;

struct Harness {
    ledger: LedgerState,
    deployer: Keypair,
    donor: Keypair,
}

impl Harness {
    fn new() -> Self {
        let deployer = Keypair::generate();
        let donor = Keypair::generate();
        let genesis = Genesis::new(CHAIN_ID)
            .fund(deployer.address(), 1_000_000)
            .fund(donor.address(), 5_000);
        Self {
            ledger: LedgerState::new(&genesis),
            deployer,
            donor,
        }
    }

    fn send(&mut self, key: &Keypair, value: Amount, action: TxAction, timestamp: u64) -> Result<Receipt, LedgerError> {
        let tx = Transaction {
            chain_id: CHAIN_ID,
            from: key.address(),
            nonce: self.ledger.nonce(&key.address()),
            value,
            action,
        };
        let signed = tx.sign(key).unwrap();
        self.ledger.submit(&signed, timestamp)
    }

    fn deploy_manager(&mut self) -> Address {
        let deployer = self.deployer.clone();
        let receipt = self
            .send(
                &deployer,
                0,
                TxAction::Deploy {
                    contract: campaign_manager::NAME.into(),
                    args: Value::Null,
                },
                10,
            )
            .unwrap();
        assert!(receipt.is_success());
        receipt.contract_address.unwrap()
    }

    fn create_campaign(&mut self, manager: Address, deadline: u64, timestamp: u64) -> Receipt {
        let deployer = self.deployer.clone();
        self.send(
            &deployer,
            0,
            TxAction::Call {
                to: manager,
                method: campaign_manager::CREATE_CAMPAIGN.into(),
                args: json!({
                    "owner": deployer.address(),
                    "title": "Library",
                    "description": "Books for the school",
                    "target": "10000",
                    "deadline": deadline,
                    "image": "ipfs://bafy",
                }),
            },
            timestamp,
        )
        .unwrap()
    }
}

#[test]
fn genesis_funds_accounts_and_seals_block_zero() {
    let h = Harness::new();
    assert_eq!(h.ledger.height(), 0);
    assert_eq!(h.ledger.balance(&h.deployer.address()), 1_000_000);
    assert_eq!(h.ledger.balance(&h.donor.address()), 5_000);
    assert_eq!(h.ledger.head().parent_hash, [0u8; 32]);
}

#[test]
fn state_root_is_deterministic() {
    let h = Harness::new();
    assert_eq!(h.ledger.state_root(), h.ledger.state_root());
    assert_eq!(h.ledger.state_root(), h.ledger.head().state_root);
}

#[test]
fn each_transaction_mines_a_block() {
    let mut h = Harness::new();
    let manager = h.deploy_manager();
    assert_eq!(h.ledger.height(), 1);
    assert_eq!(h.ledger.contract(&manager).unwrap().block_number, 1);
    let receipt = h.create_campaign(manager, 1_000, 20);
    assert_eq!(receipt.block_number, 2);
    assert_eq!(h.ledger.block(2).unwrap().parent_hash, h.ledger.block(1).unwrap().hash);
    assert_eq!(h.ledger.receipt(&receipt.tx_hash), Some(&receipt));
}

#[test]
fn donation_moves_value_to_owner_and_updates_campaign() {
    let mut h = Harness::new();
    let manager = h.deploy_manager();
    h.create_campaign(manager, 1_000, 20);
    let owner_before = h.ledger.balance(&h.deployer.address());

    let donor = h.donor.clone();
    let receipt = h
        .send(
            &donor,
            1_200,
            TxAction::Call {
                to: manager,
                method: campaign_manager::DONATE_TO_CAMPAIGN.into(),
                args: json!({ "id": 0 }),
            },
            30,
        )
        .unwrap();
    assert!(receipt.is_success());
    assert!(receipt
        .events
        .iter()
        .any(|e| matches!(e, Event::DonationReceived { amount: 1_200, .. })));

    assert_eq!(h.ledger.balance(&donor.address()), 3_800);
    assert_eq!(h.ledger.balance(&h.deployer.address()), owner_before + 1_200);
    assert_eq!(h.ledger.balance(&manager), 0);

    let campaign = h
        .ledger
        .call_view(&manager, campaign_manager::GET_CAMPAIGN, &json!({ "id": 0 }))
        .unwrap();
    assert_eq!(campaign["amount_collected"], "1200");
}

#[test]
fn reverted_call_is_mined_but_moves_nothing() {
    let mut h = Harness::new();
    let manager = h.deploy_manager();
    h.create_campaign(manager, 1_000, 20);

    let donor = h.donor.clone();
    let receipt = h
        .send(
            &donor,
            100,
            TxAction::Call {
                to: manager,
                method: campaign_manager::DONATE_TO_CAMPAIGN.into(),
                args: json!({ "id": 0 }),
            },
            5_000,
        )
        .unwrap();
    match &receipt.status {
        ReceiptStatus::Reverted { reason } => assert!(reason.contains("ended")),
        other => panic!("expected revert, got {other:?}"),
    }
    assert_eq!(h.ledger.balance(&donor.address()), 5_000);
    assert_eq!(h.ledger.nonce(&donor.address()), 1);
    assert!(receipt.events.is_empty());
}

#[test]
fn admission_failures_do_not_mine() {
    let mut h = Harness::new();
    let donor = h.donor.clone();
    let deployer_addr = h.deployer.address();

    let err = h
        .send(&donor, 6_000, TxAction::Transfer { to: deployer_addr }, 5)
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { needed: 6_000, .. }));

    let stale = Transaction {
        chain_id: CHAIN_ID,
        from: donor.address(),
        nonce: 9,
        value: 1,
        action: TxAction::Transfer { to: deployer_addr },
    }
    .sign(&donor)
    .unwrap();
    assert!(matches!(
        h.ledger.submit(&stale, 5).unwrap_err(),
        LedgerError::NonceMismatch { expected: 0, actual: 9, .. }
    ));

    let foreign_chain = Transaction {
        chain_id: 1,
        from: donor.address(),
        nonce: 0,
        value: 1,
        action: TxAction::Transfer { to: deployer_addr },
    }
    .sign(&donor)
    .unwrap();
    assert!(matches!(
        h.ledger.submit(&foreign_chain, 5).unwrap_err(),
        LedgerError::ChainIdMismatch { .. }
    ));

    assert_eq!(h.ledger.height(), 0);
    assert_eq!(h.ledger.nonce(&donor.address()), 0);
}

#[test]
fn replayed_transaction_is_rejected() {
    let mut h = Harness::new();
    let donor = h.donor.clone();
    let signed = Transaction {
        chain_id: CHAIN_ID,
        from: donor.address(),
        nonce: 0,
        value: 10,
        action: TxAction::Transfer {
            to: h.deployer.address(),
        },
    }
    .sign(&donor)
    .unwrap();
    h.ledger.submit(&signed, 1).unwrap();
    assert_eq!(
        h.ledger.submit(&signed, 2).unwrap_err(),
        LedgerError::DuplicateTransaction
    );
}

#[test]
fn gas_lot_receives_manager_address_and_verifies_source() {
    let mut h = Harness::new();
    let manager = h.deploy_manager();
    let deployer = h.deployer.clone();
    let args = json!({ "governor": manager });
    let receipt = h
        .send(
            &deployer,
            0,
            TxAction::Deploy {
                contract: gas_lot::NAME.into(),
                args: args.clone(),
            },
            11,
        )
        .unwrap();
    let lot = receipt.contract_address.unwrap();
    assert_ne!(lot, manager);
    assert_eq!(
        h.ledger.call_view(&lot, gas_lot::GOVERNOR, &Value::Null).unwrap(),
        json!(manager.to_string())
    );

    let code_hash = gas_lot::abi().code_hash();
    h.ledger.verify_source(&lot, gas_lot::NAME, &code_hash, &args).unwrap();
    assert!(matches!(
        h.ledger
            .verify_source(&lot, gas_lot::NAME, &code_hash, &json!({ "governor": lot })),
        Err(LedgerError::SourceMismatch(_))
    ));
    assert!(matches!(
        h.ledger
            .verify_source(&lot, campaign_manager::NAME, &code_hash, &args),
        Err(LedgerError::SourceMismatch(_))
    ));
    h.ledger
        .verify_source(&manager, campaign_manager::NAME, &campaign_manager::abi().code_hash(), &Value::Null)
        .unwrap();
}

#[test]
fn views_and_transactions_are_not_interchangeable() {
    let mut h = Harness::new();
    let manager = h.deploy_manager();
    assert!(matches!(
        h.ledger.call_view(&manager, campaign_manager::CREATE_CAMPAIGN, &Value::Null),
        Err(LedgerError::Reverted(_))
    ));
    let deployer = h.deployer.clone();
    let receipt = h
        .send(
            &deployer,
            0,
            TxAction::Call {
                to: manager,
                method: campaign_manager::NUMBER_OF_CAMPAIGNS.into(),
                args: Value::Null,
            },
            12,
        )
        .unwrap();
    assert!(!receipt.is_success());
}

#[test]
fn unknown_contract_type_reverts() {
    let mut h = Harness::new();
    let deployer = h.deployer.clone();
    let receipt = h
        .send(
            &deployer,
            0,
            TxAction::Deploy {
                contract: "Token".into(),
                args: Value::Null,
            },
            1,
        )
        .unwrap();
    assert!(!receipt.is_success());
    assert!(receipt.contract_address.is_none());
}

#[test]
fn block_timestamps_never_go_backwards() {
    let mut h = Harness::new();
    h.ledger.mine_empty(100);
    let head = h.ledger.mine_empty(50).clone();
    assert_eq!(head.timestamp, 100);
    assert_eq!(head.number, 2);
}

#[test]
fn mutations_apply_atomically() {
    let mut h = Harness::new();
    let a = h.deployer.address();
    let b = h.donor.address();
    let err = h
        .ledger
        .apply_mutations(&[
            LedgerMutation::Transfer { from: a, to: b, amount: 10 },
            LedgerMutation::Transfer { from: b, to: a, amount: 1_000_000 },
        ])
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(h.ledger.balance(&b), 5_000);
    h.ledger
        .apply_mutations(&[LedgerMutation::Transfer { from: a, to: b, amount: 1 }])
        .unwrap();
    assert_eq!(h.ledger.balance(&b), 5_001);
}

#[test]
fn crediting_past_the_maximum_balance_fails_atomically() {
    let mut h = Harness::new();
    let a = h.deployer.address();
    let whale = Keypair::generate().address();
    h.ledger = LedgerState::new(
        &Genesis::new(CHAIN_ID)
            .fund(a, 1_000_000)
            .fund(h.donor.address(), 5_000)
            .fund(whale, Amount::MAX),
    );

    let err = h
        .ledger
        .apply_mutations(&[LedgerMutation::Transfer { from: a, to: whale, amount: 10 }])
        .unwrap_err();
    assert_eq!(err, LedgerError::BalanceOverflow { account: whale });
    assert_eq!(h.ledger.balance(&a), 1_000_000);
    assert_eq!(h.ledger.balance(&whale), Amount::MAX);

    let deployer = h.deployer.clone();
    let receipt = h
        .send(&deployer, 10, TxAction::Transfer { to: whale }, 5)
        .unwrap();
    assert!(!receipt.is_success());
    assert_eq!(h.ledger.balance(&a), 1_000_000);
    assert_eq!(h.ledger.balance(&whale), Amount::MAX);
    assert_eq!(h.ledger.nonce(&a), 1);
}
