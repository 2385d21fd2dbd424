use std::sync::Arc;

use crowdledger::deploy::{DeployOptions, Deployer};
use crowdledger::node::{lock, ManualClock, Node, SharedNode};
use crowdledger::{CampaignGateway, GatewayError, HttpTransport, LocalTransport, NewCampaign, RpcClient};
use crowdledger_core::ledger::Genesis;
use crowdledger_core::units::parse_units;
use crowdledger_core::{Address, Amount, Keypair};

const START: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

struct Fixture {
    node: SharedNode,
    clock: ManualClock,
    manager: Address,
    owner: Keypair,
    donor: Keypair,
    artifacts: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let owner = Keypair::generate();
        let donor = Keypair::generate();
        let clock = ManualClock::new(START);
        let mut genesis = Genesis::new(7)
            .fund(owner.address(), units("5"))
            .fund(donor.address(), units("3"));
        genesis.timestamp = START;
        let node = Node::new(&genesis, Arc::new(clock.clone())).into_shared();

        let artifacts = tempfile::tempdir().unwrap();
        let client = RpcClient::new(LocalTransport::new(node.clone()));
        let mut options = DeployOptions::new("test", artifacts.path());
        options.confirmations = 0;
        let report = Deployer::new(&client, &owner, options).run().unwrap();

        Self {
            node,
            clock,
            manager: report.manager.address,
            owner,
            donor,
            artifacts,
        }
    }

    fn gateway(&self, signer: Option<&Keypair>) -> CampaignGateway<LocalTransport> {
        let client = RpcClient::new(LocalTransport::new(self.node.clone()));
        let gateway = CampaignGateway::new(client, self.manager);
        match signer {
            Some(key) => gateway.with_signer(key.clone()),
            None => gateway,
        }
    }

    fn create(&self, title: &str, target: &str) -> u64 {
        self.gateway(Some(&self.owner))
            .create_campaign(&campaign(title, target, START + 30 * DAY))
            .unwrap()
            .value
    }
}

fn units(value: &str) -> Amount {
    parse_units(value).unwrap()
}

fn campaign(title: &str, target: &str, deadline: u64) -> NewCampaign {
    NewCampaign {
        title: title.into(),
        description: format!("{title} description"),
        target: units(target),
        deadline,
        image: "ipfs://bafybeigdyrzt".into(),
    }
}

#[test]
fn created_campaign_is_listed_with_nothing_collected() {
    let fx = Fixture::new();
    let id = fx.create("Well", "2");
    assert_eq!(id, 0);

    let reader = fx.gateway(None);
    let campaigns = reader.list_campaigns(0, 20).unwrap();
    assert_eq!(campaigns.len(), 1);
    let listed = &campaigns[0];
    assert_eq!(listed.owner, fx.owner.address());
    assert_eq!(listed.title, "Well");
    assert_eq!(listed.target, units("2"));
    assert_eq!(listed.amount_collected, 0);
    assert_eq!(reader.campaign_count().unwrap(), 1);
}

#[test]
fn listing_is_ordered_and_clamped() {
    let fx = Fixture::new();
    for title in ["A", "B", "C"] {
        fx.create(title, "1");
    }
    let reader = fx.gateway(None);
    let titles: Vec<String> = reader
        .list_campaigns(1, 20)
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(titles, ["B", "C"]);
    assert!(reader.list_campaigns(5, 20).unwrap().is_empty());
}

#[test]
fn donation_increases_total_and_pays_the_owner() {
    let fx = Fixture::new();
    let id = fx.create("Library", "2");
    let reader = fx.gateway(None);
    let owner_before = reader.balance(&fx.owner.address()).unwrap();
    let donor_before = reader.balance(&fx.donor.address()).unwrap();

    let donated = fx.gateway(Some(&fx.donor)).donate(id, units("0.75")).unwrap();
    assert_eq!(donated.value, units("0.75"));

    let after = reader.campaign(id).unwrap();
    assert_eq!(after.amount_collected, units("0.75"));
    assert_eq!(reader.balance(&fx.owner.address()).unwrap(), owner_before + units("0.75"));
    assert_eq!(reader.balance(&fx.donor.address()).unwrap(), donor_before - units("0.75"));

    let donations = reader.donations(id).unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].donor, fx.donor.address());
    assert_eq!(donations[0].amount, units("0.75"));
}

#[test]
fn donation_beyond_balance_is_insufficient_funds() {
    let fx = Fixture::new();
    let id = fx.create("Bridge", "100");
    let height = lock(&fx.node).ledger().height();

    let err = fx.gateway(Some(&fx.donor)).donate(id, units("50")).unwrap_err();
    assert!(matches!(err, GatewayError::InsufficientFunds { .. }), "{err:?}");
    assert_eq!(lock(&fx.node).ledger().height(), height);
    assert_eq!(fx.gateway(None).campaign(id).unwrap().amount_collected, 0);
}

#[test]
fn writes_without_a_signer_are_refused() {
    let fx = Fixture::new();
    let id = fx.create("Garden", "1");
    let reader = fx.gateway(None);

    assert!(matches!(reader.donate(id, units("1")), Err(GatewayError::MissingSigner)));
    assert!(matches!(
        reader.create_campaign(&campaign("Other", "1", START + DAY)),
        Err(GatewayError::MissingSigner)
    ));
}

#[test]
fn invalid_fields_never_reach_the_node() {
    let fx = Fixture::new();
    let gateway = fx.gateway(Some(&fx.owner));
    let height = lock(&fx.node).ledger().height();

    let mut past = campaign("Late", "1", START - 1);
    assert!(matches!(gateway.create_campaign(&past), Err(GatewayError::Validation(_))));
    past.deadline = START + DAY;
    past.image = "not an image".into();
    assert!(matches!(gateway.create_campaign(&past), Err(GatewayError::Validation(_))));
    assert!(matches!(gateway.donate(0, 0), Err(GatewayError::Validation(_))));

    assert_eq!(lock(&fx.node).ledger().height(), height);
}

#[test]
fn donation_after_deadline_is_rejected() {
    let fx = Fixture::new();
    let id = fx.create("Festival", "1");
    fx.clock.advance(31 * DAY);

    let err = fx.gateway(Some(&fx.donor)).donate(id, units("1")).unwrap_err();
    assert!(matches!(err, GatewayError::RejectedTransaction(_)), "{err:?}");
    assert_eq!(fx.gateway(None).campaign(id).unwrap().amount_collected, 0);
}

#[test]
fn unknown_campaign_donation_is_rejected() {
    let fx = Fixture::new();
    let err = fx.gateway(Some(&fx.donor)).donate(42, units("1")).unwrap_err();
    assert!(matches!(err, GatewayError::RejectedTransaction(_)), "{err:?}");
}

#[test]
fn gateway_resolves_manager_from_artifacts() {
    let fx = Fixture::new();
    let client = RpcClient::new(LocalTransport::new(fx.node.clone()));
    let gateway = CampaignGateway::from_artifacts(client, fx.artifacts.path()).unwrap();
    assert_eq!(gateway.manager(), fx.manager);
}

#[test]
fn missing_campaign_is_a_rejected_query_not_a_network_error() {
    let fx = Fixture::new();
    let reader = fx.gateway(None);

    let err = reader.campaign(99).unwrap_err();
    assert!(
        matches!(&err, GatewayError::QueryRejected(msg) if msg.contains("campaign 99 does not exist")),
        "{err:?}"
    );
    assert!(matches!(reader.donations(99), Err(GatewayError::QueryRejected(_))));
}

#[test]
fn reading_from_a_non_contract_address_is_rejected() {
    let fx = Fixture::new();
    let client = RpcClient::new(LocalTransport::new(fx.node.clone()));
    let gateway = CampaignGateway::new(client, fx.owner.address());
    let err = gateway.list_campaigns(0, 20).unwrap_err();
    assert!(matches!(err, GatewayError::QueryRejected(_)), "{err:?}");
}

#[test]
fn unreachable_node_is_a_network_error() {
    let client = RpcClient::new(HttpTransport::new("http://127.0.0.1:1").unwrap());
    let gateway = CampaignGateway::new(client, Address::ZERO);
    let err = gateway.list_campaigns(0, 20).unwrap_err();
    assert!(matches!(err, GatewayError::Network(_)), "{err:?}");
}
