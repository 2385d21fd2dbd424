use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_args, encode, expect_no_args, CallContext, Outcome, Revert};
use crate::abi::{event, function, param, ContractAbi, StateMutability};
use crate::crypto::Address;
use crate::ledger::LedgerMutation;
use crate::tx::Event;
use crate::units::{serde_amount, Amount};

pub const NAME: &str = "CampaignManager";

pub const CREATE_CAMPAIGN: &str = "create_campaign";
pub const DONATE_TO_CAMPAIGN: &str = "donate_to_campaign";
pub const GET_CAMPAIGNS: &str = "get_campaigns";
pub const GET_CAMPAIGN: &str = "get_campaign";
pub const GET_DONATORS: &str = "get_donators";
pub const NUMBER_OF_CAMPAIGNS: &str = "number_of_campaigns";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Campaign {
    pub id: u64,
    pub owner: Address,
    pub title: String,
    pub description: String,
    #[serde(with = "serde_amount")]
    pub target: Amount,
    pub deadline: u64,
    #[serde(with = "serde_amount")]
    pub amount_collected: Amount,
    pub image: String,
}

impl Campaign {
    pub fn is_open(&self, now: u64) -> bool {
        now < self.deadline
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Donation {
    pub campaign_id: u64,
    pub donor: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateCampaignArgs {
    pub owner: Address,
    pub title: String,
    pub description: String,
    #[serde(with = "serde_amount")]
    pub target: Amount,
    pub deadline: u64,
    pub image: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignIdArgs {
    pub id: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangeArgs {
    pub start: u64,
    pub end: u64,
}

/// Registry of campaigns and their donations. Campaigns are addressed by
/// creation index and never removed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignManager {
    campaigns: Vec<Campaign>,
    donations: Vec<Vec<Donation>>,
}

impl CampaignManager {
    pub fn construct(args: &Value, _ctx: &CallContext) -> Result<Self, Revert> {
        expect_no_args(NAME, args)?;
        Ok(Self::default())
    }

    pub fn len(&self) -> u64 {
        self.campaigns.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn campaign(&self, id: u64) -> Option<&Campaign> {
        self.campaigns.get(usize::try_from(id).ok()?)
    }

    /// Campaigns with index in `[start, min(end, len))`.
    pub fn range(&self, start: u64, end: u64) -> &[Campaign] {
        let end = end.min(self.len());
        if start >= end {
            return &[];
        }
        &self.campaigns[start as usize..end as usize]
    }

    pub fn donations(&self, id: u64) -> Option<&[Donation]> {
        self.donations
            .get(usize::try_from(id).ok()?)
            .map(Vec::as_slice)
    }

    pub fn execute(&mut self, ctx: &CallContext, method: &str, args: &Value) -> Result<Outcome, Revert> {
        match method {
            CREATE_CAMPAIGN => {
                if ctx.value != 0 {
                    return Err(Revert::new("create_campaign is not payable"));
                }
                self.create_campaign(ctx, decode_args(method, args)?)
            }
            DONATE_TO_CAMPAIGN => {
                let CampaignIdArgs { id } = decode_args(method, args)?;
                self.donate(ctx, id)
            }
            _ => Err(Revert::new(format!("unknown method {method}"))),
        }
    }

    pub fn query(&self, method: &str, args: &Value) -> Result<Value, Revert> {
        match method {
            GET_CAMPAIGNS => {
                let RangeArgs { start, end } = decode_args(method, args)?;
                encode(self.range(start, end))
            }
            GET_CAMPAIGN => {
                let CampaignIdArgs { id } = decode_args(method, args)?;
                encode(self.campaign(id).ok_or_else(|| unknown_campaign(id))?)
            }
            GET_DONATORS => {
                let CampaignIdArgs { id } = decode_args(method, args)?;
                encode(self.donations(id).ok_or_else(|| unknown_campaign(id))?)
            }
            NUMBER_OF_CAMPAIGNS => {
                expect_no_args(method, args)?;
                encode(self.len())
            }
            _ => Err(Revert::new(format!("unknown view {method}"))),
        }
    }

    fn create_campaign(&mut self, ctx: &CallContext, args: CreateCampaignArgs) -> Result<Outcome, Revert> {
        if args.deadline <= ctx.timestamp {
            return Err(Revert::new("the deadline should be a date in the future"));
        }
        if args.title.trim().is_empty() {
            return Err(Revert::new("campaign title must not be empty"));
        }

        let id = self.len();
        let campaign = Campaign {
            id,
            owner: args.owner,
            title: args.title,
            description: args.description,
            target: args.target,
            deadline: args.deadline,
            amount_collected: 0,
            image: args.image,
        };
        let event = Event::CampaignCreated {
            campaign_id: id,
            owner: campaign.owner,
            target: campaign.target,
            deadline: campaign.deadline,
        };
        self.campaigns.push(campaign);
        self.donations.push(Vec::new());

        let mut outcome = Outcome::returning(id)?;
        outcome.events.push(event);
        Ok(outcome)
    }

    fn donate(&mut self, ctx: &CallContext, id: u64) -> Result<Outcome, Revert> {
        if ctx.value == 0 {
            return Err(Revert::new("donation must carry value"));
        }
        let idx = usize::try_from(id).map_err(|_| unknown_campaign(id))?;
        let campaign = self.campaigns.get_mut(idx).ok_or_else(|| unknown_campaign(id))?;
        if !campaign.is_open(ctx.timestamp) {
            return Err(Revert::new(format!("campaign {id} has ended")));
        }
        let collected = campaign
            .amount_collected
            .checked_add(ctx.value)
            .ok_or_else(|| Revert::new("amount collected overflow"))?;

        campaign.amount_collected = collected;
        let owner = campaign.owner;
        self.donations[idx].push(Donation {
            campaign_id: id,
            donor: ctx.sender,
            amount: ctx.value,
        });

        let mut outcome = Outcome::returning(collected.to_string())?;
        outcome.mutations.push(LedgerMutation::Transfer {
            from: ctx.this,
            to: owner,
            amount: ctx.value,
        });
        outcome.events.push(Event::DonationReceived {
            campaign_id: id,
            donor: ctx.sender,
            amount: ctx.value,
        });
        Ok(outcome)
    }
}

fn unknown_campaign(id: u64) -> Revert {
    Revert::new(format!("campaign {id} does not exist"))
}

pub fn abi() -> ContractAbi {
    let campaign_fields = || {
        vec![
            param("id", "uint64"),
            param("owner", "address"),
            param("title", "string"),
            param("description", "string"),
            param("target", "uint256"),
            param("deadline", "uint64"),
            param("amount_collected", "uint256"),
            param("image", "string"),
        ]
    };
    ContractAbi {
        contract_name: NAME.to_string(),
        constructor: vec![],
        functions: vec![
            function(
                CREATE_CAMPAIGN,
                vec![
                    param("owner", "address"),
                    param("title", "string"),
                    param("description", "string"),
                    param("target", "uint256"),
                    param("deadline", "uint64"),
                    param("image", "string"),
                ],
                vec![param("id", "uint64")],
                StateMutability::NonPayable,
            ),
            function(
                DONATE_TO_CAMPAIGN,
                vec![param("id", "uint64")],
                vec![param("amount_collected", "uint256")],
                StateMutability::Payable,
            ),
            function(
                GET_CAMPAIGNS,
                vec![param("start", "uint64"), param("end", "uint64")],
                campaign_fields(),
                StateMutability::View,
            ),
            function(
                GET_CAMPAIGN,
                vec![param("id", "uint64")],
                campaign_fields(),
                StateMutability::View,
            ),
            function(
                GET_DONATORS,
                vec![param("id", "uint64")],
                vec![param("donor", "address"), param("amount", "uint256")],
                StateMutability::View,
            ),
            function(
                NUMBER_OF_CAMPAIGNS,
                vec![],
                vec![param("count", "uint64")],
                StateMutability::View,
            ),
        ],
        events: vec![
            event(
                "CampaignCreated",
                vec![
                    param("campaign_id", "uint64"),
                    param("owner", "address"),
                    param("target", "uint256"),
                    param("deadline", "uint64"),
                ],
            ),
            event(
                "DonationReceived",
                vec![
                    param("campaign_id", "uint64"),
                    param("donor", "address"),
                    param("amount", "uint256"),
                ],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use serde_json::json;

    fn ctx(sender: Address, value: Amount, timestamp: u64) -> CallContext {
        CallContext {
            sender,
            value,
            timestamp,
            this: Address::from_bytes([9u8; 20]),
        }
    }

    fn create_args(owner: Address, deadline: u64) -> Value {
        json!({
            "owner": owner,
            "title": "Clean water",
            "description": "Wells for the valley",
            "target": "1000",
            "deadline": deadline,
            "image": "https://example.org/well.png",
        })
    }

    #[test]
    fn created_campaign_starts_with_nothing_collected() {
        let owner = Keypair::generate().address();
        let mut manager = CampaignManager::default();
        let outcome = manager
            .execute(&ctx(owner, 0, 100), CREATE_CAMPAIGN, &create_args(owner, 200))
            .unwrap();
        assert_eq!(outcome.output, json!(0));
        let listed = manager.range(0, 20);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount_collected, 0);
        assert_eq!(listed[0].owner, owner);
    }

    #[test]
    fn deadline_must_be_in_the_future() {
        let owner = Keypair::generate().address();
        let mut manager = CampaignManager::default();
        let err = manager
            .execute(&ctx(owner, 0, 200), CREATE_CAMPAIGN, &create_args(owner, 200))
            .unwrap_err();
        assert!(err.0.contains("future"));
        assert!(manager.is_empty());
    }

    #[test]
    fn donation_accumulates_and_forwards_to_owner() {
        let owner = Keypair::generate().address();
        let donor = Keypair::generate().address();
        let mut manager = CampaignManager::default();
        manager
            .execute(&ctx(owner, 0, 100), CREATE_CAMPAIGN, &create_args(owner, 200))
            .unwrap();

        let outcome = manager
            .execute(&ctx(donor, 300, 150), DONATE_TO_CAMPAIGN, &json!({ "id": 0 }))
            .unwrap();
        manager
            .execute(&ctx(donor, 50, 160), DONATE_TO_CAMPAIGN, &json!({ "id": 0 }))
            .unwrap();

        assert_eq!(manager.campaign(0).unwrap().amount_collected, 350);
        assert_eq!(manager.donations(0).unwrap().len(), 2);
        assert_eq!(
            outcome.mutations,
            vec![LedgerMutation::Transfer {
                from: Address::from_bytes([9u8; 20]),
                to: owner,
                amount: 300,
            }]
        );
    }

    #[test]
    fn donations_are_rejected_after_deadline_or_without_value() {
        let owner = Keypair::generate().address();
        let mut manager = CampaignManager::default();
        manager
            .execute(&ctx(owner, 0, 100), CREATE_CAMPAIGN, &create_args(owner, 200))
            .unwrap();
        assert!(manager
            .execute(&ctx(owner, 10, 200), DONATE_TO_CAMPAIGN, &json!({ "id": 0 }))
            .is_err());
        assert!(manager
            .execute(&ctx(owner, 0, 150), DONATE_TO_CAMPAIGN, &json!({ "id": 0 }))
            .is_err());
        assert!(manager
            .execute(&ctx(owner, 10, 150), DONATE_TO_CAMPAIGN, &json!({ "id": 4 }))
            .is_err());
        assert_eq!(manager.campaign(0).unwrap().amount_collected, 0);
    }

    #[test]
    fn range_is_clamped() {
        let owner = Keypair::generate().address();
        let mut manager = CampaignManager::default();
        for _ in 0..3 {
            manager
                .execute(&ctx(owner, 0, 100), CREATE_CAMPAIGN, &create_args(owner, 200))
                .unwrap();
        }
        assert_eq!(manager.range(1, 20).len(), 2);
        assert_eq!(manager.range(1, 20)[0].id, 1);
        assert!(manager.range(3, 20).is_empty());
        assert!(manager.range(2, 1).is_empty());
        let listed = manager
            .query(GET_CAMPAIGNS, &json!({ "start": 0, "end": 2 }))
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }
}
