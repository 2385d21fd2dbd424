use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_args, encode, expect_no_args, CallContext, Outcome, Revert};
use crate::abi::{event, function, param, ContractAbi, StateMutability};
use crate::crypto::Address;
use crate::tx::Event;
use crate::units::{serde_amount, Amount};

pub const NAME: &str = "GasLot";

pub const GOVERNOR: &str = "governor";
pub const POOL: &str = "pool";
pub const DEPOSIT_OF: &str = "deposit_of";
pub const DEPOSIT: &str = "deposit";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GasLotArgs {
    pub governor: Address,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
struct AccountArgs {
    account: Address,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
struct Deposit {
    #[serde(with = "serde_amount")]
    total: Amount,
}

/// Value pool bound to a governor contract at construction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GasLot {
    governor: Address,
    #[serde(with = "serde_amount")]
    pool: Amount,
    deposits: BTreeMap<Address, Deposit>,
}

impl GasLot {
    pub fn construct(args: &Value, _ctx: &CallContext) -> Result<Self, Revert> {
        let GasLotArgs { governor } = decode_args(NAME, args)?;
        if governor == Address::ZERO {
            return Err(Revert::new("governor must not be the zero address"));
        }
        Ok(Self {
            governor,
            pool: 0,
            deposits: BTreeMap::new(),
        })
    }

    pub fn governor(&self) -> Address {
        self.governor
    }

    pub fn pool(&self) -> Amount {
        self.pool
    }

    pub fn deposit_of(&self, account: &Address) -> Amount {
        self.deposits.get(account).map(|d| d.total).unwrap_or(0)
    }

    pub fn execute(&mut self, ctx: &CallContext, method: &str, args: &Value) -> Result<Outcome, Revert> {
        match method {
            DEPOSIT => {
                expect_no_args(method, args)?;
                if ctx.value == 0 {
                    return Err(Revert::new("deposit must carry value"));
                }
                let pool = self
                    .pool
                    .checked_add(ctx.value)
                    .ok_or_else(|| Revert::new("pool overflow"))?;
                self.pool = pool;
                self.deposits.entry(ctx.sender).or_default().total += ctx.value;

                let mut outcome = Outcome::returning(pool.to_string())?;
                outcome.events.push(Event::GasLotDeposit {
                    depositor: ctx.sender,
                    amount: ctx.value,
                });
                Ok(outcome)
            }
            _ => Err(Revert::new(format!("unknown method {method}"))),
        }
    }

    pub fn query(&self, method: &str, args: &Value) -> Result<Value, Revert> {
        match method {
            GOVERNOR => {
                expect_no_args(method, args)?;
                encode(self.governor)
            }
            POOL => {
                expect_no_args(method, args)?;
                encode(self.pool.to_string())
            }
            DEPOSIT_OF => {
                let AccountArgs { account } = decode_args(method, args)?;
                encode(self.deposit_of(&account).to_string())
            }
            _ => Err(Revert::new(format!("unknown view {method}"))),
        }
    }
}

pub fn abi() -> ContractAbi {
    ContractAbi {
        contract_name: NAME.to_string(),
        constructor: vec![param("governor", "address")],
        functions: vec![
            function(GOVERNOR, vec![], vec![param("governor", "address")], StateMutability::View),
            function(POOL, vec![], vec![param("pool", "uint256")], StateMutability::View),
            function(
                DEPOSIT_OF,
                vec![param("account", "address")],
                vec![param("amount", "uint256")],
                StateMutability::View,
            ),
            function(DEPOSIT, vec![], vec![param("pool", "uint256")], StateMutability::Payable),
        ],
        events: vec![event(
            "GasLotDeposit",
            vec![param("depositor", "address"), param("amount", "uint256")],
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use serde_json::json;

    fn ctx(sender: Address, value: Amount) -> CallContext {
        CallContext {
            sender,
            value,
            timestamp: 1,
            this: Address::from_bytes([7u8; 20]),
        }
    }

    #[test]
    fn constructor_binds_governor() {
        let governor = Keypair::generate().address();
        let deployer = Keypair::generate().address();
        let lot = GasLot::construct(&json!({ "governor": governor }), &ctx(deployer, 0)).unwrap();
        assert_eq!(lot.governor(), governor);
        assert_eq!(lot.query(GOVERNOR, &Value::Null).unwrap(), json!(governor.to_string()));
    }

    #[test]
    fn constructor_requires_governor() {
        let deployer = Keypair::generate().address();
        assert!(GasLot::construct(&Value::Null, &ctx(deployer, 0)).is_err());
        assert!(GasLot::construct(&json!({ "governor": Address::ZERO }), &ctx(deployer, 0)).is_err());
    }

    #[test]
    fn deposits_accumulate_per_account() {
        let governor = Keypair::generate().address();
        let alice = Keypair::generate().address();
        let mut lot = GasLot::construct(&json!({ "governor": governor }), &ctx(alice, 0)).unwrap();
        lot.execute(&ctx(alice, 40), DEPOSIT, &Value::Null).unwrap();
        lot.execute(&ctx(alice, 2), DEPOSIT, &Value::Null).unwrap();
        assert_eq!(lot.pool(), 42);
        assert_eq!(lot.deposit_of(&alice), 42);
        assert_eq!(lot.deposit_of(&governor), 0);
        assert!(lot.execute(&ctx(alice, 0), DEPOSIT, &Value::Null).is_err());
    }
}
