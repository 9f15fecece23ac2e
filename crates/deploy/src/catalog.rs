//! The Pledge protocol deployment steps.

use alloy_core::primitives::{Address, address};

use crate::{
    ConstructorArg,
    network::{FEE_ADDRESS, ORACLE, SWAP_ROUTER},
    scheduler::ALL_TAG,
    step::{Applicability, ContractDeployment, StepDefinition},
};

pub const MULTI_SIGNATURE: &str = "multiSignature";
pub const SP_DEBT_TOKEN: &str = "spDebtToken";
pub const JP_DEBT_TOKEN: &str = "jpDebtToken";
pub const MOCK_SWAP_ROUTER: &str = "mockSwapRouter";
pub const MOCK_ORACLE: &str = "mockOracle";
pub const BSC_PLEDGE_ORACLE: &str = "bscPledgeOracle";
pub const PLEDGE_POOL: &str = "pledgePool";

/// Record registered by the multi-signature step.
pub const MULTI_SIGNATURE_RECORD: &str = "multiSignature";
pub const ROUTER_RECORD: &str = "UniswapV2Router02";
pub const MOCK_ORACLE_RECORD: &str = "MockOracle";
pub const BSC_PLEDGE_ORACLE_RECORD: &str = "BscPledgeOracle";
pub const PLEDGE_POOL_RECORD: &str = "PledgePool";

/// Owners of the multi-signature wallet.
pub const MULTI_SIGNATURE_OWNERS: [Address; 3] = [
    address!("0x523df39cae18ea125930da730628213e4b147cdc"),
    address!("0xcafd18c0c33676a17fb3bf63bd46f8ffcbff9039"),
    address!("0x6002bad747afd5690f543a670f3e3bd30e033084"),
];

/// Signatures required by the multi-signature wallet.
pub const MULTI_SIGNATURE_THRESHOLD: u64 = 2;

fn debt_token(step: &str, symbol: &'static str) -> StepDefinition {
    StepDefinition::new(step)
        .depends_on(MULTI_SIGNATURE)
        .tag("DebtToken")
        .tag(ALL_TAG)
        .contract(ContractDeployment::new(step, "DebtToken", move |ctx| {
            Ok(vec![
                ConstructorArg::string(symbol),
                ConstructorArg::string(symbol),
                ConstructorArg::Address(ctx.address(MULTI_SIGNATURE_RECORD)?),
            ])
        }))
}

fn mock_token(
    name: &str,
    token: &'static str,
    symbol: &'static str,
    decimals: u64,
    supply: u64,
) -> ContractDeployment {
    ContractDeployment::new(name, "MockERC20", move |_| {
        Ok(vec![
            ConstructorArg::string(token),
            ConstructorArg::string(symbol),
            ConstructorArg::uint(decimals),
            ConstructorArg::uint(supply),
        ])
    })
}

/// Every step of the Pledge deployment, in declaration order.
pub fn pledge_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(MULTI_SIGNATURE)
            .tag(ALL_TAG)
            .contract(ContractDeployment::named(MULTI_SIGNATURE_RECORD, |_| {
                Ok(vec![
                    ConstructorArg::AddressList(MULTI_SIGNATURE_OWNERS.to_vec()),
                    ConstructorArg::uint(MULTI_SIGNATURE_THRESHOLD),
                ])
            })),
        debt_token(SP_DEBT_TOKEN, "spBTC_1"),
        debt_token(JP_DEBT_TOKEN, "jpBTC_1"),
        StepDefinition::new(MOCK_SWAP_ROUTER)
            .applicability(Applicability::LocalOnly)
            .tag("mocks")
            .tag(ALL_TAG)
            .contract(ContractDeployment::named("MockWETH", |_| Ok(vec![])))
            .contract(ContractDeployment::named("UniswapV2Factory", |ctx| {
                Ok(vec![ConstructorArg::Address(ctx.deployer)])
            }))
            .contract(ContractDeployment::named(ROUTER_RECORD, |ctx| {
                Ok(vec![
                    ConstructorArg::Address(ctx.address("UniswapV2Factory")?),
                    ConstructorArg::Address(ctx.address("MockWETH")?),
                ])
            }))
            .contract(mock_token("MockUSDT", "Mock Tether USD", "USDT", 6, 1_000_000_000_000))
            .contract(mock_token("MockBTC", "Mock Bitcoin", "BTC", 8, 2_100_000_000_000_000))
            .contract(mock_token("MockUSDC", "Mock USD Coin", "USDC", 6, 1_000_000_000_000)),
        StepDefinition::new(MOCK_ORACLE)
            .applicability(Applicability::LocalOnly)
            .tag("mocks")
            .tag("oracle")
            .tag("MockOracle")
            .tag("BscPledgeOracle")
            .tag(ALL_TAG)
            .contract(ContractDeployment::named(MOCK_ORACLE_RECORD, |_| Ok(vec![]))),
        StepDefinition::new(BSC_PLEDGE_ORACLE)
            .depends_on(MULTI_SIGNATURE)
            .applicability(Applicability::PublicOnly)
            .tag("oracle")
            .tag("MockOracle")
            .tag("BscPledgeOracle")
            .tag(ALL_TAG)
            .contract(ContractDeployment::named(BSC_PLEDGE_ORACLE_RECORD, |ctx| {
                Ok(vec![ConstructorArg::Address(ctx.address(MULTI_SIGNATURE_RECORD)?)])
            })),
        StepDefinition::new(PLEDGE_POOL)
            .depends_on(MULTI_SIGNATURE)
            .uses(ORACLE)
            .uses(SWAP_ROUTER)
            .uses(FEE_ADDRESS)
            .tag("PledgePool")
            .tag(ALL_TAG)
            .contract(ContractDeployment::named(PLEDGE_POOL_RECORD, |ctx| {
                Ok(vec![
                    ConstructorArg::Address(ctx.auxiliary(ORACLE)?),
                    ConstructorArg::Address(ctx.auxiliary(SWAP_ROUTER)?),
                    ConstructorArg::Address(ctx.auxiliary(FEE_ADDRESS)?),
                    ConstructorArg::Address(ctx.address(MULTI_SIGNATURE_RECORD)?),
                ])
            })),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        network::{Credentials, NetworkProfile},
        scheduler::{schedule, select_tags},
        step::BuildContext,
    };

    fn names(steps: &[StepDefinition]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    fn profile(network: &str) -> NetworkProfile {
        NetworkProfile::resolve(network, &Credentials::default()).unwrap()
    }

    #[test]
    fn test_local_order_uses_mocks() {
        let ordered = schedule(&pledge_steps(), &profile("hardhat")).unwrap();
        assert_eq!(
            names(&ordered),
            vec![
                MULTI_SIGNATURE,
                SP_DEBT_TOKEN,
                JP_DEBT_TOKEN,
                MOCK_SWAP_ROUTER,
                MOCK_ORACLE,
                PLEDGE_POOL
            ]
        );
    }

    #[test]
    fn test_public_order_uses_production_oracle() {
        let ordered = schedule(&pledge_steps(), &profile("sepolia")).unwrap();
        assert_eq!(
            names(&ordered),
            vec![
                MULTI_SIGNATURE,
                SP_DEBT_TOKEN,
                JP_DEBT_TOKEN,
                BSC_PLEDGE_ORACLE,
                PLEDGE_POOL
            ]
        );
    }

    #[test]
    fn test_pool_tag_pulls_in_providers() {
        let selected =
            select_tags(&pledge_steps(), &[PLEDGE_POOL.to_string()], &profile("localhost")).unwrap();
        assert_eq!(
            names(&selected),
            vec![MULTI_SIGNATURE, MOCK_SWAP_ROUTER, MOCK_ORACLE, PLEDGE_POOL]
        );
    }

    #[test]
    fn test_script_tags_select_steps() {
        let local = profile("hardhat");
        let public = profile("sepolia");

        let pool = schedule(
            &select_tags(&pledge_steps(), &["PledgePool".to_string()], &local).unwrap(),
            &local,
        )
        .unwrap();
        assert_eq!(
            names(&pool),
            vec![MULTI_SIGNATURE, MOCK_SWAP_ROUTER, MOCK_ORACLE, PLEDGE_POOL]
        );

        for tag in ["MockOracle", "BscPledgeOracle"] {
            let tags = [tag.to_string()];
            let on_local =
                schedule(&select_tags(&pledge_steps(), &tags, &local).unwrap(), &local).unwrap();
            assert_eq!(names(&on_local), vec![MOCK_ORACLE]);

            let on_public =
                schedule(&select_tags(&pledge_steps(), &tags, &public).unwrap(), &public).unwrap();
            assert_eq!(names(&on_public), vec![MULTI_SIGNATURE, BSC_PLEDGE_ORACLE]);
        }

        let debt = select_tags(&pledge_steps(), &["DebtToken".to_string()], &local).unwrap();
        assert_eq!(names(&debt), vec![MULTI_SIGNATURE, SP_DEBT_TOKEN, JP_DEBT_TOKEN]);
    }

    #[test]
    fn test_multi_signature_arguments() {
        let profile = profile("hardhat");
        let steps = pledge_steps();
        let ctx = BuildContext::new(MULTI_SIGNATURE, &profile, Address::ZERO);

        let args = steps[0].contracts[0].build(&ctx).unwrap();
        assert_eq!(
            args,
            vec![
                ConstructorArg::AddressList(MULTI_SIGNATURE_OWNERS.to_vec()),
                ConstructorArg::uint(2),
            ]
        );
    }

    #[test]
    fn test_pool_arguments_follow_constructor_order() {
        let profile = profile("sepolia");
        let steps = pledge_steps();
        let pool = steps.iter().find(|s| s.name == PLEDGE_POOL).unwrap();

        let oracle = address!("0x00000000000000000000000000000000000000a1");
        let router = address!("0x00000000000000000000000000000000000000a2");
        let fee = address!("0x00000000000000000000000000000000000000a3");
        let multisig = address!("0x00000000000000000000000000000000000000a4");
        let ctx = BuildContext::new(PLEDGE_POOL, &profile, fee)
            .with_record(MULTI_SIGNATURE_RECORD, multisig)
            .with_auxiliary(ORACLE, oracle)
            .with_auxiliary(SWAP_ROUTER, router)
            .with_auxiliary(FEE_ADDRESS, fee);

        let args = pool.contracts[0].build(&ctx).unwrap();
        assert_eq!(
            args,
            vec![
                ConstructorArg::Address(oracle),
                ConstructorArg::Address(router),
                ConstructorArg::Address(fee),
                ConstructorArg::Address(multisig),
            ]
        );
    }
}
