use std::sync::Arc;

use margin_account::{
    account::Account,
    basket_index::BasketIndex,
    decoder::LayoutVersion,
    fixed_point,
    group::{Group, InterestIndex, Token, TokenInfo},
};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rust_decimal::Decimal;
use solana_program::pubkey::Pubkey;

fn random_group(rng: &mut XorShiftRng, slots: usize) -> Arc<Group> {
    let tokens = (0..slots)
        .map(|slot| {
            let is_quote = slot == slots - 1;
            if !is_quote && rng.gen_bool(0.5) {
                return None;
            }
            let decimals = rng.gen_range(0..=18u8);
            Some(TokenInfo {
                token: Token::new(&format!("T{}", slot), "token", Pubkey::new_unique(), decimals),
                root_bank: Pubkey::new_unique(),
                index: InterestIndex {
                    deposit: Decimal::new(rng.gen_range(1_000_000..2_000_000), 6),
                    borrow: Decimal::new(rng.gen_range(1_000_000..2_000_000), 6),
                    last_update: 0,
                },
            })
        })
        .collect();
    Arc::new(Group::new(Pubkey::new_unique(), "fuzz", tokens))
}

#[test]
fn deterministic_fuzz_basket_index() {
    let seed = [0xabu8; 16];
    let mut rng = XorShiftRng::from_seed(seed);

    for i in 0..500 {
        let len = rng.gen_range(0..40);
        let mask: Vec<bool> = (0..len).map(|_| rng.gen_bool(0.4)).collect();
        let index = BasketIndex::from_mask(&mask);

        assert_eq!(index.mask(), mask, "mask round trip failed at step {}", i);
        assert_eq!(index.active_count(), mask.iter().filter(|&&m| m).count());
        for dense in 0..index.active_count() {
            let slot = index.dense_to_sparse(dense).unwrap();
            assert_eq!(index.sparse_to_dense(slot), Some(dense), "step {}", i);
        }
        for slot in 0..len {
            if let Some(dense) = index.sparse_to_dense(slot) {
                assert_eq!(index.dense_to_sparse(dense), Some(slot), "step {}", i);
            }
        }
    }
}

#[test]
fn deterministic_fuzz_account_assembly() {
    let seed = [0xabu8; 16];
    let mut rng = XorShiftRng::from_seed(seed);

    for i in 0..200 {
        let version = if rng.gen_bool(0.5) { LayoutVersion::V1 } else { LayoutVersion::V2 };
        let slots = version.token_slots();
        let mut data = vec![0u8; version.account_len()];
        rng.fill(&mut data[..]);
        let group = random_group(&mut rng, slots);
        let address = Pubkey::new_unique();

        let account = Account::parse(address, &data, group.clone()).unwrap();
        let again = Account::parse(address, &data, group.clone()).unwrap();
        assert_eq!(account, again, "assembly not deterministic at step {}", i);

        let active_groups = (0..slots - 1).filter(|&s| group.token(s).is_some()).count();
        assert_eq!(account.basket().len(), active_groups, "step {}", i);
        assert_eq!(account.basket_tokens().len(), slots);
        assert_eq!(account.spot_open_orders().len(), slots - 1);
        assert_eq!(account.perp_accounts().len(), slots - 1);

        for (slot, token) in account.basket_tokens().into_iter().enumerate() {
            assert_eq!(token.is_some(), group.token(slot).is_some(), "step {} slot {}", i, slot);
            if let Some(token) = token {
                let net = token.net_value().value;
                assert_eq!(net, token.deposit.value - token.borrow.value);
                let info = &token.token_info;
                assert_eq!(token.deposit.value.scale(), u32::from(info.token.decimals));
                let offset = deposits_offset(version) + slot * 8;
                let raw = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
                assert_eq!(
                    token.deposit.value,
                    fixed_point::scale(raw, info.index.deposit, info.token.decimals),
                    "step {} slot {}", i, slot
                );
            }
        }
    }
}

fn deposits_offset(version: LayoutVersion) -> usize {
    match version {
        LayoutVersion::V1 => 120,
        LayoutVersion::V2 => 96,
    }
}
