//! Margin account: decoder for margin/perp account snapshots with slot-aligned position model.

#![deny(unsafe_code)]

// 1. mod constants
pub mod constants {
    use core::mem::size_of;
    use crate::layout::{AccountLayoutV1, AccountLayoutV2, MetaDataLayout};

    pub const PUBKEY_LEN: usize = 32;
    pub const META_DATA_LEN: usize = size_of::<MetaDataLayout>();
    pub const INFO_LEN: usize = 32;
    pub const ACCOUNT_PADDING_LEN: usize = 70;

    pub const V1_TOKEN_SLOTS: usize = 10;
    pub const V1_ORDER_TABLE_LEN: usize = 32;

    pub const V2_TOKEN_SLOTS: usize = 16;
    pub const PERP_OPEN_ORDERS_LEN: usize = 32;

    /// `order_market` value marking an order table entry as free.
    pub const UNUSED_ORDER_MARKET: u8 = 0xFF;

    pub const V1_ACCOUNT_LEN: usize = size_of::<AccountLayoutV1>();
    pub const V2_ACCOUNT_LEN: usize = size_of::<AccountLayoutV2>();

    // Free/bid bitmasks are u32.
    const _: () = assert!(PERP_OPEN_ORDERS_LEN <= u32::BITS as usize);
    const _: () = assert!(V1_ACCOUNT_LEN == 2312);
    const _: () = assert!(V2_ACCOUNT_LEN == 14640);
}

// 2. mod error
pub mod error {
    use solana_program::program_error::ProgramError;
    use thiserror::Error;

    #[derive(Clone, Debug, Eq, PartialEq, Error)]
    pub enum AccountError {
        #[error("account data length ({actual}) does not match expected size ({expected})")]
        SizeMismatch { expected: usize, actual: usize },
        #[error("account data length ({actual}) matches no known layout version")]
        UnknownLayout { actual: usize },
        #[error("group resolves no quote token at slot {slot}")]
        MissingQuoteToken { slot: usize },
        #[error("no active basket item at slot {slot}")]
        InactiveSlotAccess { slot: usize },
    }

    impl AccountError {
        pub fn code(&self) -> u32 {
            match self {
                AccountError::SizeMismatch { .. } => 0,
                AccountError::UnknownLayout { .. } => 1,
                AccountError::MissingQuoteToken { .. } => 2,
                AccountError::InactiveSlotAccess { .. } => 3,
            }
        }
    }

    impl From<AccountError> for ProgramError {
        fn from(e: AccountError) -> Self {
            ProgramError::Custom(e.code())
        }
    }
}

// 3. mod layout (on-chain structs, little-endian, no implicit padding)
pub mod layout {
    use bytemuck::{Pod, Zeroable};
    use crate::constants::{
        ACCOUNT_PADDING_LEN, INFO_LEN, PERP_OPEN_ORDERS_LEN, PUBKEY_LEN, V1_ORDER_TABLE_LEN,
        V1_TOKEN_SLOTS, V2_TOKEN_SLOTS,
    };

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct MetaDataLayout {
        pub data_type: u8,
        pub version: u8,
        pub is_initialized: u8,
        pub _padding: [u8; 5],
    }

    // I80F48 fields are kept as raw bytes so every layout stays 8-byte aligned.
    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct PerpAccountLayoutV1 {
        pub base_position: i64,
        pub quote_position: [u8; 16],
        pub long_settled_funding: [u8; 16],
        pub short_settled_funding: [u8; 16],
        pub bids_quantity: i64,
        pub asks_quantity: i64,
        pub mngo_accrued: u64,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct AccountLayoutV1 {
        pub meta_data: MetaDataLayout,
        pub group: [u8; PUBKEY_LEN],
        pub owner: [u8; PUBKEY_LEN],
        pub info: [u8; INFO_LEN],
        pub in_margin_basket: [u8; V1_TOKEN_SLOTS],
        pub num_in_margin_basket: u8,
        pub _padding0: [u8; 5],
        pub deposits: [u64; V1_TOKEN_SLOTS],
        pub borrows: [u64; V1_TOKEN_SLOTS],
        pub spot_open_orders: [[u8; PUBKEY_LEN]; V1_TOKEN_SLOTS],
        pub perp_accounts: [PerpAccountLayoutV1; V1_TOKEN_SLOTS],
        pub order_market: [u8; V1_ORDER_TABLE_LEN],
        pub order_side: [u8; V1_ORDER_TABLE_LEN],
        pub order_ids: [[u8; 16]; V1_ORDER_TABLE_LEN],
        pub client_order_ids: [u64; V1_ORDER_TABLE_LEN],
        pub msrm_amount: u64,
        pub being_liquidated: u8,
        pub is_bankrupt: u8,
        pub _padding1: [u8; ACCOUNT_PADDING_LEN],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct PerpOpenOrdersLayout {
        pub bids_quantity: i64,
        pub asks_quantity: i64,
        pub is_free_bits: u32,
        pub is_bid_bits: u32,
        pub orders: [[u8; 16]; PERP_OPEN_ORDERS_LEN],
        pub client_order_ids: [u64; PERP_OPEN_ORDERS_LEN],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct PerpAccountLayoutV2 {
        pub base_position: i64,
        pub quote_position: [u8; 16],
        pub long_settled_funding: [u8; 16],
        pub short_settled_funding: [u8; 16],
        pub open_orders: PerpOpenOrdersLayout,
        pub mngo_accrued: u64,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct AccountLayoutV2 {
        pub meta_data: MetaDataLayout,
        pub group: [u8; PUBKEY_LEN],
        pub owner: [u8; PUBKEY_LEN],
        pub in_margin_basket: [u8; V2_TOKEN_SLOTS],
        pub num_in_margin_basket: u8,
        pub _padding0: [u8; 7],
        pub deposits: [u64; V2_TOKEN_SLOTS],
        pub borrows: [u64; V2_TOKEN_SLOTS],
        pub spot_open_orders: [[u8; PUBKEY_LEN]; V2_TOKEN_SLOTS],
        pub perp_accounts: [PerpAccountLayoutV2; V2_TOKEN_SLOTS],
        pub msrm_amount: u64,
        pub being_liquidated: u8,
        pub is_bankrupt: u8,
        pub _padding1: [u8; ACCOUNT_PADDING_LEN],
    }
}

// 4. mod fixed_point
pub mod fixed_point {
    use fixed::types::I80F48;
    use rust_decimal::Decimal;

    const I80F48_FRAC_BITS: u32 = 48;
    const MAX_DECIMAL_SCALE: u32 = 28;

    /// Divides by `10^decimals` and rounds (half-even) to exactly `decimals` fractional digits.
    ///
    /// The value is rounded once, in native units, before the decimal point
    /// moves. Tokens with more than 28 decimals keep 28 fractional digits.
    pub fn shift_to_decimals(value: Decimal, decimals: u8) -> Decimal {
        let dp = u32::from(decimals);
        let mut shifted = value.round_dp(0);
        if shifted.set_scale(dp).is_err() {
            return shift_past_max_scale(value, dp);
        }
        shifted
    }

    // dp > MAX_DECIMAL_SCALE: value / 10^dp rounded to MAX_DECIMAL_SCALE digits, straight from the mantissa.
    fn shift_past_max_scale(value: Decimal, dp: u32) -> Decimal {
        let divisor_exp = value.scale() + dp - MAX_DECIMAL_SCALE;
        let mantissa = match 10i128.checked_pow(divisor_exp) {
            Some(divisor) => div_round_half_even(value.mantissa(), divisor),
            None => 0,
        };
        Decimal::from_i128_with_scale(mantissa, MAX_DECIMAL_SCALE)
    }

    fn div_round_half_even(n: i128, d: i128) -> i128 {
        let (q, r) = (n / d, n % d);
        let rem = r.unsigned_abs();
        let rest = d.unsigned_abs() - rem;
        let away = match rem.cmp(&rest) {
            core::cmp::Ordering::Greater => true,
            core::cmp::Ordering::Less => false,
            core::cmp::Ordering::Equal => q % 2 != 0,
        };
        if away { q + n.signum() } else { q }
    }

    /// `raw * index`, expressed in whole tokens at the token's precision.
    ///
    /// Overflow of the 96-bit mantissa panics; raw magnitudes are `u64` and
    /// indices stay near 1, so it indicates corrupt registry data.
    pub fn scale(raw: u64, index: Decimal, decimals: u8) -> Decimal {
        shift_to_decimals(Decimal::from(raw) * index, decimals)
    }

    pub fn i80f48_to_decimal(value: I80F48) -> Decimal {
        let bits = value.to_bits();
        let whole = bits >> I80F48_FRAC_BITS;
        let frac = (bits & ((1i128 << I80F48_FRAC_BITS) - 1)) as u64;
        let denominator = Decimal::from(1u64 << I80F48_FRAC_BITS);
        Decimal::from_i128_with_scale(whole, 0) + Decimal::from(frac) / denominator
    }
}

// 5. mod group (registry resolved by the group loader)
pub mod group {
    use rust_decimal::Decimal;
    use solana_program::pubkey::Pubkey;
    use crate::fixed_point;

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct Token {
        pub symbol: String,
        pub name: String,
        pub mint: Pubkey,
        pub decimals: u8,
    }

    impl Token {
        pub fn new(symbol: &str, name: &str, mint: Pubkey, decimals: u8) -> Self {
            Self { symbol: symbol.to_string(), name: name.to_string(), mint, decimals }
        }

        pub fn symbol_matches(&self, symbol: &str) -> bool {
            self.symbol.eq_ignore_ascii_case(symbol)
        }

        pub fn shift_to_decimals(&self, value: Decimal) -> Decimal {
            fixed_point::shift_to_decimals(value, self.decimals)
        }
    }

    /// Root bank interest indices. Stale as soon as the chain publishes new ones.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct InterestIndex {
        pub deposit: Decimal,
        pub borrow: Decimal,
        pub last_update: u64,
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct TokenInfo {
        pub token: Token,
        pub root_bank: Pubkey,
        pub index: InterestIndex,
    }

    impl TokenInfo {
        pub fn deposit_value(&self, raw: u64) -> TokenValue {
            let value = fixed_point::scale(raw, self.index.deposit, self.token.decimals);
            TokenValue::new(self.token.clone(), value)
        }

        pub fn borrow_value(&self, raw: u64) -> TokenValue {
            let value = fixed_point::scale(raw, self.index.borrow, self.token.decimals);
            TokenValue::new(self.token.clone(), value)
        }
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct TokenValue {
        pub token: Token,
        pub value: Decimal,
    }

    impl TokenValue {
        pub fn new(token: Token, value: Decimal) -> Self {
            Self { token, value }
        }
    }

    /// Token registry indexed by slot. The last slot of an account layout is its quote token.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct Group {
        pub address: Pubkey,
        pub name: String,
        pub tokens: Vec<Option<TokenInfo>>,
    }

    impl Group {
        pub fn new(address: Pubkey, name: &str, tokens: Vec<Option<TokenInfo>>) -> Self {
            Self { address, name: name.to_string(), tokens }
        }

        pub fn token(&self, slot: usize) -> Option<&TokenInfo> {
            self.tokens.get(slot).and_then(Option::as_ref)
        }

        pub fn find_token_by_symbol(&self, symbol: &str) -> Option<&TokenInfo> {
            self.tokens
                .iter()
                .flatten()
                .find(|info| info.token.symbol_matches(symbol))
        }
    }
}

// 6. mod decoder
pub mod decoder {
    use fixed::types::I80F48;
    use num_derive::FromPrimitive;
    use num_traits::FromPrimitive;
    use solana_program::pubkey::Pubkey;
    use crate::{
        constants::{
            META_DATA_LEN, PUBKEY_LEN, UNUSED_ORDER_MARKET, V1_ACCOUNT_LEN, V1_TOKEN_SLOTS,
            V2_ACCOUNT_LEN, V2_TOKEN_SLOTS,
        },
        error::AccountError,
        layout::{
            AccountLayoutV1, AccountLayoutV2, MetaDataLayout, PerpAccountLayoutV1,
            PerpAccountLayoutV2, PerpOpenOrdersLayout,
        },
    };

    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub enum LayoutVersion {
        /// Sparse basket: boolean membership, info text, account-level order table.
        V1,
        /// Dense basket: weighted membership, order records inside each perp block.
        V2,
    }

    impl LayoutVersion {
        pub const fn account_len(self) -> usize {
            match self {
                LayoutVersion::V1 => V1_ACCOUNT_LEN,
                LayoutVersion::V2 => V2_ACCOUNT_LEN,
            }
        }

        pub const fn token_slots(self) -> usize {
            match self {
                LayoutVersion::V1 => V1_TOKEN_SLOTS,
                LayoutVersion::V2 => V2_TOKEN_SLOTS,
            }
        }

        pub const fn quote_slot(self) -> usize {
            self.token_slots() - 1
        }

        pub fn from_account_len(len: usize) -> Option<Self> {
            [LayoutVersion::V1, LayoutVersion::V2]
                .into_iter()
                .find(|version| version.account_len() == len)
        }
    }

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
    pub enum DataType {
        Group = 0,
        Account = 1,
        RootBank = 2,
        NodeBank = 3,
        PerpMarket = 4,
        Bids = 5,
        Asks = 6,
        Cache = 7,
        EventQueue = 8,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MetaData {
        pub data_type: u8,
        pub version: u8,
        pub is_initialized: bool,
    }

    impl MetaData {
        pub fn kind(&self) -> Option<DataType> {
            DataType::from_u8(self.data_type)
        }
    }

    impl From<&MetaDataLayout> for MetaData {
        fn from(layout: &MetaDataLayout) -> Self {
            Self {
                data_type: layout.data_type,
                version: layout.version,
                is_initialized: layout.is_initialized != 0,
            }
        }
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum RawMembership {
        Flags(Vec<bool>),
        Weights(Vec<u8>),
    }

    impl RawMembership {
        pub fn in_basket(&self) -> Vec<bool> {
            match self {
                RawMembership::Flags(flags) => flags.clone(),
                RawMembership::Weights(weights) => weights.iter().map(|&w| w > 0).collect(),
            }
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RawOrderEntry {
        pub market: u8,
        pub side: u8,
        pub id: i128,
        pub client_id: u64,
    }

    impl RawOrderEntry {
        pub fn is_unused(&self) -> bool {
            self.market == UNUSED_ORDER_MARKET
        }
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct RawPerpOpenOrders {
        pub is_free_bits: u32,
        pub is_bid_bits: u32,
        pub orders: Vec<i128>,
        pub client_order_ids: Vec<u64>,
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct RawPerpAccount {
        pub base_position: i64,
        pub quote_position: I80F48,
        pub long_settled_funding: I80F48,
        pub short_settled_funding: I80F48,
        pub bids_quantity: i64,
        pub asks_quantity: i64,
        pub mngo_accrued: u64,
        /// Present only in V2, where each perp block carries its own orders.
        pub open_orders: Option<RawPerpOpenOrders>,
    }

    impl From<&PerpAccountLayoutV1> for RawPerpAccount {
        fn from(layout: &PerpAccountLayoutV1) -> Self {
            Self {
                base_position: layout.base_position,
                quote_position: I80F48::from_le_bytes(layout.quote_position),
                long_settled_funding: I80F48::from_le_bytes(layout.long_settled_funding),
                short_settled_funding: I80F48::from_le_bytes(layout.short_settled_funding),
                bids_quantity: layout.bids_quantity,
                asks_quantity: layout.asks_quantity,
                mngo_accrued: layout.mngo_accrued,
                open_orders: None,
            }
        }
    }

    impl From<&PerpOpenOrdersLayout> for RawPerpOpenOrders {
        fn from(layout: &PerpOpenOrdersLayout) -> Self {
            Self {
                is_free_bits: layout.is_free_bits,
                is_bid_bits: layout.is_bid_bits,
                orders: layout.orders.iter().map(|id| i128::from_le_bytes(*id)).collect(),
                client_order_ids: layout.client_order_ids.to_vec(),
            }
        }
    }

    impl From<&PerpAccountLayoutV2> for RawPerpAccount {
        fn from(layout: &PerpAccountLayoutV2) -> Self {
            Self {
                base_position: layout.base_position,
                quote_position: I80F48::from_le_bytes(layout.quote_position),
                long_settled_funding: I80F48::from_le_bytes(layout.long_settled_funding),
                short_settled_funding: I80F48::from_le_bytes(layout.short_settled_funding),
                bids_quantity: layout.open_orders.bids_quantity,
                asks_quantity: layout.open_orders.asks_quantity,
                mngo_accrued: layout.mngo_accrued,
                open_orders: Some(RawPerpOpenOrders::from(&layout.open_orders)),
            }
        }
    }

    /// Typed fields of one account buffer. Every per-slot vector has
    /// `version.token_slots()` entries.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct RawAccount {
        pub(crate) version: LayoutVersion,
        pub(crate) meta_data: MetaData,
        pub(crate) group: Pubkey,
        pub(crate) owner: Pubkey,
        pub(crate) info: Option<String>,
        pub(crate) membership: RawMembership,
        pub(crate) num_in_margin_basket: u8,
        pub(crate) deposits: Vec<u64>,
        pub(crate) borrows: Vec<u64>,
        pub(crate) spot_open_orders: Vec<Option<Pubkey>>,
        pub(crate) perp_accounts: Vec<RawPerpAccount>,
        pub(crate) order_table: Option<Vec<RawOrderEntry>>,
        pub(crate) msrm_amount: u64,
        pub(crate) being_liquidated: bool,
        pub(crate) is_bankrupt: bool,
    }

    impl RawAccount {
        pub fn version(&self) -> LayoutVersion { self.version }
        pub fn meta_data(&self) -> MetaData { self.meta_data }
        pub fn group(&self) -> &Pubkey { &self.group }
        pub fn owner(&self) -> &Pubkey { &self.owner }
        pub fn info(&self) -> Option<&str> { self.info.as_deref() }
        pub fn membership(&self) -> &RawMembership { &self.membership }
        pub fn deposits(&self) -> &[u64] { &self.deposits }
        pub fn borrows(&self) -> &[u64] { &self.borrows }
        pub fn spot_open_orders(&self) -> &[Option<Pubkey>] { &self.spot_open_orders }
        pub fn perp_accounts(&self) -> &[RawPerpAccount] { &self.perp_accounts }
        pub fn order_table(&self) -> Option<&[RawOrderEntry]> { self.order_table.as_deref() }
        pub fn msrm_amount(&self) -> u64 { self.msrm_amount }
        pub fn being_liquidated(&self) -> bool { self.being_liquidated }
        pub fn is_bankrupt(&self) -> bool { self.is_bankrupt }
    }

    fn optional_pubkey(bytes: &[u8; PUBKEY_LEN]) -> Option<Pubkey> {
        if bytes.iter().all(|&b| b == 0) {
            None
        } else {
            Some(Pubkey::new_from_array(*bytes))
        }
    }

    // NUL-terminated; anything after the first NUL is stale.
    fn read_info(bytes: &[u8]) -> String {
        let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
        String::from_utf8_lossy(text).into_owned()
    }

    pub fn read_meta_data(data: &[u8]) -> Option<MetaData> {
        let header = data.get(..META_DATA_LEN)?;
        let layout: MetaDataLayout = bytemuck::pod_read_unaligned(header);
        Some(MetaData::from(&layout))
    }

    pub fn decode(data: &[u8], version: LayoutVersion) -> Result<RawAccount, AccountError> {
        let expected = version.account_len();
        if data.len() != expected {
            return Err(AccountError::SizeMismatch { expected, actual: data.len() });
        }
        let raw = match version {
            LayoutVersion::V1 => decode_v1(&bytemuck::pod_read_unaligned(data)),
            LayoutVersion::V2 => decode_v2(&bytemuck::pod_read_unaligned(data)),
        };
        Ok(raw)
    }

    /// Picks the layout version from the exact buffer length.
    pub fn decode_any(data: &[u8]) -> Result<RawAccount, AccountError> {
        let version = LayoutVersion::from_account_len(data.len())
            .ok_or(AccountError::UnknownLayout { actual: data.len() })?;
        decode(data, version)
    }

    fn decode_v1(layout: &AccountLayoutV1) -> RawAccount {
        let order_table = layout
            .order_market
            .iter()
            .zip(&layout.order_side)
            .zip(layout.order_ids.iter().zip(&layout.client_order_ids))
            .map(|((&market, &side), (id, &client_id))| RawOrderEntry {
                market,
                side,
                id: i128::from_le_bytes(*id),
                client_id,
            })
            .collect();

        RawAccount {
            version: LayoutVersion::V1,
            meta_data: MetaData::from(&layout.meta_data),
            group: Pubkey::new_from_array(layout.group),
            owner: Pubkey::new_from_array(layout.owner),
            info: Some(read_info(&layout.info)),
            membership: RawMembership::Flags(layout.in_margin_basket.iter().map(|&f| f != 0).collect()),
            num_in_margin_basket: layout.num_in_margin_basket,
            deposits: layout.deposits.to_vec(),
            borrows: layout.borrows.to_vec(),
            spot_open_orders: layout.spot_open_orders.iter().map(optional_pubkey).collect(),
            perp_accounts: layout.perp_accounts.iter().map(RawPerpAccount::from).collect(),
            order_table: Some(order_table),
            msrm_amount: layout.msrm_amount,
            being_liquidated: layout.being_liquidated != 0,
            is_bankrupt: layout.is_bankrupt != 0,
        }
    }

    fn decode_v2(layout: &AccountLayoutV2) -> RawAccount {
        RawAccount {
            version: LayoutVersion::V2,
            meta_data: MetaData::from(&layout.meta_data),
            group: Pubkey::new_from_array(layout.group),
            owner: Pubkey::new_from_array(layout.owner),
            info: None,
            membership: RawMembership::Weights(layout.in_margin_basket.to_vec()),
            num_in_margin_basket: layout.num_in_margin_basket,
            deposits: layout.deposits.to_vec(),
            borrows: layout.borrows.to_vec(),
            spot_open_orders: layout.spot_open_orders.iter().map(optional_pubkey).collect(),
            perp_accounts: layout.perp_accounts.iter().map(RawPerpAccount::from).collect(),
            order_table: None,
            msrm_amount: layout.msrm_amount,
            being_liquidated: layout.being_liquidated != 0,
            is_bankrupt: layout.is_bankrupt != 0,
        }
    }
}

// 7. mod orders
pub mod orders {
    use log::warn;
    use num_derive::FromPrimitive;
    use num_traits::FromPrimitive;
    use crate::decoder::{RawOrderEntry, RawPerpOpenOrders};

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromPrimitive)]
    pub enum Side {
        Bid = 0,
        Ask = 1,
    }

    impl Side {
        pub fn from_raw(raw: u8) -> Option<Self> {
            Self::from_u8(raw)
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PlacedOrder {
        pub id: i128,
        pub client_id: u64,
        pub side: Side,
    }

    /// Splits the V1 order table into one bucket per market slot.
    ///
    /// Free entries are dropped. Entries naming a market past `market_slots`
    /// or carrying an unknown side byte are dropped with a warning.
    pub fn bucket_order_table(entries: &[RawOrderEntry], market_slots: usize) -> Vec<Vec<PlacedOrder>> {
        let mut buckets = vec![Vec::new(); market_slots];
        for (position, entry) in entries.iter().enumerate() {
            if entry.is_unused() {
                continue;
            }
            let Some(side) = Side::from_raw(entry.side) else {
                warn!("order table entry {} has unknown side {}, skipping", position, entry.side);
                continue;
            };
            match buckets.get_mut(usize::from(entry.market)) {
                Some(bucket) => bucket.push(PlacedOrder { id: entry.id, client_id: entry.client_id, side }),
                None => warn!(
                    "order table entry {} names market {} of {}, skipping",
                    position, entry.market, market_slots
                ),
            }
        }
        buckets
    }

    /// Orders held in a V2 perp block: a clear `is_free_bits` bit marks a live slot.
    pub fn expand_open_orders(open_orders: &RawPerpOpenOrders) -> Vec<PlacedOrder> {
        open_orders
            .orders
            .iter()
            .zip(&open_orders.client_order_ids)
            .enumerate()
            .filter(|(slot, _)| open_orders.is_free_bits & (1u32 << slot) == 0)
            .map(|(slot, (&id, &client_id))| {
                let side = if open_orders.is_bid_bits & (1u32 << slot) != 0 { Side::Bid } else { Side::Ask };
                PlacedOrder { id, client_id, side }
            })
            .collect()
    }
}

// 8. mod perp
pub mod perp {
    use fixed::types::I80F48;
    use rust_decimal::Decimal;
    use crate::{decoder::RawPerpAccount, fixed_point, orders::{PlacedOrder, Side}};

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct PerpOpenOrders {
        pub bids_quantity: i64,
        pub asks_quantity: i64,
        pub placed_orders: Vec<PlacedOrder>,
    }

    impl PerpOpenOrders {
        pub fn orders_on_side(&self, side: Side) -> impl Iterator<Item = &PlacedOrder> {
            self.placed_orders.iter().filter(move |order| order.side == side)
        }
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct PerpAccount {
        /// Base lots.
        pub base_position: i64,
        /// Native quote units.
        pub quote_position: I80F48,
        pub long_settled_funding: I80F48,
        pub short_settled_funding: I80F48,
        pub mngo_accrued: u64,
        pub open_orders: PerpOpenOrders,
    }

    impl PerpAccount {
        pub fn from_raw(raw: &RawPerpAccount, placed_orders: Vec<PlacedOrder>) -> Self {
            Self {
                base_position: raw.base_position,
                quote_position: raw.quote_position,
                long_settled_funding: raw.long_settled_funding,
                short_settled_funding: raw.short_settled_funding,
                mngo_accrued: raw.mngo_accrued,
                open_orders: PerpOpenOrders {
                    bids_quantity: raw.bids_quantity,
                    asks_quantity: raw.asks_quantity,
                    placed_orders,
                },
            }
        }

        pub fn quote_position_decimal(&self) -> Decimal {
            fixed_point::i80f48_to_decimal(self.quote_position)
        }

        pub fn has_open_orders(&self) -> bool {
            !self.open_orders.placed_orders.is_empty()
        }

        pub fn is_empty(&self) -> bool {
            self.base_position == 0 && self.quote_position == I80F48::ZERO && !self.has_open_orders()
        }
    }
}

// 9. mod basket_index
pub mod basket_index {
    /// Two-way mapping between token slots and positions in a dense array
    /// holding only the active slots, built in a single pass over the mask.
    #[derive(Clone, Debug, Default, Eq, PartialEq)]
    pub struct BasketIndex {
        dense_to_sparse: Vec<usize>,
        sparse_to_dense: Vec<Option<usize>>,
    }

    impl BasketIndex {
        pub fn from_mask(mask: &[bool]) -> Self {
            let mut dense_to_sparse = Vec::with_capacity(mask.len());
            let mut sparse_to_dense = Vec::with_capacity(mask.len());
            for (slot, &active) in mask.iter().enumerate() {
                if active {
                    sparse_to_dense.push(Some(dense_to_sparse.len()));
                    dense_to_sparse.push(slot);
                } else {
                    sparse_to_dense.push(None);
                }
            }
            Self { dense_to_sparse, sparse_to_dense }
        }

        pub fn dense_to_sparse(&self, index: usize) -> Option<usize> {
            self.dense_to_sparse.get(index).copied()
        }

        pub fn sparse_to_dense(&self, slot: usize) -> Option<usize> {
            self.sparse_to_dense.get(slot).copied().flatten()
        }

        pub fn is_active(&self, slot: usize) -> bool {
            self.sparse_to_dense(slot).is_some()
        }

        pub fn active_count(&self) -> usize {
            self.dense_to_sparse.len()
        }

        pub fn slot_count(&self) -> usize {
            self.sparse_to_dense.len()
        }

        pub fn mask(&self) -> Vec<bool> {
            self.sparse_to_dense.iter().map(Option::is_some).collect()
        }

        /// Lays `dense` out by slot; inactive slots, and slots past the end of `dense`, come back `None`.
        pub fn project<'a, T>(&self, dense: &'a [T]) -> Vec<Option<&'a T>> {
            self.sparse_to_dense
                .iter()
                .map(|index| index.and_then(|i| dense.get(i)))
                .collect()
        }
    }
}

// 10. mod account (assembler + accessors)
pub mod account {
    use std::sync::Arc;
    use log::debug;
    use solana_program::pubkey::Pubkey;
    use crate::{
        basket_index::BasketIndex,
        decoder::{self, LayoutVersion, MetaData, RawAccount},
        error::AccountError,
        group::{Group, TokenInfo, TokenValue},
        orders,
        perp::PerpAccount,
    };

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct BasketToken {
        pub token_info: TokenInfo,
        pub deposit: TokenValue,
        pub borrow: TokenValue,
    }

    impl BasketToken {
        fn from_raw(token_info: &TokenInfo, raw_deposit: u64, raw_borrow: u64) -> Self {
            Self {
                token_info: token_info.clone(),
                deposit: token_info.deposit_value(raw_deposit),
                borrow: token_info.borrow_value(raw_borrow),
            }
        }

        pub fn net_value(&self) -> TokenValue {
            TokenValue::new(self.deposit.token.clone(), self.deposit.value - self.borrow.value)
        }
    }

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct BasketBaseToken {
        pub token: BasketToken,
        pub spot_open_orders: Option<Pubkey>,
        pub perp_account: PerpAccount,
    }

    impl BasketBaseToken {
        pub fn net_value(&self) -> TokenValue {
            self.token.net_value()
        }
    }

    /// Snapshot of one margin account, decoded against one `Group` instance.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct Account {
        address: Pubkey,
        version: LayoutVersion,
        meta_data: MetaData,
        group: Arc<Group>,
        group_address: Pubkey,
        owner: Pubkey,
        info: Option<String>,
        in_margin_basket: Vec<bool>,
        num_in_margin_basket: u8,
        shared_quote_token: BasketToken,
        basket: Vec<BasketBaseToken>,
        basket_index: BasketIndex,
        msrm_amount: u64,
        being_liquidated: bool,
        is_bankrupt: bool,
    }

    /// Builds an `Account` from decoded fields and the group's token registry.
    ///
    /// A non-quote slot is active when the group resolves a token for it.
    /// V1 order-table entries are bucketed per market before slot filtering,
    /// and buckets of inactive slots are dropped.
    pub fn assemble(raw: RawAccount, address: Pubkey, group: Arc<Group>) -> Result<Account, AccountError> {
        let quote_slot = raw.version.quote_slot();
        let quote_info = group
            .token(quote_slot)
            .ok_or(AccountError::MissingQuoteToken { slot: quote_slot })?;

        let mut buckets = match &raw.order_table {
            Some(table) => orders::bucket_order_table(table, quote_slot),
            None => raw
                .perp_accounts
                .iter()
                .take(quote_slot)
                .map(|perp| perp.open_orders.as_ref().map(orders::expand_open_orders).unwrap_or_default())
                .collect(),
        };

        let mut mask = Vec::with_capacity(quote_slot + 1);
        let mut basket = Vec::new();
        for slot in 0..quote_slot {
            let Some(token_info) = group.token(slot) else {
                mask.push(false);
                continue;
            };
            let placed_orders = std::mem::take(&mut buckets[slot]);
            basket.push(BasketBaseToken {
                token: BasketToken::from_raw(token_info, raw.deposits[slot], raw.borrows[slot]),
                spot_open_orders: raw.spot_open_orders[slot],
                perp_account: PerpAccount::from_raw(&raw.perp_accounts[slot], placed_orders),
            });
            mask.push(true);
        }
        mask.push(true);

        let shared_quote_token =
            BasketToken::from_raw(quote_info, raw.deposits[quote_slot], raw.borrows[quote_slot]);
        let basket_index = BasketIndex::from_mask(&mask);

        debug!(
            "assembled {:?} account {}: {} of {} token slots active",
            raw.version,
            address,
            basket_index.active_count(),
            basket_index.slot_count()
        );

        Ok(Account {
            address,
            version: raw.version,
            meta_data: raw.meta_data,
            group_address: raw.group,
            owner: raw.owner,
            info: raw.info,
            in_margin_basket: raw.membership.in_basket(),
            num_in_margin_basket: raw.num_in_margin_basket,
            shared_quote_token,
            basket,
            basket_index,
            msrm_amount: raw.msrm_amount,
            being_liquidated: raw.being_liquidated,
            is_bankrupt: raw.is_bankrupt,
            group,
        })
    }

    impl Account {
        pub fn parse(address: Pubkey, data: &[u8], group: Arc<Group>) -> Result<Self, AccountError> {
            assemble(decoder::decode_any(data)?, address, group)
        }

        pub fn parse_version(
            address: Pubkey,
            data: &[u8],
            version: LayoutVersion,
            group: Arc<Group>,
        ) -> Result<Self, AccountError> {
            assemble(decoder::decode(data, version)?, address, group)
        }

        pub fn address(&self) -> &Pubkey { &self.address }
        pub fn version(&self) -> LayoutVersion { self.version }
        pub fn meta_data(&self) -> MetaData { self.meta_data }
        pub fn group(&self) -> &Arc<Group> { &self.group }
        pub fn group_address(&self) -> &Pubkey { &self.group_address }
        pub fn owner(&self) -> &Pubkey { &self.owner }
        pub fn info(&self) -> Option<&str> { self.info.as_deref() }
        pub fn in_margin_basket(&self) -> &[bool] { &self.in_margin_basket }
        pub fn num_in_margin_basket(&self) -> u8 { self.num_in_margin_basket }
        pub fn shared_quote_token(&self) -> &BasketToken { &self.shared_quote_token }
        pub fn basket(&self) -> &[BasketBaseToken] { &self.basket }
        pub fn basket_index(&self) -> &BasketIndex { &self.basket_index }
        pub fn msrm_amount(&self) -> u64 { self.msrm_amount }
        pub fn being_liquidated(&self) -> bool { self.being_liquidated }
        pub fn is_bankrupt(&self) -> bool { self.is_bankrupt }

        pub fn is_decoded_against(&self, group: &Arc<Group>) -> bool {
            Arc::ptr_eq(&self.group, group)
        }

        pub fn token_slots(&self) -> usize {
            self.version.token_slots()
        }

        pub fn quote_slot(&self) -> usize {
            self.version.quote_slot()
        }

        fn basket_position(&self, slot: usize) -> Option<usize> {
            if slot >= self.quote_slot() {
                return None;
            }
            self.basket_index.sparse_to_dense(slot)
        }

        pub fn basket_item(&self, slot: usize) -> Option<&BasketBaseToken> {
            self.basket_position(slot).map(|position| &self.basket[position])
        }

        pub fn find_basket_item_by_symbol(&self, symbol: &str) -> Option<&BasketBaseToken> {
            self.basket
                .iter()
                .find(|item| item.token.token_info.token.symbol_matches(symbol))
        }

        /// One entry per token slot, quote last.
        pub fn basket_tokens(&self) -> Vec<Option<&BasketToken>> {
            let mut tokens: Vec<Option<&BasketToken>> = self
                .basket_index
                .project(&self.basket)
                .into_iter()
                .map(|item| item.map(|item| &item.token))
                .collect();
            tokens[self.quote_slot()] = Some(&self.shared_quote_token);
            tokens
        }

        pub fn deposits(&self) -> Vec<Option<TokenValue>> {
            self.basket_tokens()
                .into_iter()
                .map(|token| token.map(|token| token.deposit.clone()))
                .collect()
        }

        pub fn borrows(&self) -> Vec<Option<TokenValue>> {
            self.basket_tokens()
                .into_iter()
                .map(|token| token.map(|token| token.borrow.clone()))
                .collect()
        }

        pub fn net_assets(&self) -> Vec<Option<TokenValue>> {
            self.basket_tokens()
                .into_iter()
                .map(|token| token.map(BasketToken::net_value))
                .collect()
        }

        /// One entry per market slot; `None` for inactive slots and for slots without an open-orders account.
        pub fn spot_open_orders(&self) -> Vec<Option<Pubkey>> {
            (0..self.quote_slot())
                .map(|slot| self.basket_item(slot).and_then(|item| item.spot_open_orders))
                .collect()
        }

        pub fn perp_accounts(&self) -> Vec<Option<&PerpAccount>> {
            (0..self.quote_slot())
                .map(|slot| self.basket_item(slot).map(|item| &item.perp_account))
                .collect()
        }

        /// Records the open-orders account just created for the market at `slot`.
        pub fn update_spot_open_orders_for_market(
            &mut self,
            slot: usize,
            spot_open_orders: Pubkey,
        ) -> Result<(), AccountError> {
            let position = self
                .basket_position(slot)
                .ok_or(AccountError::InactiveSlotAccess { slot })?;
            self.basket[position].spot_open_orders = Some(spot_open_orders);
            Ok(())
        }
    }
}

// 11. mod filters (program-account scan for one owner)
pub mod filters {
    use core::mem::offset_of;
    use solana_client::rpc_filter::{Memcmp, RpcFilterType};
    use solana_program::pubkey::Pubkey;
    use crate::{decoder::LayoutVersion, layout::{AccountLayoutV1, AccountLayoutV2}};

    pub const GROUP_OFFSET: usize = offset_of!(AccountLayoutV1, group);
    pub const OWNER_OFFSET: usize = offset_of!(AccountLayoutV1, owner);

    const _: () = assert!(offset_of!(AccountLayoutV2, group) == GROUP_OFFSET);
    const _: () = assert!(offset_of!(AccountLayoutV2, owner) == OWNER_OFFSET);

    /// `getProgramAccounts` filters selecting every account of `owner` in `group`.
    pub fn owner_filters(version: LayoutVersion, group: &Pubkey, owner: &Pubkey) -> Vec<RpcFilterType> {
        vec![
            RpcFilterType::DataSize(version.account_len() as u64),
            RpcFilterType::Memcmp(Memcmp::new_raw_bytes(GROUP_OFFSET, group.to_bytes().to_vec())),
            RpcFilterType::Memcmp(Memcmp::new_raw_bytes(OWNER_OFFSET, owner.to_bytes().to_vec())),
        ]
    }

    /// Whether `data` would pass `owner_filters` for its own layout.
    pub fn matches_owner(data: &[u8], group: &Pubkey, owner: &Pubkey) -> bool {
        LayoutVersion::from_account_len(data.len()).is_some()
            && data[GROUP_OFFSET..GROUP_OFFSET + 32] == group.to_bytes()
            && data[OWNER_OFFSET..OWNER_OFFSET + 32] == owner.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use bytemuck::Zeroable;
    use fixed::types::I80F48;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use solana_program::{program_error::ProgramError, pubkey::Pubkey};
    use crate::{
        account::Account,
        basket_index::BasketIndex,
        constants::{UNUSED_ORDER_MARKET, V1_ACCOUNT_LEN, V1_TOKEN_SLOTS, V2_ACCOUNT_LEN, V2_TOKEN_SLOTS},
        decoder::{self, DataType, LayoutVersion},
        error::AccountError,
        filters,
        fixed_point,
        group::{Group, InterestIndex, Token, TokenInfo},
        layout::{AccountLayoutV1, AccountLayoutV2},
        orders::Side,
    };

    // --- Builders ---

    fn token_info(symbol: &str, decimals: u8, deposit: Decimal, borrow: Decimal) -> TokenInfo {
        TokenInfo {
            token: Token::new(symbol, symbol, Pubkey::new_unique(), decimals),
            root_bank: Pubkey::new_unique(),
            index: InterestIndex { deposit, borrow, last_update: 1_625_000_000 },
        }
    }

    fn make_group(slots: usize, active: &[usize]) -> Arc<Group> {
        let tokens = (0..slots)
            .map(|slot| {
                if slot == slots - 1 {
                    Some(token_info("USDC", 6, dec!(1.5), dec!(1.2)))
                } else if active.contains(&slot) {
                    Some(token_info(&format!("TOK{}", slot), 9, dec!(1.1), dec!(1.3)))
                } else {
                    None
                }
            })
            .collect();
        Arc::new(Group::new(Pubkey::new_unique(), "test", tokens))
    }

    fn v1_layout() -> AccountLayoutV1 {
        let mut layout = AccountLayoutV1::zeroed();
        layout.meta_data.data_type = DataType::Account as u8;
        layout.meta_data.version = 1;
        layout.meta_data.is_initialized = 1;
        layout.owner = [7u8; 32];
        layout.order_market = [UNUSED_ORDER_MARKET; 32];
        layout
    }

    // --- Tests ---

    #[test]
    fn test_layout_lengths() {
        assert_eq!(V1_ACCOUNT_LEN, 2312);
        assert_eq!(V2_ACCOUNT_LEN, 14640);
        assert_eq!(LayoutVersion::from_account_len(V1_ACCOUNT_LEN), Some(LayoutVersion::V1));
        assert_eq!(LayoutVersion::from_account_len(V2_ACCOUNT_LEN), Some(LayoutVersion::V2));
        assert_eq!(LayoutVersion::from_account_len(V1_ACCOUNT_LEN + 1), None);
    }

    #[test]
    fn test_scale_quote_deposit() {
        let value = fixed_point::scale(1_000_000, dec!(1.5), 6);
        assert_eq!(value, dec!(1.5));
        assert_eq!(value.to_string(), "1.500000");
    }

    #[test]
    fn test_shift_rounds_half_even() {
        assert_eq!(fixed_point::shift_to_decimals(dec!(25), 1), dec!(2.5));
        assert_eq!(fixed_point::shift_to_decimals(dec!(0.25), 1), dec!(0.0));
        assert_eq!(fixed_point::shift_to_decimals(dec!(0.35), 1), dec!(0.0));
        assert_eq!(fixed_point::shift_to_decimals(dec!(2.5), 0), dec!(2));
    }

    #[test]
    fn test_shift_rounds_once_in_native_units() {
        let value = fixed_point::scale(1, dec!(2.5000000000000000000000001), 6);
        assert_eq!(value, dec!(0.000003));
        assert_eq!(value.scale(), 6);
    }

    #[test]
    fn test_shift_beyond_max_scale() {
        assert_eq!(fixed_point::scale(1, Decimal::ONE, 29), Decimal::ZERO);
        assert_eq!(
            fixed_point::shift_to_decimals(dec!(150), 29),
            Decimal::from_i128_with_scale(15, 28)
        );
        // ties go to even
        assert_eq!(fixed_point::shift_to_decimals(dec!(50), 30), Decimal::ZERO);
        assert_eq!(fixed_point::shift_to_decimals(dec!(250), 30), Decimal::from_i128_with_scale(2, 28));
        assert_eq!(fixed_point::shift_to_decimals(dec!(-150), 30), Decimal::from_i128_with_scale(-2, 28));
        assert_eq!(fixed_point::shift_to_decimals(dec!(7), u8::MAX), Decimal::ZERO);
    }

    #[test]
    fn test_i80f48_to_decimal() {
        assert_eq!(fixed_point::i80f48_to_decimal(I80F48::from_num(-3)), dec!(-3));
        assert_eq!(fixed_point::i80f48_to_decimal(I80F48::from_num(2.25)), dec!(2.25));
        assert_eq!(fixed_point::i80f48_to_decimal(I80F48::from_num(-0.5)), dec!(-0.5));
    }

    #[test]
    fn test_basket_index_mask_scenario() {
        let index = BasketIndex::from_mask(&[true, false, true]);
        assert_eq!(index.dense_to_sparse(0), Some(0));
        assert_eq!(index.dense_to_sparse(1), Some(2));
        assert_eq!(index.dense_to_sparse(2), None);
        assert_eq!(index.sparse_to_dense(1), None);
        assert_eq!(index.sparse_to_dense(2), Some(1));
        assert_eq!(index.sparse_to_dense(3), None);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let data = bytemuck::bytes_of(&v1_layout()).to_vec();
        for len in [V1_ACCOUNT_LEN - 1, V1_ACCOUNT_LEN + 1] {
            let mut buf = data.clone();
            buf.resize(len, 0);
            assert_eq!(
                decoder::decode(&buf, LayoutVersion::V1).unwrap_err(),
                AccountError::SizeMismatch { expected: V1_ACCOUNT_LEN, actual: len }
            );
        }
        assert_eq!(
            decoder::decode(&data, LayoutVersion::V2).unwrap_err(),
            AccountError::SizeMismatch { expected: V2_ACCOUNT_LEN, actual: V1_ACCOUNT_LEN }
        );
        assert_eq!(decoder::decode_any(&data[..10]).unwrap_err(), AccountError::UnknownLayout { actual: 10 });
    }

    #[test]
    fn test_read_meta_data() {
        let data = bytemuck::bytes_of(&v1_layout()).to_vec();
        let meta = decoder::read_meta_data(&data).unwrap();
        assert_eq!(meta.kind(), Some(DataType::Account));
        assert!(meta.is_initialized);
        assert!(decoder::read_meta_data(&data[..7]).is_none());
    }

    #[test]
    fn test_v1_quote_and_orders() {
        let mut layout = v1_layout();
        layout.info[..5].copy_from_slice(b"alpha");
        layout.deposits[V1_TOKEN_SLOTS - 1] = 1_000_000;
        layout.borrows[V1_TOKEN_SLOTS - 1] = 500_000;
        layout.order_market[0] = 0;
        layout.order_side[0] = Side::Ask as u8;
        layout.order_ids[0] = 42i128.to_le_bytes();
        layout.client_order_ids[0] = 9;
        layout.order_market[1] = UNUSED_ORDER_MARKET;
        layout.order_side[1] = Side::Bid as u8;
        layout.order_ids[1] = 43i128.to_le_bytes();
        let data = bytemuck::bytes_of(&layout).to_vec();

        let group = make_group(V1_TOKEN_SLOTS, &[0]);
        let account = Account::parse(Pubkey::new_unique(), &data, group.clone()).unwrap();

        assert_eq!(account.version(), LayoutVersion::V1);
        assert_eq!(account.info(), Some("alpha"));
        assert!(account.is_decoded_against(&group));
        assert_eq!(account.shared_quote_token().deposit.value.to_string(), "1.500000");
        assert_eq!(account.shared_quote_token().borrow.value, dec!(0.6));
        assert_eq!(account.shared_quote_token().net_value().value, dec!(0.9));

        let perp = account.perp_accounts()[0].unwrap();
        assert_eq!(perp.open_orders.placed_orders.len(), 1);
        assert_eq!(perp.open_orders.placed_orders[0].id, 42);
        assert_eq!(perp.open_orders.placed_orders[0].side, Side::Ask);
    }

    #[test]
    fn test_v2_orders_from_bitmasks() {
        let mut layout = AccountLayoutV2::zeroed();
        layout.in_margin_basket[3] = 2;
        let open_orders = &mut layout.perp_accounts[3].open_orders;
        open_orders.is_free_bits = !0b101;
        open_orders.is_bid_bits = 0b001;
        open_orders.orders[0] = 100i128.to_le_bytes();
        open_orders.orders[2] = 102i128.to_le_bytes();
        open_orders.client_order_ids[2] = 7;
        let data = bytemuck::bytes_of(&layout).to_vec();

        let account = Account::parse(Pubkey::new_unique(), &data, make_group(V2_TOKEN_SLOTS, &[3])).unwrap();
        assert_eq!(account.version(), LayoutVersion::V2);
        assert_eq!(account.info(), None);
        assert!(account.in_margin_basket()[3]);

        let orders = &account.basket_item(3).unwrap().perp_account.open_orders.placed_orders;
        assert_eq!(orders.len(), 2);
        assert_eq!((orders[0].id, orders[0].side), (100, Side::Bid));
        assert_eq!((orders[1].id, orders[1].client_id, orders[1].side), (102, 7, Side::Ask));
    }

    #[test]
    fn test_missing_quote_token() {
        let data = bytemuck::bytes_of(&v1_layout()).to_vec();
        let mut group = (*make_group(V1_TOKEN_SLOTS, &[0])).clone();
        group.tokens[V1_TOKEN_SLOTS - 1] = None;
        let res = Account::parse(Pubkey::new_unique(), &data, Arc::new(group));
        assert_eq!(res.unwrap_err(), AccountError::MissingQuoteToken { slot: V1_TOKEN_SLOTS - 1 });
    }

    #[test]
    fn test_update_inactive_slot() {
        let data = bytemuck::bytes_of(&v1_layout()).to_vec();
        let mut account = Account::parse(Pubkey::new_unique(), &data, make_group(V1_TOKEN_SLOTS, &[0, 2])).unwrap();
        let before = account.clone();

        let res = account.update_spot_open_orders_for_market(1, Pubkey::new_unique());
        assert_eq!(res, Err(AccountError::InactiveSlotAccess { slot: 1 }));
        assert_eq!(account, before);

        let quote = V1_TOKEN_SLOTS - 1;
        let res = account.update_spot_open_orders_for_market(quote, Pubkey::new_unique());
        assert_eq!(res, Err(AccountError::InactiveSlotAccess { slot: quote }));

        let oo = Pubkey::new_unique();
        account.update_spot_open_orders_for_market(2, oo).unwrap();
        assert_eq!(account.spot_open_orders()[2], Some(oo));
        assert_eq!(account.spot_open_orders()[0], None);
    }

    #[test]
    fn test_error_into_program_error() {
        let err: ProgramError = AccountError::InactiveSlotAccess { slot: 4 }.into();
        assert_eq!(err, ProgramError::Custom(3));
    }

    #[test]
    fn test_owner_filter_offsets() {
        let layout = v1_layout();
        let data = bytemuck::bytes_of(&layout).to_vec();
        let owner = Pubkey::new_from_array(layout.owner);
        let group = Pubkey::new_from_array(layout.group);
        assert_eq!(filters::GROUP_OFFSET, 8);
        assert_eq!(filters::OWNER_OFFSET, 40);
        assert!(filters::matches_owner(&data, &group, &owner));
        assert!(!filters::matches_owner(&data, &group, &Pubkey::new_unique()));
    }
}
