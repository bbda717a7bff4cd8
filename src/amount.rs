pub const SATS_PER_BTC: u64 = 100_000_000;

/// `123456` -> `"0.00123456"`.
pub fn format_btc(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}
