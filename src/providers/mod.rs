//! Feed adapters: one per provider family, each owning its own cache,
//! throttle and retry policy.

pub mod coingecko;
pub mod exchange_rate;
pub mod util;
pub mod yahoo;

pub use coingecko::CoinGeckoProvider;
pub use exchange_rate::ExchangeRateApiSource;
pub use yahoo::YahooProvider;
