use std::collections::HashMap;

use tracing::info;

use crate::error::Result;

/// Maps a trading symbol to the identifier the price provider expects.
pub trait TickerResolver: Send + Sync {
    fn resolve(&self, ticker: &str) -> String;
}

/// Symbols and common names whose CoinGecko id differs from the lowercased input.
/// Anything missing here falls through to the lowercased ticker.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("sol", "solana"),
    ("xrp", "ripple"),
    ("doge", "dogecoin"),
    ("ada", "cardano"),
    ("avax", "avalanche-2"),
    ("avalanche", "avalanche-2"),
    ("dot", "polkadot"),
    ("link", "chainlink"),
    ("atom", "cosmos"),
    ("ltc", "litecoin"),
    ("uni", "uniswap"),
    ("xlm", "stellar"),
    ("algo", "algorand"),
    ("vet", "vechain"),
    ("icp", "internet-computer"),
    ("fil", "filecoin"),
    ("grt", "the-graph"),
    ("bnb", "binancecoin"),
    ("usdt", "tether"),
    ("usdc", "usd-coin"),
    ("matic", "matic-network"),
    ("polygon", "matic-network"),
    ("shib", "shiba-inu"),
    ("trx", "tron"),
    ("ton", "the-open-network"),
    ("apt", "aptos"),
    ("arb", "arbitrum"),
    ("op", "optimism"),
    ("sei", "sei-network"),
    ("inj", "injective-protocol"),
    ("injective", "injective-protocol"),
    ("render", "render-token"),
    ("rndr", "render-token"),
    ("hbar", "hedera-hashgraph"),
    ("hedera", "hedera-hashgraph"),
    ("ftm", "fantom"),
    ("sand", "the-sandbox"),
    ("mana", "decentraland"),
    ("axs", "axie-infinity"),
    ("ape", "apecoin"),
    ("ldo", "lido-dao"),
    ("crv", "curve-dao-token"),
    ("mkr", "maker"),
    ("snx", "synthetix-network-token"),
    ("comp", "compound-governance-token"),
    ("rune", "thorchain"),
    ("mina", "mina-protocol"),
    ("theta", "theta-token"),
    ("egld", "elrond-erd-2"),
    ("xtz", "tezos"),
    ("zec", "zcash"),
    ("xmr", "monero"),
    ("etc", "ethereum-classic"),
    ("bch", "bitcoin-cash"),
    ("wif", "dogwifcoin"),
    ("mog", "mog-coin"),
];

/// Lookup table resolver with a lowercased-ticker fallback. Unknown symbols
/// are never rejected; they degrade to a best-effort id.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let aliases = BUILTIN_ALIASES
            .iter()
            .map(|(alias, id)| (alias.to_string(), id.to_string()))
            .collect();
        Self { aliases }
    }

    /// Add or override entries. Keys are normalized the same way lookups are.
    pub fn extend<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (alias, id) in entries {
            self.aliases.insert(normalize(alias.as_ref()), id.into());
        }
    }

    /// Built-in table, with a JSON object `{"alias": "canonical-id"}` from
    /// `path` merged over it when given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut table = Self::builtin();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)?;
            let extra: HashMap<String, String> = serde_json::from_str(&raw)?;
            info!("Loaded {} ticker aliases from {path}", extra.len());
            table.extend(extra);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }
}

impl TickerResolver for AliasTable {
    fn resolve(&self, ticker: &str) -> String {
        let key = normalize(ticker);
        match self.aliases.get(&key) {
            Some(id) => id.clone(),
            None => key,
        }
    }
}

fn normalize(ticker: &str) -> String {
    ticker.trim().to_lowercase()
}
