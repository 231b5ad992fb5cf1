//! Target network parameters, in the shape `wallet_addEthereumChain` expects.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    /// Hex chain id, e.g. "0x89"
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NetworkParams {
    pub fn polygon_mainnet() -> Self {
        Self {
            chain_id: "0x89".to_string(), // 137
            chain_name: "Polygon Mainnet".to_string(),
            native_currency: NativeCurrency {
                name: "MATIC Token".to_string(),
                symbol: "MATIC".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://polygon-rpc.com".to_string()],
            block_explorer_urls: vec!["https://polygonscan.com/".to_string()],
        }
    }

    /// Wallets report chain ids as hex strings with inconsistent casing.
    pub fn matches(&self, chain_id: &str) -> bool {
        chain_id.eq_ignore_ascii_case(&self.chain_id)
    }
}
