use async_trait::async_trait;
use log::*;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use shop_engine::traits::{ChainExplorer, ExplorerError, TokenTransfer};

use crate::{helpers::from_unix_millis, ExplorerConfig, IntegrationError, RestClient};

const PAGE_LIMIT: &str = "50";

#[derive(Debug, Deserialize)]
struct Trc20Page {
    #[serde(default)]
    data: Vec<Trc20Transfer>,
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Trc20Transfer {
    transaction_id: String,
    token_info: TokenInfo,
    block_timestamp: i64,
    from: String,
    to: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    address: String,
}

impl TryFrom<Trc20Transfer> for TokenTransfer {
    type Error = IntegrationError;

    fn try_from(t: Trc20Transfer) -> Result<Self, Self::Error> {
        Ok(TokenTransfer {
            tx_id: t.transaction_id,
            from: t.from,
            to: t.to,
            value: t.value,
            token_contract: Some(t.token_info.address),
            timestamp: from_unix_millis(t.block_timestamp)?,
        })
    }
}

/// Reads incoming TRC-20 transfers from a TronGrid node.
#[derive(Debug, Clone)]
pub struct TronGridExplorer {
    client: RestClient,
    token_contract: Option<String>,
}

impl TronGridExplorer {
    /// When `token_contract` is given only transfers of that token are requested.
    pub fn new(config: &ExplorerConfig, token_contract: Option<String>) -> Result<Self, IntegrationError> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let mut key = HeaderValue::from_str(config.api_key.reveal())
                .map_err(|e| IntegrationError::Initialization(format!("Invalid TronGrid API key. {e}")))?;
            key.set_sensitive(true);
            headers.insert("TRON-PRO-API-KEY", key);
        }
        let client = RestClient::new(&config.url, headers, config.timeout)?;
        Ok(Self { client, token_contract })
    }

    async fn fetch(&self, address: &str) -> Result<Vec<TokenTransfer>, IntegrationError> {
        let path = format!("/v1/accounts/{address}/transactions/trc20");
        let mut params = vec![("only_to", "true"), ("limit", PAGE_LIMIT)];
        if let Some(contract) = &self.token_contract {
            params.push(("contract_address", contract.as_str()));
        }
        let page = self.client.get::<Trc20Page>(&path, &params).await?;
        parse_page(page)
    }
}

fn parse_page(page: Trc20Page) -> Result<Vec<TokenTransfer>, IntegrationError> {
    if !page.success {
        return Err(IntegrationError::RestResponseError("TronGrid reported an unsuccessful query".into()));
    }
    page.data.into_iter().map(TokenTransfer::try_from).collect()
}

impl std::fmt::Display for TronGridExplorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TronGrid({})", self.client.url(""))
    }
}

#[async_trait]
impl ChainExplorer for TronGridExplorer {
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>, ExplorerError> {
        let transfers = self.fetch(address).await?;
        trace!("⛓️ {self} reports {} transfers to {address}", transfers.len());
        Ok(transfers)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PAGE: &str = r#"{
      "data": [{
        "transaction_id": "c3a1",
        "token_info": {"symbol": "USDT", "address": "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", "decimals": 6},
        "block_timestamp": 1700000000000,
        "from": "TSender",
        "to": "TAddressOne",
        "type": "Transfer",
        "value": "22000000"
      }],
      "success": true,
      "meta": {"at": 1700000001000, "page_size": 1}
    }"#;

    #[test]
    fn parses_trc20_page() {
        let page = serde_json::from_str::<Trc20Page>(PAGE).unwrap();
        let transfers = parse_page(page).unwrap();
        assert_eq!(transfers.len(), 1);
        let t = &transfers[0];
        assert_eq!(t.tx_id, "c3a1");
        assert_eq!(t.to, "TAddressOne");
        assert_eq!(t.value, "22000000");
        assert_eq!(t.token_contract.as_deref(), Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        assert_eq!(t.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn unsuccessful_page_is_an_error() {
        let page = serde_json::from_str::<Trc20Page>(r#"{"data": [], "success": false}"#).unwrap();
        assert!(parse_page(page).is_err());
        let empty = serde_json::from_str::<Trc20Page>(r#"{"data": []}"#).unwrap();
        assert!(parse_page(empty).unwrap().is_empty());
    }
}
