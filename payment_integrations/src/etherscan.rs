use async_trait::async_trait;
use log::*;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use shop_common::Secret;
use shop_engine::traits::{ChainExplorer, ExplorerError, TokenTransfer};

use crate::{helpers::from_unix_secs, ExplorerConfig, IntegrationError, RestClient};

#[derive(Debug, Deserialize)]
struct AccountResponse {
    status: String,
    message: String,
    /// A list of transactions on success, an error string otherwise
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtherscanTx {
    hash: String,
    from: String,
    to: String,
    value: String,
    time_stamp: String,
    #[serde(default)]
    is_error: Option<String>,
    #[serde(default)]
    contract_address: String,
}

impl EtherscanTx {
    fn into_transfer(self, token: bool) -> Result<TokenTransfer, IntegrationError> {
        let timestamp = from_unix_secs(&self.time_stamp)?;
        let token_contract = (token && !self.contract_address.is_empty()).then_some(self.contract_address);
        Ok(TokenTransfer {
            tx_id: self.hash,
            from: self.from,
            to: self.to,
            value: self.value,
            token_contract,
            timestamp,
        })
    }
}

/// Reads incoming transfers from the Etherscan account API. Native ether transfers are read from `txlist`, or
/// ERC-20 transfers of a single token from `tokentx` when a contract is given.
#[derive(Debug, Clone)]
pub struct EtherscanExplorer {
    client: RestClient,
    api_key: Secret<String>,
    token_contract: Option<String>,
}

impl EtherscanExplorer {
    pub fn new(config: &ExplorerConfig, token_contract: Option<String>) -> Result<Self, IntegrationError> {
        let client = RestClient::new(&config.url, HeaderMap::new(), config.timeout)?;
        Ok(Self { client, api_key: config.api_key.clone(), token_contract })
    }

    async fn fetch(&self, address: &str) -> Result<Vec<TokenTransfer>, IntegrationError> {
        let mut params = vec![("module", "account"), ("address", address), ("sort", "desc")];
        match &self.token_contract {
            Some(contract) => {
                params.push(("action", "tokentx"));
                params.push(("contractaddress", contract.as_str()));
            },
            None => params.push(("action", "txlist")),
        }
        if !self.api_key.is_empty() {
            params.push(("apikey", self.api_key.reveal().as_str()));
        }
        let response = self.client.get::<AccountResponse>("/api", &params).await?;
        let transfers = parse_response(response, self.token_contract.is_some())?;
        Ok(transfers.into_iter().filter(|t| t.to.eq_ignore_ascii_case(address)).collect())
    }
}

fn parse_response(response: AccountResponse, token: bool) -> Result<Vec<TokenTransfer>, IntegrationError> {
    if response.status != "1" {
        if response.message.starts_with("No transactions found") {
            return Ok(Vec::new());
        }
        let detail = response.result.as_str().unwrap_or_default();
        return Err(IntegrationError::QueryError { status: 200, message: format!("{} {detail}", response.message) });
    }
    let txs = serde_json::from_value::<Vec<EtherscanTx>>(response.result)
        .map_err(|e| IntegrationError::JsonError(e.to_string()))?;
    txs.into_iter()
        .filter(|tx| tx.is_error.as_deref() != Some("1"))
        .map(|tx| tx.into_transfer(token))
        .collect()
}

#[async_trait]
impl ChainExplorer for EtherscanExplorer {
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>, ExplorerError> {
        let transfers = self.fetch(address).await?;
        trace!("⛓️ Etherscan reports {} transfers to {address}", transfers.len());
        Ok(transfers)
    }
}
