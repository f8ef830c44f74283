//! JSON-RPC HTTP clients for the wallet daemon and funding source
//!
//! The wallet daemon speaks plain JSON-RPC over HTTP POST. Replies are
//! decoded leniently: fields the sync does not reason about are ignored,
//! and an empty `result` maps to `Ok(None)` on the calls that allow it.

use super::{
    Account, ChannelMetadata, Claim, ClaimOutput, ClaimValue, ClearFlags, DaemonGateway,
    DaemonStatus, FundingSource, GatewayError, StreamMetadata, StreamUpdate, TransactionSummary,
    Utxo,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;

/// JSON-RPC client for the wallet daemon
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let body = rpc_body(method, params);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let reply: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if let Some(err) = reply.get("error") {
            if !err.is_null() {
                return Err(GatewayError::Rpc(err.to_string()));
            }
        }

        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Build a JSON-RPC request body
fn rpc_body(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 0,
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // Amounts come back as decimal strings from some daemon builds
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn items(result: &Value) -> Option<&Vec<Value>> {
    result
        .get("items")
        .and_then(Value::as_array)
        .or_else(|| result.as_array())
}

fn parse_claim(item: &Value) -> Option<Claim> {
    Some(Claim {
        claim_id: item.get("claim_id")?.as_str()?.to_string(),
        name: item.get("name")?.as_str()?.to_string(),
        value: ClaimValue {
            thumbnail_url: item
                .pointer("/value/thumbnail/url")
                .and_then(Value::as_str)
                .map(String::from),
            stream_size: item
                .pointer("/value/source/size")
                .and_then(as_f64)
                .map(|s| s as u64),
        },
    })
}

fn parse_summary(result: &Value) -> Result<TransactionSummary, GatewayError> {
    let outputs = result
        .get("outputs")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::Malformed("transaction has no outputs".to_string()))?;
    let outputs = outputs
        .iter()
        .filter_map(|o| {
            Some(ClaimOutput {
                claim_id: o.get("claim_id")?.as_str()?.to_string(),
                name: o.get("name")?.as_str()?.to_string(),
            })
        })
        .collect();
    Ok(TransactionSummary { outputs })
}

fn metadata_params(metadata: &StreamMetadata) -> Value {
    let mut params = json!({
        "tags": metadata.tags,
        "languages": metadata.languages,
        "locations": metadata.locations,
    });
    let obj = params.as_object_mut().unwrap();
    if let Some(title) = &metadata.title {
        obj.insert("title".to_string(), json!(title));
    }
    if let Some(description) = &metadata.description {
        obj.insert("description".to_string(), json!(description));
    }
    if let Some(address) = &metadata.claim_address {
        obj.insert("claim_address".to_string(), json!(address));
    }
    if let Some(url) = &metadata.thumbnail_url {
        obj.insert("thumbnail_url".to_string(), json!(url));
    }
    if let Some(fee) = &metadata.fee {
        obj.insert("fee_amount".to_string(), json!(fee.amount));
        obj.insert("fee_currency".to_string(), json!(fee.currency));
        obj.insert("fee_address".to_string(), json!(fee.address));
    }
    if let Some(license) = &metadata.license {
        obj.insert("license".to_string(), json!(license));
    }
    if let Some(release_time) = metadata.release_time {
        obj.insert("release_time".to_string(), json!(release_time));
    }
    if let Some(duration) = metadata.duration_secs {
        obj.insert("duration".to_string(), json!(duration));
    }
    if let Some(channel_id) = &metadata.channel_id {
        obj.insert("channel_id".to_string(), json!(channel_id));
    }
    params
}

fn channel_params(metadata: &ChannelMetadata) -> Value {
    let mut params = json!({
        "tags": metadata.tags,
        "languages": metadata.languages,
        "locations": metadata.locations,
    });
    let obj = params.as_object_mut().unwrap();
    if let Some(title) = &metadata.title {
        obj.insert("title".to_string(), json!(title));
    }
    if let Some(description) = &metadata.description {
        obj.insert("description".to_string(), json!(description));
    }
    if let Some(url) = &metadata.thumbnail_url {
        obj.insert("thumbnail_url".to_string(), json!(url));
    }
    if let Some(cover) = &metadata.cover_url {
        obj.insert("cover_url".to_string(), json!(cover));
    }
    params
}

#[async_trait]
impl DaemonGateway for HttpGateway {
    async fn account_list(&self) -> Result<Vec<Account>, GatewayError> {
        let result = self
            .call("account_list", json!({"page": 1, "page_size": 50}))
            .await?;
        let accounts = items(&result)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(Account {
                            id: item.get("id")?.as_str()?.to_string(),
                            ledger: item.get("ledger")?.as_str()?.to_string(),
                            is_default: item
                                .get("is_default")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                            available: item
                                .pointer("/satoshis/available")
                                .or_else(|| item.get("available"))
                                .and_then(as_f64)
                                .unwrap_or(0.0),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(accounts)
    }

    async fn account_balance(
        &self,
        account_id: Option<&str>,
    ) -> Result<Option<f64>, GatewayError> {
        let mut params = json!({});
        if let Some(id) = account_id {
            params["account_id"] = json!(id);
        }
        let result = self.call("account_balance", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(result.get("available").and_then(as_f64).or_else(|| as_f64(&result)))
    }

    async fn account_fund(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        output_count: u64,
        broadcast: bool,
    ) -> Result<Option<TransactionSummary>, GatewayError> {
        let result = self
            .call(
                "account_fund",
                json!({
                    "from_account": from,
                    "to_account": to,
                    "amount": format!("{:.4}", amount),
                    "outputs": output_count,
                    "broadcast": broadcast,
                }),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_summary(&result).map(Some)
    }

    async fn utxo_list(&self, account_id: &str) -> Result<Option<Vec<Utxo>>, GatewayError> {
        let result = self
            .call(
                "utxo_list",
                json!({"account_id": account_id, "page": 1, "page_size": 10000}),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let utxos = items(&result)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(Utxo {
                            amount: item.get("amount").and_then(as_f64)?,
                            confirmations: item
                                .get("confirmations")
                                .and_then(Value::as_u64)
                                .unwrap_or(0),
                            is_mine: item
                                .get("is_mine")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                            kind: item.get("type")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(utxos))
    }

    async fn address_list(&self, account_id: Option<&str>) -> Result<Vec<String>, GatewayError> {
        let mut params = json!({"page": 1, "page_size": 20});
        if let Some(id) = account_id {
            params["account_id"] = json!(id);
        }
        let result = self.call("address_list", params).await?;
        let addresses = items(&result)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        item.get("address")
                            .and_then(Value::as_str)
                            .or_else(|| item.as_str())
                            .map(String::from)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(addresses)
    }

    async fn address_unused(&self, account_id: &str) -> Result<Option<String>, GatewayError> {
        let result = self
            .call("address_unused", json!({"account_id": account_id}))
            .await?;
        Ok(result.as_str().map(String::from))
    }

    async fn channel_list(&self) -> Result<Option<Vec<Claim>>, GatewayError> {
        let result = self
            .call("channel_list", json!({"page": 1, "page_size": 50}))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let claims = items(&result)
            .map(|items| items.iter().filter_map(parse_claim).collect())
            .unwrap_or_default();
        Ok(Some(claims))
    }

    async fn channel_create(
        &self,
        name: &str,
        bid: f64,
        metadata: ChannelMetadata,
    ) -> Result<TransactionSummary, GatewayError> {
        let mut params = channel_params(&metadata);
        params["name"] = json!(name);
        params["bid"] = json!(format!("{:.4}", bid));
        let result = self.call("channel_create", params).await?;
        parse_summary(&result)
    }

    async fn channel_update(
        &self,
        claim_id: &str,
        metadata: ChannelMetadata,
        clear: ClearFlags,
    ) -> Result<TransactionSummary, GatewayError> {
        let mut params = channel_params(&metadata);
        params["claim_id"] = json!(claim_id);
        params["clear_tags"] = json!(clear.tags);
        params["clear_languages"] = json!(clear.languages);
        params["clear_locations"] = json!(clear.locations);
        let result = self.call("channel_update", params).await?;
        parse_summary(&result)
    }

    async fn stream_create(
        &self,
        name: &str,
        bid: f64,
        file_path: &Path,
        metadata: StreamMetadata,
    ) -> Result<TransactionSummary, GatewayError> {
        let mut params = metadata_params(&metadata);
        params["name"] = json!(name);
        params["bid"] = json!(format!("{:.4}", bid));
        params["file_path"] = json!(file_path.to_string_lossy());
        let result = self.call("publish", params).await?;
        parse_summary(&result)
    }

    async fn stream_update(
        &self,
        claim_id: &str,
        update: StreamUpdate,
    ) -> Result<TransactionSummary, GatewayError> {
        let mut params = metadata_params(&update.metadata);
        params["claim_id"] = json!(claim_id);
        params["clear_tags"] = json!(update.clear_tags);
        params["clear_languages"] = json!(update.clear_languages);
        params["clear_locations"] = json!(update.clear_locations);
        if let Some(size) = update.file_size {
            params["file_size"] = json!(size);
        }
        let result = self.call("stream_update", params).await?;
        parse_summary(&result)
    }

    async fn claim_search(&self, claim_id: &str) -> Result<Vec<Claim>, GatewayError> {
        let result = self
            .call("claim_search", json!({"claim_id": claim_id}))
            .await?;
        let claims = items(&result)
            .map(|items| items.iter().filter_map(parse_claim).collect())
            .unwrap_or_default();
        Ok(claims)
    }

    async fn status(&self) -> Result<DaemonStatus, GatewayError> {
        let result = self.call("status", json!({})).await?;
        Ok(DaemonStatus {
            wallet_blocks: result
                .pointer("/wallet/blocks")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            blocks_behind: result
                .pointer("/wallet/blocks_behind")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }
}

/// JSON-RPC client for the external funding node
pub struct HttpFundingSource {
    client: reqwest::Client,
    url: String,
    /// Regtest nodes expose an on-demand block generator
    generator: bool,
}

impl HttpFundingSource {
    pub fn new(url: impl Into<String>, generator: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            generator,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let body = rpc_body(method, params);
        let reply: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if let Some(err) = reply.get("error") {
            if !err.is_null() {
                return Err(GatewayError::Rpc(err.to_string()));
            }
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl FundingSource for HttpFundingSource {
    async fn send(&self, address: &str, amount: f64) -> Result<String, GatewayError> {
        let result = self
            .call("sendtoaddress", json!([address, amount]))
            .await?;
        result
            .as_str()
            .map(String::from)
            .ok_or_else(|| GatewayError::Malformed("sendtoaddress returned no txid".to_string()))
    }

    async fn generate(&self, blocks: u32) -> Result<Vec<String>, GatewayError> {
        let result = self.call("generate", json!([blocks])).await?;
        Ok(result
            .as_array()
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| h.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn can_generate(&self) -> bool {
        self.generator
    }
}
