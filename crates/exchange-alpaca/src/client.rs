//! Alpaca REST API client with rate limiting.
//!
//! Two hosts are involved: the trading host (account, positions, orders,
//! option contracts) and the market data host (stock trades, quotes, bars
//! and option snapshots). Every request waits on a shared governor limiter.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use ivspread_core::{
    AccountSnapshot, AlpacaConfig, OptionContract, OptionQuote, OrderAck, OrderSide,
    PositionSnapshot, PriceBar,
};
use nonzero_ext::nonzero;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::error::{AlpacaError, Result};
use crate::types::{
    OrderRequest, RawAccount, RawBarsResponse, RawContractsResponse, RawLatestQuoteResponse,
    RawLatestTradeResponse, RawOrder, RawPosition, RawSnapshotsResponse,
};

// =============================================================================
// Constants
// =============================================================================

pub const ALPACA_PAPER_URL: &str = "https://paper-api.alpaca.markets";
pub const ALPACA_LIVE_URL: &str = "https://api.alpaca.markets";
pub const ALPACA_DATA_URL: &str = "https://data.alpaca.markets";

const API_KEY_HEADER: &str = "APCA-API-KEY-ID";
const API_SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// Upper bound on contracts requested per listing call.
const CONTRACTS_PAGE_LIMIT: usize = 1000;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct AlpacaClientConfig {
    /// Trading API host.
    pub trading_url: String,
    /// Market data API host.
    pub data_url: String,
    pub requests_per_minute: NonZeroU32,
    pub timeout_secs: u64,
}

impl Default for AlpacaClientConfig {
    fn default() -> Self {
        Self {
            trading_url: ALPACA_PAPER_URL.to_string(),
            data_url: ALPACA_DATA_URL.to_string(),
            requests_per_minute: nonzero!(200u32),
            timeout_secs: 30,
        }
    }
}

impl From<&AlpacaConfig> for AlpacaClientConfig {
    fn from(config: &AlpacaConfig) -> Self {
        Self {
            trading_url: config.base_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            requests_per_minute: NonZeroU32::new(config.requests_per_minute)
                .unwrap_or(nonzero!(200u32)),
            timeout_secs: config.timeout_secs,
        }
    }
}

impl AlpacaClientConfig {
    /// Points both hosts at the same URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.trading_url.clone_from(&url);
        self.data_url = url;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// AlpacaClient
// =============================================================================

pub struct AlpacaClient {
    config: AlpacaClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    api_key: SecretString,
    secret_key: SecretString,
}

impl std::fmt::Debug for AlpacaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaClient")
            .field("trading_url", &self.config.trading_url)
            .field("data_url", &self.config.data_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl AlpacaClient {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        config: AlpacaClientConfig,
        api_key: SecretString,
        secret_key: SecretString,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AlpacaError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            api_key,
            secret_key,
        })
    }

    /// Builds a client from application configuration.
    ///
    /// # Errors
    /// Returns `AlpacaError::Authentication` if either key is missing.
    pub fn from_config(config: &AlpacaConfig) -> Result<Self> {
        let (key, secret) = config
            .credentials()
            .map_err(|e| AlpacaError::Authentication(e.to_string()))?;
        Self::new(
            AlpacaClientConfig::from(config),
            SecretString::from(key.to_string()),
            SecretString::from(secret.to_string()),
        )
    }

    #[must_use]
    pub fn trading_url(&self) -> &str {
        &self.config.trading_url
    }

    #[must_use]
    pub fn data_url(&self) -> &str {
        &self.config.data_url
    }

    /// Rejects symbols that could escape the URL path.
    fn validate_symbol(symbol: &str) -> Result<&str> {
        if symbol.is_empty() {
            return Err(AlpacaError::InvalidSymbol("symbol cannot be empty".to_string()));
        }
        if symbol.len() > 32 {
            return Err(AlpacaError::InvalidSymbol(format!(
                "symbol exceeds 32 characters: {symbol}"
            )));
        }
        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            || symbol.contains("..")
        {
            return Err(AlpacaError::InvalidSymbol(symbol.to_string()));
        }
        Ok(symbol)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .header(API_SECRET_HEADER, self.secret_key.expose_secret())
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, base: &str, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{base}{path}");
        debug!("GET {}", url);

        let response = self.authed(self.http.get(&url)).send().await?;
        Self::handle_response(response).await
    }

    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.trading_url, path);
        let body_json = serde_json::to_string(body)?;
        debug!("POST {} body_len={}", url, body_json.len());

        let response = self
            .authed(self.http.post(&url))
            .header("Content-Type", "application/json")
            .body(body_json)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.config.trading_url, path);
        debug!("DELETE {}", url);

        let response = self.authed(self.http.delete(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AlpacaError::api(status.as_u16(), text));
        }
        Ok(())
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(AlpacaError::rate_limit(retry_after));
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let text = response.text().await.unwrap_or_default();
            return Err(AlpacaError::Authentication(format!("{status}: {text}")));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AlpacaError::api(status.as_u16(), text));
        }

        let body = response.json::<T>().await?;
        Ok(body)
    }

    // =========================================================================
    // Stock Market Data
    // =========================================================================

    /// Price of the latest trade.
    ///
    /// # Errors
    /// Returns error if the API call fails or carries no trade.
    pub async fn latest_trade_price(&self, symbol: &str) -> Result<Decimal> {
        let symbol = Self::validate_symbol(symbol)?;
        let path = format!("/v2/stocks/{symbol}/trades/latest");
        let response: RawLatestTradeResponse = self.get(&self.config.data_url, &path).await?;

        let trade = response
            .trade
            .ok_or_else(|| AlpacaError::NotFound(format!("latest trade for {symbol}")))?;
        Ok(Decimal::try_from(trade.price)?)
    }

    /// Midpoint of the latest quote.
    ///
    /// # Errors
    /// Returns error if the API call fails or the quote is one-sided.
    pub async fn latest_quote_mid(&self, symbol: &str) -> Result<Decimal> {
        let symbol = Self::validate_symbol(symbol)?;
        let path = format!("/v2/stocks/{symbol}/quotes/latest");
        let response: RawLatestQuoteResponse = self.get(&self.config.data_url, &path).await?;

        let mid = response
            .quote
            .and_then(|q| q.mid())
            .ok_or_else(|| AlpacaError::NotFound(format!("two-sided quote for {symbol}")))?;
        Ok(Decimal::try_from(mid)?)
    }

    /// Most recent `limit` bars, oldest first.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<PriceBar>> {
        let symbol = Self::validate_symbol(symbol)?;
        let path = format!("/v2/stocks/{symbol}/bars?timeframe={timeframe}&limit={limit}");
        let response: RawBarsResponse = self.get(&self.config.data_url, &path).await?;

        let mut bars = response
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(PriceBar::try_from)
            .collect::<Result<Vec<_>>>()?;
        bars.sort_by_key(|b| b.timestamp);
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        Ok(bars)
    }

    // =========================================================================
    // Options
    // =========================================================================

    /// Active, tradable contracts on `underlying`.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn option_contracts(&self, underlying: &str) -> Result<Vec<OptionContract>> {
        let underlying = Self::validate_symbol(underlying)?;
        let path = format!(
            "/v2/options/contracts?underlying_symbols={underlying}&status=active&limit={CONTRACTS_PAGE_LIMIT}"
        );
        let response: RawContractsResponse = self.get(&self.config.trading_url, &path).await?;

        response
            .option_contracts
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.tradable != Some(false))
            .map(OptionContract::try_from)
            .collect()
    }

    /// IV, greeks and quote for one contract.
    ///
    /// # Errors
    /// Returns `AlpacaError::NotFound` if the snapshot is absent.
    pub async fn option_snapshot(&self, contract_symbol: &str) -> Result<OptionQuote> {
        let contract_symbol = Self::validate_symbol(contract_symbol)?;
        let path = format!("/v1beta1/options/snapshots?symbols={contract_symbol}");
        let response: RawSnapshotsResponse = self.get(&self.config.data_url, &path).await?;

        response
            .snapshots
            .and_then(|mut s| s.remove(contract_symbol))
            .ok_or_else(|| AlpacaError::NotFound(format!("snapshot for {contract_symbol}")))
            .and_then(OptionQuote::try_from)
    }

    // =========================================================================
    // Account & Trading
    // =========================================================================

    /// # Errors
    /// Returns error if the API call fails.
    pub async fn account(&self) -> Result<AccountSnapshot> {
        let raw: RawAccount = self.get(&self.config.trading_url, "/v2/account").await?;
        AccountSnapshot::try_from(raw)
    }

    /// Open position in `symbol`, `None` when Alpaca answers 404.
    ///
    /// # Errors
    /// Returns error for any other failure.
    pub async fn position(&self, symbol: &str) -> Result<Option<PositionSnapshot>> {
        let symbol = Self::validate_symbol(symbol)?;
        let path = format!("/v2/positions/{symbol}");
        match self.get::<RawPosition>(&self.config.trading_url, &path).await {
            Ok(raw) => PositionSnapshot::try_from(raw).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Submits a day market order.
    ///
    /// # Errors
    /// Returns error if the quantity is not positive or the API call fails.
    pub async fn submit_market_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: OrderSide,
    ) -> Result<OrderAck> {
        let symbol = Self::validate_symbol(symbol)?;
        if qty <= Decimal::ZERO {
            return Err(AlpacaError::api(422, format!("quantity must be positive, got {qty}")));
        }
        let request = OrderRequest::market(symbol, qty, side);
        let raw: RawOrder = self.post("/v2/orders", &request).await?;
        OrderAck::try_from(raw)
    }

    /// Liquidates the whole position in `symbol`.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn close_position(&self, symbol: &str) -> Result<()> {
        let symbol = Self::validate_symbol(symbol)?;
        self.delete(&format!("/v2/positions/{symbol}")).await
    }
}
