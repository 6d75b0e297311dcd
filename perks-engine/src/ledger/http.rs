//! HTTP ledger client
//!
//! Talks to the hosted backend's two surfaces:
//! - `functions/v1/{name}`: the named workflow functions
//!   (`add-stamp-manually`, `redeem-reward`, `get-analytics`,
//!   `get-customer-segments`) and the `get_store_customers` RPC
//! - `rest/v1/{table}`: filtered row reads
//!
//! A workflow function can reject a request at the business-rule level
//! while still answering 200 with `{"error": "..."}` in the body; that
//! message is what the operator sees, so it is preserved verbatim.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::core::Config;
use shared::models::{
    AnalyticsSnapshot, CardDetails, Customer, CustomerCardRow, CustomerMatch, CustomerSegments,
    Location, LoyaltyCard, Reward, Store,
};

use super::{LedgerClient, LedgerError, LedgerResult};

/// HTTP client for the hosted ledger
#[derive(Debug, Clone)]
pub struct FunctionsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    token: Option<String>,
}

impl FunctionsClient {
    /// Create a new client from configuration
    pub fn new(config: &Config) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            token: None,
        })
    }

    /// Set the authenticated user's access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn apply_auth(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.clone());
        }
        // Fall back to the api key as bearer when no user token is set
        if let Some(bearer) = self.token.as_ref().or(self.api_key.as_ref()) {
            request = request.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
        }
        request
    }

    /// Invoke a hosted workflow function and decode its JSON response.
    async fn invoke<T: DeserializeOwned>(
        &self,
        function: &str,
        body: &impl Serialize,
    ) -> LedgerResult<T> {
        let url = format!("{}/functions/v1/{}", self.base_url, function);
        let request = self.apply_auth(self.client.post(&url).json(body));
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Invoke a workflow function that answers with an ack (or an
    /// in-body error).
    async fn invoke_unit(&self, function: &str, body: &impl Serialize) -> LedgerResult<()> {
        let value: serde_json::Value = self.invoke(function, body).await?;
        match value.get("error").and_then(|e| e.as_str()) {
            Some(msg) => Err(LedgerError::Rejected(msg.to_string())),
            None => Ok(()),
        }
    }

    /// Call a database RPC on the REST surface.
    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        body: &impl Serialize,
    ) -> LedgerResult<T> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let request = self.apply_auth(self.client.post(&url).json(body));
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Filtered row read from the REST surface.
    async fn rest_get<T: DeserializeOwned>(&self, path_and_query: &str) -> LedgerResult<Vec<T>> {
        let url = format!("{}/rest/v1/{}", self.base_url, path_and_query);
        let request = self.apply_auth(self.client.get(&url));
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    async fn rest_get_single<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        missing: &str,
    ) -> LedgerResult<T> {
        self.rest_get::<T>(path_and_query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::NotFound(missing.to_string()))
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> LedgerResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_error_message(&text);
            return match status {
                StatusCode::NOT_FOUND => Err(LedgerError::NotFound(
                    message.unwrap_or_else(|| "Resource not found".to_string()),
                )),
                StatusCode::BAD_REQUEST
                | StatusCode::FORBIDDEN
                | StatusCode::CONFLICT
                | StatusCode::UNPROCESSABLE_ENTITY => match message {
                    Some(msg) => Err(LedgerError::Rejected(msg)),
                    None => Err(LedgerError::Transport(format!("HTTP {status}"))),
                },
                _ => Err(LedgerError::Transport(format!("HTTP {status}"))),
            };
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

/// Pull a human-readable message out of an error body, if there is one.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

// ========== Wire rows ==========

#[derive(serde::Deserialize)]
struct RosterRow {
    id: Uuid,
    stamps: i32,
    max_stamps: i32,
    customer: RosterCustomer,
}

#[derive(serde::Deserialize)]
struct RosterCustomer {
    id: Uuid,
    full_name: String,
}

#[derive(serde::Deserialize)]
struct CardRow {
    #[serde(flatten)]
    card: LoyaltyCard,
    customer: Customer,
    location: LocationRow,
}

#[derive(serde::Deserialize)]
struct LocationRow {
    #[serde(flatten)]
    location: Location,
    store: Store,
}

#[derive(serde::Deserialize)]
struct StoreCustomerRow {
    id: Uuid,
    full_name: String,
    email: String,
}

#[derive(serde::Deserialize)]
struct CardIdRow {
    id: Uuid,
    customer_id: Uuid,
    location_id: Uuid,
    stamps: i32,
    max_stamps: i32,
    #[serde(default)]
    created_at: i64,
}

#[async_trait]
impl LedgerClient for FunctionsClient {
    async fn add_stamp(
        &self,
        loyalty_card_id: Uuid,
        store_id: Uuid,
        undo: bool,
    ) -> LedgerResult<()> {
        self.invoke_unit(
            "add-stamp-manually",
            &json!({
                "loyalty_card_id": loyalty_card_id,
                "store_id": store_id,
                "undo": undo,
            }),
        )
        .await
    }

    async fn redeem_reward(
        &self,
        loyalty_card_id: Uuid,
        reward_id: Uuid,
        undo: bool,
    ) -> LedgerResult<()> {
        self.invoke_unit(
            "redeem-reward",
            &json!({
                "loyalty_card_id": loyalty_card_id,
                "reward_id": reward_id,
                "undo": undo,
            }),
        )
        .await
    }

    async fn fetch_analytics(&self, store_id: Uuid) -> LedgerResult<AnalyticsSnapshot> {
        self.invoke("get-analytics", &json!({ "store_id": store_id }))
            .await
    }

    async fn fetch_customer_segments(&self, store_id: Uuid) -> LedgerResult<CustomerSegments> {
        self.invoke("get-customer-segments", &json!({ "store_id": store_id }))
            .await
    }

    async fn fetch_roster(&self, location_id: Uuid) -> LedgerResult<Vec<CustomerCardRow>> {
        let rows: Vec<RosterRow> = self
            .rest_get(&format!(
                "loyalty_cards?location_id=eq.{location_id}&select=id,stamps,max_stamps,customer:customers!inner(id,full_name)"
            ))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| CustomerCardRow {
                loyalty_card_id: row.id,
                customer_id: row.customer.id,
                full_name: row.customer.full_name,
                stamps: row.stamps,
                max_stamps: row.max_stamps,
            })
            .collect())
    }

    async fn fetch_card(&self, loyalty_card_id: Uuid) -> LedgerResult<CardDetails> {
        let row: CardRow = self
            .rest_get_single(
                &format!(
                    "loyalty_cards?id=eq.{loyalty_card_id}&select=*,customer:customers!inner(*),location:locations!inner(*,store:stores!inner(*))"
                ),
                "No Loyalty Card Found. Please sign up using a valid QR code from a store.",
            )
            .await?;
        Ok(CardDetails {
            card: row.card,
            customer: row.customer,
            location: row.location.location,
            store: row.location.store,
        })
    }

    async fn fetch_rewards(&self, store_id: Uuid) -> LedgerResult<Vec<Reward>> {
        self.rest_get(&format!(
            "rewards?store_id=eq.{store_id}&is_active=eq.true&select=*"
        ))
        .await
    }

    async fn find_customer(
        &self,
        store_id: Uuid,
        email: &str,
    ) -> LedgerResult<Option<CustomerMatch>> {
        // The directory RPC returns every customer of the store; the email
        // match happens client-side, case-insensitively.
        let customers: Vec<StoreCustomerRow> = self
            .rpc("get_store_customers", &json!({ "p_store_id": store_id }))
            .await?;

        let Some(found) = customers
            .into_iter()
            .find(|c| c.email.eq_ignore_ascii_case(email))
        else {
            return Ok(None);
        };

        let card: Option<CardIdRow> = self
            .rest_get(&format!(
                "loyalty_cards?customer_id=eq.{}&select=*&limit=1",
                found.id
            ))
            .await?
            .into_iter()
            .next();

        Ok(Some(CustomerMatch {
            customer_id: found.id,
            full_name: found.full_name,
            email: found.email,
            loyalty_card_id: card.map(|c| c.id),
        }))
    }

    async fn fetch_store_for_owner(&self, user_id: Uuid) -> LedgerResult<Option<Store>> {
        Ok(self
            .rest_get(&format!("stores?owner_id=eq.{user_id}&select=*&limit=1"))
            .await?
            .into_iter()
            .next())
    }

    async fn fetch_card_for_user(&self, user_id: Uuid) -> LedgerResult<Option<LoyaltyCard>> {
        let customer: Option<Customer> = self
            .rest_get(&format!("customers?user_id=eq.{user_id}&select=*&limit=1"))
            .await?
            .into_iter()
            .next();
        let Some(customer) = customer else {
            return Ok(None);
        };

        let card: Option<CardIdRow> = self
            .rest_get(&format!(
                "loyalty_cards?customer_id=eq.{}&select=*&limit=1",
                customer.id
            ))
            .await?
            .into_iter()
            .next();

        Ok(card.map(|c| LoyaltyCard {
            id: c.id,
            customer_id: c.customer_id,
            location_id: c.location_id,
            stamps: c.stamps,
            max_stamps: c.max_stamps,
            created_at: c.created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message_variants() {
        assert_eq!(
            extract_error_message(r#"{"error": "Insufficient stamps"}"#),
            Some("Insufficient stamps".to_string())
        );
        assert_eq!(
            extract_error_message(r#"{"message": "insufficient permissions"}"#),
            Some("insufficient permissions".to_string())
        );
        assert_eq!(extract_error_message("not json"), None);
        assert_eq!(extract_error_message(r#"{"other": 1}"#), None);
    }

    #[test]
    fn test_roster_row_decodes_nested_customer() {
        let json = r#"{
            "id": "6191c5b2-c451-4eeb-9be2-51ec2f4048c3",
            "stamps": 4,
            "max_stamps": 10,
            "customer": {"id": "7191c5b2-c451-4eeb-9be2-51ec2f4048c3", "full_name": "Alice"}
        }"#;
        let row: RosterRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.stamps, 4);
        assert_eq!(row.customer.full_name, "Alice");
    }
}
