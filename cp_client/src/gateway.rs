//! HTTP client for the lobby/signing gateway.
//!
//! The gateway lists open tables, resolves a table id to its account address
//! and signs-and-submits actions and seat instructions with the custodial
//! key of the participant.

use async_trait::async_trait;
use chain_poker::{
    DirectoryError, ParticipantId, SignerError, SubmissionError, SubmitError, TableId,
    remote::{
        ActionRequest, Address, Signer, TableDirectory, TableInstruction, TableSummary,
        TransactionId,
    },
};
use log::{debug, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// API client for the gateway
#[derive(Clone, Debug)]
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
    participant: ParticipantId,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: Address,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a, T> {
    participant: ParticipantId,
    #[serde(flatten)]
    request: &'a T,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    signature: TransactionId,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, participant: ParticipantId) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            participant,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a signing request on behalf of the participant.
    async fn submit<T: Serialize + Sync>(
        &self,
        path: &str,
        request: &T,
        table_id: TableId,
        what: &(dyn std::fmt::Display + Sync),
    ) -> Result<TransactionId, SubmitError> {
        let body = SubmitRequest {
            participant: self.participant,
            request,
        };
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
            warn!("Table {table_id}: gateway refused {what} ({status})");
            return Err(classify_failure(status, error_text));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::InvalidResponse(e.to_string()))?;
        Ok(body.signature)
    }
}

#[async_trait]
impl TableDirectory for GatewayClient {
    async fn list_tables(&self) -> Result<Vec<TableSummary>, DirectoryError> {
        let response = self
            .client
            .get(self.url("/api/tables"))
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Unavailable(format!(
                "listing tables returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("Failed to parse table list: {e}")))
    }

    async fn table_address(&self, table_id: TableId) -> Result<Address, DirectoryError> {
        let response = self
            .client
            .get(self.url(&format!("/api/tables/{table_id}/address")))
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(DirectoryError::UnknownTable(table_id)),
            status if !status.is_success() => Err(DirectoryError::Unavailable(format!(
                "resolving table {table_id} returned {status}"
            ))),
            _ => {
                let body: AddressResponse = response.json().await.map_err(|e| {
                    DirectoryError::Unavailable(format!("Failed to parse address: {e}"))
                })?;
                debug!("Table {table_id} lives at {}", body.address);
                Ok(body.address)
            }
        }
    }
}

#[async_trait]
impl Signer for GatewayClient {
    async fn sign_and_submit(&self, request: ActionRequest) -> Result<TransactionId, SubmitError> {
        self.submit("/api/actions", &request, request.table_id, &request.action)
            .await
    }

    async fn submit_instruction(
        &self,
        instruction: TableInstruction,
    ) -> Result<TransactionId, SubmitError> {
        self.submit(
            "/api/instructions",
            &instruction,
            instruction.table_id(),
            &instruction,
        )
        .await
    }
}

/// Map a gateway error status onto the signing/submission taxonomy.
pub fn classify_failure(status: StatusCode, body: String) -> SubmitError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SignerError::Declined(body).into(),
        StatusCode::SERVICE_UNAVAILABLE => SignerError::Unavailable.into(),
        status if status.is_client_error() => SubmissionError::Rejected(body).into(),
        status => SubmissionError::Transport(format!("{status}: {body}")).into(),
    }
}
