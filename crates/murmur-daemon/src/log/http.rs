//! HTTP/JSON-RPC event log client.
//!
//! Talks to the external ledger's RPC surface with endpoint failover.
//! Subscriptions are cursor polls; submissions wait for finality
//! within a bounded window.

use super::{EventLog, EventSubscription};
use async_trait::async_trait;
use murmur_types::{GroupAction, LogEntry, MurmurError, MurmurResult, SubmitReceipt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const ENTRIES_PAGE_SIZE: u64 = 256;
/// Consecutive failed polls tolerated before the subscription reports
/// a disconnect.
const MAX_POLL_FAILURES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SubmitStatus {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    receipt: Option<SubmitReceipt>,
}

#[derive(Debug, Clone)]
pub struct HttpEventLog {
    client: reqwest::Client,
    endpoints: Vec<String>,
    poll_interval: Duration,
    submit_timeout: Duration,
}

impl HttpEventLog {
    pub fn new(
        endpoints: Vec<String>,
        poll_interval: Duration,
        submit_timeout: Duration,
    ) -> MurmurResult<Self> {
        if endpoints.is_empty() {
            return Err(MurmurError::Config(
                "At least one event log endpoint is required".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MurmurError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            poll_interval,
            submit_timeout,
        })
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> MurmurResult<serde_json::Value> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        for endpoint in &self.endpoints {
            debug!("RPC call to {}: {}", endpoint, method);

            match self.client.post(endpoint).json(&request).send().await {
                Ok(response) => {
                    let json: serde_json::Value = match response.json().await {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to parse RPC response from {}: {}", endpoint, e);
                            continue;
                        }
                    };

                    if let Some(error) = json.get("error") {
                        warn!("RPC error from {}: {}", endpoint, error);
                        continue;
                    }

                    if let Some(result) = json.get("result") {
                        if !result.is_null() {
                            return Ok(result.clone());
                        }
                    }
                }
                Err(e) => {
                    warn!("RPC request failed to {}: {}", endpoint, e);
                    continue;
                }
            }
        }

        Err(MurmurError::Network("All RPC endpoints failed".into()))
    }

    async fn get_entries(&self, after: u64, limit: u64) -> MurmurResult<Vec<LogEntry>> {
        let result = self
            .rpc_call("murmur_getEntries", serde_json::json!([after, limit]))
            .await?;
        serde_json::from_value(result).map_err(|e| MurmurError::Serialization(e.to_string()))
    }

    async fn submission_status(&self, submission_id: &str) -> MurmurResult<SubmitStatus> {
        let result = self
            .rpc_call("murmur_getSubmission", serde_json::json!([submission_id]))
            .await?;
        serde_json::from_value(result).map_err(|e| MurmurError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl EventLog for HttpEventLog {
    async fn subscribe(
        &self,
        from_sequence: u64,
    ) -> MurmurResult<Box<dyn EventSubscription>> {
        Ok(Box::new(HttpSubscription {
            log: self.clone(),
            cursor: from_sequence,
            buffered: VecDeque::new(),
        }))
    }

    async fn submit(&self, action: GroupAction) -> MurmurResult<SubmitReceipt> {
        let action_json =
            serde_json::to_value(&action).map_err(|e| MurmurError::Serialization(e.to_string()))?;

        let result = self
            .rpc_call("murmur_submitAction", serde_json::json!([action_json]))
            .await?;
        let submission_id = result
            .as_str()
            .ok_or_else(|| MurmurError::Serialization("Expected submission id".into()))?
            .to_string();

        // Poll until the ledger finalizes or the window closes.
        let deadline = Instant::now() + self.submit_timeout;
        loop {
            let status = self.submission_status(&submission_id).await?;
            match status.status.as_str() {
                "finalized" => {
                    return status.receipt.ok_or_else(|| {
                        MurmurError::Serialization("Finalized submission missing receipt".into())
                    });
                }
                "reverted" => {
                    return Err(MurmurError::TransactionReverted(
                        status.reason.unwrap_or_else(|| "Rejected by ledger".into()),
                    ));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(MurmurError::TransactionTimeout {
                    timeout_secs: self.submit_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

struct HttpSubscription {
    log: HttpEventLog,
    cursor: u64,
    buffered: VecDeque<LogEntry>,
}

#[async_trait]
impl EventSubscription for HttpSubscription {
    async fn next_entry(&mut self) -> MurmurResult<LogEntry> {
        let mut failures = 0u32;
        loop {
            if let Some(entry) = self.buffered.pop_front() {
                self.cursor = entry.sequence;
                return Ok(entry);
            }

            match self.log.get_entries(self.cursor, ENTRIES_PAGE_SIZE).await {
                Ok(entries) if !entries.is_empty() => {
                    self.buffered.extend(entries);
                }
                Ok(_) => {
                    failures = 0;
                    tokio::time::sleep(self.log.poll_interval).await;
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_POLL_FAILURES {
                        return Err(MurmurError::EventStreamDisconnected(e.to_string()));
                    }
                    tokio::time::sleep(self.log.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_endpoints() {
        let err = HttpEventLog::new(vec![], Duration::from_secs(1), Duration::from_secs(30))
            .unwrap_err();
        assert!(matches!(err, MurmurError::Config(_)));
    }

    #[test]
    fn test_submit_status_parsing() {
        let reverted: SubmitStatus = serde_json::from_value(serde_json::json!({
            "status": "reverted",
            "reason": "group exists"
        }))
        .unwrap();
        assert_eq!(reverted.status, "reverted");
        assert_eq!(reverted.reason.as_deref(), Some("group exists"));
        assert!(reverted.receipt.is_none());
    }
}
