//! The transport seam.
//!
//! A [`Connector`] produces an [`Agent`] addressed at a host. The agent
//! answers the trust-root handshake and carries individual [`Call`]s, each
//! signed by the identity it is made under (see [`seal`]).

use std::{future::Future, time::Duration};

use agora_core::{
  Identity, Principal,
  signature::CallSignature,
  wire::{Method, ROOT_HEADER, StatusReply},
};
use reqwest::Client;
use serde_json::Value;

use crate::{config::GatewayConfig, error::TransportError};

/// One remote call as the transport sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  /// Endpoint id of the target service.
  pub endpoint: String,
  pub method:   Method,
  /// The identity the call is made under.
  pub identity: Identity,
  /// Fingerprint of the trusted root key.
  pub root:     String,
  /// Positional arguments as a JSON array.
  pub args:     Value,
}

impl Call {
  /// The principal the call is attributed to.
  pub fn caller(&self) -> &Principal { self.identity.principal() }
}

pub trait Connector: Send + Sync + 'static {
  type Agent: Agent;

  fn connect(
    &self,
    host: String,
  ) -> impl Future<Output = Result<Self::Agent, TransportError>> + Send + '_;
}

pub trait Agent: Send + Sync + 'static {
  /// Fetch the server's status, including its root key.
  fn status(
    &self,
  ) -> impl Future<Output = Result<StatusReply, TransportError>> + Send + '_;

  /// Carry one call and return the raw reply value.
  fn call(
    &self,
    call: Call,
  ) -> impl Future<Output = Result<Value, TransportError>> + Send + '_;
}

/// Interpret a raw HTTP reply. Any non-200 status is a transport-level
/// rejection, never a business refusal.
pub fn read_reply(status: u16, body: &[u8]) -> Result<Value, TransportError> {
  if status != 200 {
    let message = serde_json::from_slice::<Value>(body)
      .ok()
      .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
      .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    return Err(TransportError::Rejected { status, message });
  }
  serde_json::from_slice(body).map_err(|e| TransportError::Malformed(e.to_string()))
}

/// Serialize the arguments of `call` and sign the exact bytes that will be
/// sent. Anonymous calls carry no signature.
pub fn seal(call: &Call) -> Result<(Vec<u8>, Option<CallSignature>), TransportError> {
  let body =
    serde_json::to_vec(&call.args).map_err(|e| TransportError::Malformed(e.to_string()))?;
  let signature = CallSignature::sign(&call.identity, &call.endpoint, call.method, &body);
  Ok((body, signature))
}

/// Path of the RPC endpoint for `call`, relative to the host.
pub fn rpc_path(call: &Call) -> String {
  format!("/api/rpc/{}/{}", call.endpoint, call.method.name())
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// JSON-over-HTTP transport built on [`reqwest`].
#[derive(Debug, Clone)]
pub struct HttpConnector {
  timeout: Duration,
}

impl HttpConnector {
  pub fn new(config: &GatewayConfig) -> Self {
    Self { timeout: Duration::from_secs(config.request_timeout_secs) }
  }
}

impl Connector for HttpConnector {
  type Agent = HttpAgent;

  async fn connect(&self, host: String) -> Result<HttpAgent, TransportError> {
    let client = Client::builder().timeout(self.timeout).build()?;
    Ok(HttpAgent { client, host: host.trim_end_matches('/').to_string() })
  }
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpAgent {
  client: Client,
  host:   String,
}

impl Agent for HttpAgent {
  /// `GET /api/status`
  async fn status(&self) -> Result<StatusReply, TransportError> {
    let resp = self
      .client
      .get(format!("{}/api/status", self.host))
      .send()
      .await?;
    let status = resp.status().as_u16();
    let body = resp.bytes().await?;
    serde_json::from_value(read_reply(status, &body)?)
      .map_err(|e| TransportError::Malformed(e.to_string()))
  }

  /// `POST /api/rpc/{endpoint}/{method}`
  async fn call(&self, call: Call) -> Result<Value, TransportError> {
    let (body, signature) = seal(&call)?;
    let mut req = self
      .client
      .post(format!("{}{}", self.host, rpc_path(&call)))
      .header(ROOT_HEADER, &call.root)
      .header(reqwest::header::CONTENT_TYPE, "application/json")
      .body(body);
    for (name, value) in signature.iter().flat_map(CallSignature::headers) {
      req = req.header(name, value);
    }
    let resp = req.send().await?;
    let status = resp.status().as_u16();
    let body = resp.bytes().await?;
    read_reply(status, &body)
  }
}
