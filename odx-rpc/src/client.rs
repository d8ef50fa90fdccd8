//! Authenticated Odoo client.

use crate::error::{Result, RpcError};
use crate::value::Value;
use crate::xmlrpc;
use odx_common::{OdxConfig, Transport};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Client for one Odoo instance. Created via [`Client::connect`], which
/// authenticates immediately (the original scripts abort on a falsy uid
/// before doing anything else).
pub struct Client {
    http: reqwest::Client,
    url: String,
    db: String,
    username: String,
    password: String,
    transport: Transport,
    uid: i64,
}

impl Client {
    /// Build an HTTP client and authenticate against `/xmlrpc/2/common`
    /// (or the `common` service over `/jsonrpc`).
    pub async fn connect(config: &OdxConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut client = Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            db: config.db.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            transport: config.transport,
            uid: 0,
        };

        let params = vec![
            Value::from(client.db.as_str()),
            Value::from(client.username.as_str()),
            Value::from(client.password.as_str()),
            Value::Struct(BTreeMap::new()),
        ];
        let uid = client.call("common", "authenticate", params).await?;
        // Bad credentials come back as boolean false, not a fault.
        client.uid = match uid.as_i64() {
            Some(uid) if uid > 0 => uid,
            _ => return Err(RpcError::Auth(client.username)),
        };
        info!(uid = client.uid, db = %client.db, "Authenticated");
        Ok(client)
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// `object.execute_kw`. `args` must be a JSON array, `kwargs` an object.
    pub async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: serde_json::Value,
        kwargs: serde_json::Value,
    ) -> Result<Value> {
        debug!(model, method, "execute_kw");
        let params = vec![
            Value::from(self.db.as_str()),
            Value::Int(self.uid),
            Value::from(self.password.as_str()),
            Value::from(model),
            Value::from(method),
            Value::from_json(&args),
            Value::from_json(&kwargs),
        ];
        self.call("object", "execute_kw", params).await
    }

    /// `search`: record ids matching a domain.
    pub async fn search(
        &self,
        model: &str,
        domain: serde_json::Value,
        kwargs: serde_json::Value,
    ) -> Result<Vec<i64>> {
        let value = self.execute_kw(model, "search", json!([domain]), kwargs).await?;
        ids_from(&value)
    }

    /// `search_read`: matching records as structs.
    pub async fn search_read(
        &self,
        model: &str,
        domain: serde_json::Value,
        kwargs: serde_json::Value,
    ) -> Result<Vec<Value>> {
        let value = self
            .execute_kw(model, "search_read", json!([domain]), kwargs)
            .await?;
        match value {
            Value::Array(rows) => Ok(rows),
            other => Err(RpcError::Shape(format!(
                "search_read on {model} returned {other:?}"
            ))),
        }
    }

    /// `create`. Accepts a single record or a batch; Odoo returns one id for
    /// a single record and a list for a batch, normalized here to a list.
    pub async fn create(&self, model: &str, vals: serde_json::Value) -> Result<Vec<i64>> {
        let value = self.execute_kw(model, "create", json!([vals]), json!({})).await?;
        ids_from(&value)
    }

    /// `write` on a set of ids.
    pub async fn write(
        &self,
        model: &str,
        ids: &[i64],
        vals: serde_json::Value,
    ) -> Result<bool> {
        let value = self
            .execute_kw(model, "write", json!([ids, vals]), json!({}))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// `unlink` a set of ids.
    pub async fn unlink(&self, model: &str, ids: &[i64]) -> Result<bool> {
        let value = self.execute_kw(model, "unlink", json!([ids]), json!({})).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn call(&self, service: &str, method: &str, params: Vec<Value>) -> Result<Value> {
        match self.transport {
            Transport::XmlRpc => self.call_xmlrpc(service, method, &params).await,
            Transport::JsonRpc => self.call_jsonrpc(service, method, &params).await,
        }
    }

    async fn call_xmlrpc(&self, service: &str, method: &str, params: &[Value]) -> Result<Value> {
        let endpoint = format!("{}/xmlrpc/2/{}", self.url, service);
        let body = xmlrpc::encode_call(method, params);
        let response = self
            .http
            .post(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        xmlrpc::decode_response(&text)
    }

    async fn call_jsonrpc(&self, service: &str, method: &str, params: &[Value]) -> Result<Value> {
        let args: Vec<serde_json::Value> = params.iter().map(Value::to_json).collect();
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": 1,
        });
        let response: serde_json::Value = self
            .http
            .post(format!("{}/jsonrpc", self.url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(RpcError::Fault {
                code: error.get("code").and_then(serde_json::Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(Value::from_json(
            response.get("result").unwrap_or(&serde_json::Value::Null),
        ))
    }
}

fn ids_from(value: &Value) -> Result<Vec<i64>> {
    match value {
        Value::Int(id) => Ok(vec![*id]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| RpcError::Shape(format!("expected id, got {item:?}")))
            })
            .collect(),
        other => Err(RpcError::Shape(format!("expected ids, got {other:?}"))),
    }
}
