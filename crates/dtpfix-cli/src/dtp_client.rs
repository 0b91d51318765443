//! Blocking HTTP client for the DTP graph API.
//!
//! Wire protocol (JSON over HTTP, bearer token auth):
//!
//! | call                       | request                                            |
//! |----------------------------|----------------------------------------------------|
//! | fetch                      | `POST find` `{"query": {"_iri": ..}}`              |
//! | fetch_by_level_and_type    | `POST find` `{"query": {"level", "node_type"}, "cursor", "page_size"}` |
//! | add/remove/replace field   | `POST node/field` `{"_iri", "op", "key", "previous", "value"}` |
//! | apply_link                 | `POST node/link` `{"_iri", "op", "_label", "_targetIRI"}` |
//! | replace_iri                | `POST node/iri` `{"_iri", "new_iri"}`              |
//!
//! `find` answers `{"items": [node, ..], "next": cursor?}`. A node is a JSON
//! object: `_iri`, outgoing edges under `_outE` as `{"_label", "_targetIRI"}`,
//! other `_`-prefixed keys are store metadata, everything else is a field.

use anyhow::{anyhow, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use dtpfix_core::{
    FieldValue, GraphClient, GraphError, LinkOp, NodePage, NodeRecord, NodeRef, NodeType,
    OntologyLevel,
};

const IRI_KEY: &str = "_iri";
const OUT_EDGES_KEY: &str = "_outE";
const EDGE_LABEL_KEY: &str = "_label";
const EDGE_TARGET_KEY: &str = "_targetIRI";

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum FindQuery<'a> {
    ByIri {
        #[serde(rename = "_iri")]
        iri: &'a str,
    },
    ByLevel {
        level: OntologyLevel,
        node_type: NodeType,
    },
}

#[derive(Debug, Serialize)]
struct FindRequest<'a> {
    query: FindQuery<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum FieldOp {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Serialize)]
struct FieldUpdate<'a> {
    #[serde(rename = "_iri")]
    iri: &'a str,
    op: FieldOp,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<&'a FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a FieldValue>,
}

#[derive(Debug, Serialize)]
struct LinkUpdate<'a> {
    #[serde(rename = "_iri")]
    iri: &'a str,
    op: &'static str,
    #[serde(rename = "_label")]
    predicate: &'a str,
    #[serde(rename = "_targetIRI")]
    target: &'a str,
}

#[derive(Debug, Serialize)]
struct IriUpdate<'a> {
    #[serde(rename = "_iri")]
    iri: &'a str,
    new_iri: &'a str,
}

pub struct DtpClient {
    http: Client,
    base: Url,
    token: String,
}

impl DtpClient {
    /// `base` must end in `/` (see `config::parse_endpoint`).
    pub fn new(base: Url, token: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build http client: {e}"))?;
        Ok(Self { http, base, token })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, GraphError> {
        self.base
            .join(path)
            .map_err(|e| GraphError::Transport(format!("bad url {}{path}: {e}", self.base)))
    }

    fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        iri: Option<&NodeRef>,
    ) -> Result<Response, GraphError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "dtp request");
        let resp = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .map_err(|e| GraphError::Transport(format!("POST {url}: {e}")))?;
        check_status(resp, iri)
    }

    fn find(&self, request: &FindRequest<'_>) -> Result<FindResponse, GraphError> {
        let resp = self.post("find", request, None)?;
        let text = resp
            .text()
            .map_err(|e| GraphError::Transport(format!("reading find response: {e}")))?;
        parse_find_response(&text)
    }

    fn update<B: Serialize>(&self, path: &str, body: &B, iri: &NodeRef) -> Result<(), GraphError> {
        self.post(path, body, Some(iri)).map(|_| ())
    }

    fn field_update(
        &self,
        iri: &NodeRef,
        op: FieldOp,
        key: &str,
        previous: Option<&FieldValue>,
        value: Option<&FieldValue>,
    ) -> Result<(), GraphError> {
        let body = FieldUpdate {
            iri: iri.as_str(),
            op,
            key,
            previous,
            value,
        };
        self.update("node/field", &body, iri)
    }
}

fn check_status(resp: Response, iri: Option<&NodeRef>) -> Result<Response, GraphError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(status_error(status, body, iri))
}

fn status_error(status: StatusCode, body: String, iri: Option<&NodeRef>) -> GraphError {
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    match (status.as_u16(), iri) {
        (401 | 403, _) => GraphError::Auth(message),
        (404, Some(iri)) => GraphError::NotFound(iri.clone()),
        (400 | 409 | 412 | 422, Some(iri)) => GraphError::Rejected {
            iri: iri.clone(),
            message,
        },
        _ => GraphError::Transport(message),
    }
}

fn parse_find_response(text: &str) -> Result<FindResponse, GraphError> {
    serde_json::from_str(text).map_err(|e| GraphError::InvalidResponse(format!("find: {e}")))
}

/// Converts one DTP node object into a snapshot.
pub fn node_from_json(value: &Value) -> Result<NodeRecord, GraphError> {
    let object = value
        .as_object()
        .ok_or_else(|| GraphError::InvalidResponse("node is not an object".to_string()))?;
    let iri = object
        .get(IRI_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| GraphError::InvalidResponse(format!("node without `{IRI_KEY}`")))?;

    let mut record = NodeRecord::new(iri);
    for (key, field) in object {
        if key.starts_with('_') {
            continue;
        }
        record.fields.insert(key.clone(), field.clone());
    }

    if let Some(edges) = object.get(OUT_EDGES_KEY) {
        let edges = edges.as_array().ok_or_else(|| {
            GraphError::InvalidResponse(format!("{iri}: `{OUT_EDGES_KEY}` is not an array"))
        })?;
        for edge in edges {
            let label = edge.get(EDGE_LABEL_KEY).and_then(Value::as_str);
            let target = edge.get(EDGE_TARGET_KEY).and_then(Value::as_str);
            match (label, target) {
                (Some(label), Some(target)) => record = record.with_link(label, target),
                _ => {
                    return Err(GraphError::InvalidResponse(format!(
                        "{iri}: edge without `{EDGE_LABEL_KEY}` or `{EDGE_TARGET_KEY}`"
                    )))
                }
            }
        }
    }
    Ok(record.normalized())
}

impl GraphClient for DtpClient {
    fn fetch(&self, iri: &NodeRef) -> Result<Option<NodeRecord>, GraphError> {
        let response = self.find(&FindRequest {
            query: FindQuery::ByIri { iri: iri.as_str() },
            cursor: None,
            page_size: 1,
        })?;
        response
            .items
            .iter()
            .map(node_from_json)
            .find(|r| r.as_ref().map_or(true, |r| &r.iri == iri))
            .transpose()
    }

    fn fetch_by_level_and_type(
        &self,
        level: OntologyLevel,
        node_type: NodeType,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<NodePage, GraphError> {
        let response = self.find(&FindRequest {
            query: FindQuery::ByLevel { level, node_type },
            cursor,
            page_size,
        })?;
        let nodes = response
            .items
            .iter()
            .map(node_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NodePage {
            nodes,
            next_cursor: response.next.filter(|c| !c.is_empty()),
        })
    }

    fn add_field(&self, iri: &NodeRef, key: &str, value: &FieldValue) -> Result<(), GraphError> {
        self.field_update(iri, FieldOp::Add, key, None, Some(value))
    }

    fn remove_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
    ) -> Result<(), GraphError> {
        self.field_update(iri, FieldOp::Remove, key, previous, None)
    }

    fn replace_field(
        &self,
        iri: &NodeRef,
        key: &str,
        previous: Option<&FieldValue>,
        value: &FieldValue,
    ) -> Result<(), GraphError> {
        self.field_update(iri, FieldOp::Replace, key, previous, Some(value))
    }

    fn apply_link(
        &self,
        iri: &NodeRef,
        predicate: &str,
        target: &NodeRef,
        op: LinkOp,
    ) -> Result<(), GraphError> {
        let body = LinkUpdate {
            iri: iri.as_str(),
            op: match op {
                LinkOp::Add => "add",
                LinkOp::Remove => "remove",
            },
            predicate,
            target: target.as_str(),
        };
        self.update("node/link", &body, iri)
    }

    fn replace_iri(&self, old: &NodeRef, new: &NodeRef) -> Result<(), GraphError> {
        let body = IriUpdate {
            iri: old.as_str(),
            new_iri: new.as_str(),
        };
        self.update("node/iri", &body, old)
    }
}
