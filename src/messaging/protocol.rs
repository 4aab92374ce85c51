//! Request/response protocol between the UI layer and the vault.
//!
//! Requests are tagged by `action`:
//!
//! | Action | Fields | Response payload |
//! |--------|--------|------------------|
//! | `export` | `domain` | `data`: export report with the sealed envelope |
//! | `getCookies` | `domain` | `cookies` |
//! | `import` | `cookies` | `data`: batch report, `warnings` |
//! | `importSealed` | `envelope` | `data`: batch report, `warnings` |
//! | `clear` | `domain` | `data`: clear report |
//! | `backup` | | `data`: backup report |
//! | `restore` | | `data`: batch report, `warnings` |
//!
//! Every response is `{success, data?, cookies?, error?, warnings?}`; absent
//! fields are omitted.

use crate::base::coreerror::CoreError;
use crate::batch::orchestrator::{BatchReport, CookieVault};
use crate::cookies::codec::IntegrityEnvelope;
use crate::cookies::record::CookieRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    Export { domain: String },
    GetCookies { domain: String },
    Import { cookies: Vec<CookieRecord> },
    ImportSealed { envelope: IntegrityEnvelope },
    Clear { domain: String },
    Backup,
    Restore,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Export { .. } => "export",
            Request::GetCookies { .. } => "getCookies",
            Request::Import { .. } => "import",
            Request::ImportSealed { .. } => "importSealed",
            Request::Clear { .. } => "clear",
            Request::Backup => "backup",
            Request::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<CookieRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl Response {
    fn ok(data: impl Serialize) -> Result<Self, CoreError> {
        Ok(Self {
            success: true,
            data: Some(serde_json::to_value(data)?),
            ..Default::default()
        })
    }

    fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        if !warnings.is_empty() {
            self.warnings = Some(warnings);
        }
        self
    }

    pub fn failure(error: &CoreError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

fn batch_response(report: BatchReport) -> Result<Response, CoreError> {
    let warnings = report.all_warnings();
    Ok(Response::ok(report)?.with_warnings(warnings))
}

async fn handle(vault: &CookieVault, request: Request) -> Result<Response, CoreError> {
    match request {
        Request::Export { domain } => {
            let report = vault.export_domain(&domain).await?;
            let warnings = report.warnings.clone();
            Ok(Response::ok(report)?.with_warnings(warnings))
        }
        Request::GetCookies { domain } => Ok(Response {
            success: true,
            cookies: Some(vault.cookies_for_domain(&domain).await?),
            ..Default::default()
        }),
        Request::Import { cookies } => batch_response(vault.import_cookies(cookies).await?),
        Request::ImportSealed { envelope } => batch_response(vault.import_sealed(envelope).await?),
        Request::Clear { domain } => Response::ok(vault.clear_domain(&domain).await?),
        Request::Backup => Response::ok(vault.backup().await?),
        Request::Restore => batch_response(vault.restore().await?),
    }
}

/// Execute one request. Failures are reported in the response, never returned.
pub async fn dispatch(vault: &CookieVault, request: Request) -> Response {
    let action = request.action();
    match handle(vault, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(action, error = %err, "request failed");
            Response::failure(&err)
        }
    }
}

/// Parse a JSON request, execute it and serialize the response.
pub async fn dispatch_json(vault: &CookieVault, request: &str) -> String {
    let response = match serde_json::from_str::<Request>(request) {
        Ok(request) => dispatch(vault, request).await,
        Err(e) => Response::failure(&CoreError::parse("request", e)),
    };

    serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        r#"{"success":false,"error":"internal serialization failure"}"#.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req: Request =
            serde_json::from_str(r#"{"action":"export","domain":"example.com"}"#).unwrap();
        assert_eq!(
            req,
            Request::Export {
                domain: "example.com".into()
            }
        );

        let req: Request = serde_json::from_str(r#"{"action":"backup"}"#).unwrap();
        assert_eq!(req, Request::Backup);

        let req: Request = serde_json::from_str(
            r#"{
                "action": "import",
                "cookies": [{"name": "sid", "value": "abc", "domain": "example.com", "path": "/"}]
            }"#,
        )
        .unwrap();
        assert_eq!(req.action(), "import");
    }

    #[test]
    fn test_failure_omits_empty_fields() {
        let json = serde_json::to_value(Response::failure(&CoreError::LockContention {
            key: "import_cookies".into(),
        }))
        .unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Operation already in progress: import_cookies");
        assert!(json.get("data").is_none());
        assert!(json.get("warnings").is_none());
    }
}
