//! HTTP-facing contracts and routing.
//!
//! Transport-free: the server binary hands over method, request target and body
//! and writes back whatever `ApiResponse` comes out. Every failure becomes a
//! well-formed JSON payload with a `status` field.

use crate::engine::{GeneratedQuery, QueryAgent, Question, ReportResult};
use crate::error::AgentError;
use crate::intent::ReportSubject;
use crate::knowledge_base::StaticTag;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "Prequalification SQL Agent";

/// Placed in the `generated_sql` slot when no field could be resolved.
pub const RESOLUTION_EMPTY_SQL: &str = "-- ERROR: no matching fields found for this question";

#[derive(Debug, Deserialize)]
pub struct GenerateSqlRequest {
    pub extraction_id: i64,
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct RunReportRequest {
    #[serde(default)]
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateSqlResponse {
    pub status: &'static str,
    pub extraction_id: i64,
    pub original_question: String,
    pub detected_mode: Option<String>,
    pub resolved_identifiers: Vec<u64>,
    pub resolved_static_fields: Vec<StaticTag>,
    pub generated_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub status: &'static str,
    pub columns: Vec<String>,
    pub data: Vec<serde_json::Map<String, Value>>,
}

impl From<ReportResult> for ReportResponse {
    fn from(result: ReportResult) -> Self {
        Self {
            status: "success",
            columns: result.columns,
            data: result.rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::failure(&AgentError::Json(e)),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: Value::Null,
        }
    }

    fn not_found(path: &str) -> Self {
        Self {
            status: 404,
            body: json!({"status": "error", "error_kind": "not_found", "error": format!("No route for {}", path)}),
        }
    }

    /// Render an error payload with the HTTP status its kind deserves.
    pub fn failure(err: &AgentError) -> Self {
        let status = match err {
            AgentError::InvalidInput(_) => 400,
            AgentError::DataAccess(_)
            | AgentError::ResolutionEmpty
            | AgentError::GenerationUnavailable(_)
            | AgentError::NoSubjectData(_) => 200,
            _ => 500,
        };
        Self {
            status,
            body: json!({"status": "error", "error_kind": err.kind(), "error": err.to_string()}),
        }
    }
}

pub async fn handle_request(agent: &QueryAgent, method: &str, target: &str, body: &str) -> ApiResponse {
    let url = match reqwest::Url::parse("http://localhost").and_then(|base| base.join(target)) {
        Ok(url) => url,
        Err(e) => {
            return ApiResponse::failure(&AgentError::InvalidInput(format!("Bad request target: {}", e)))
        }
    };
    let path = match url.path().trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    match (method, path) {
        ("OPTIONS", _) => ApiResponse::no_content(),
        ("GET", "/") => ApiResponse::ok(&json!({"status": "Online", "service": SERVICE_NAME})),
        ("POST", "/generate_sql") => match serde_json::from_str::<GenerateSqlRequest>(body) {
            Ok(request) => generate_sql(agent, request).await,
            Err(e) => ApiResponse::failure(&AgentError::InvalidInput(format!("Invalid body: {}", e))),
        },
        ("POST", "/run_report") => match serde_json::from_str::<RunReportRequest>(body) {
            Ok(request) => report(agent.run_report(&request.sql).await),
            Err(e) => ApiResponse::failure(&AgentError::InvalidInput(format!("Invalid body: {}", e))),
        },
        ("GET", "/api/reports/paginated") => {
            let subject = match query_param(&url, "subject") {
                Some(raw) => raw.parse::<ReportSubject>(),
                None => Err(AgentError::InvalidInput("subject is required".to_string())),
            };
            match subject {
                Ok(subject) => report(agent.subject_report(subject, None).await),
                Err(e) => ApiResponse::failure(&e),
            }
        }
        ("GET", "/api/reports/safety_stats") => {
            let extraction_id = match query_param(&url, "extraction_id") {
                Some(raw) => match raw.trim().parse::<i64>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        return ApiResponse::failure(&AgentError::InvalidInput(
                            "extraction_id must be an integer".to_string(),
                        ))
                    }
                },
                None => None,
            };
            report(agent.subject_report(ReportSubject::Safety, extraction_id).await)
        }
        _ => ApiResponse::not_found(path),
    }
}

async fn generate_sql(agent: &QueryAgent, request: GenerateSqlRequest) -> ApiResponse {
    let question = Question::new(request.extraction_id, request.question.clone());
    let mut response = GenerateSqlResponse {
        status: "success",
        extraction_id: request.extraction_id,
        original_question: request.question,
        detected_mode: None,
        resolved_identifiers: Vec::new(),
        resolved_static_fields: Vec::new(),
        generated_sql: None,
        error_kind: None,
        error: None,
    };

    match agent.generate_sql(&question).await {
        Ok(GeneratedQuery {
            sql,
            mode,
            resolved_identifiers,
            resolved_static_fields,
        }) => {
            info!(%mode, ids = resolved_identifiers.len(), "sql generated");
            response.detected_mode = Some(mode.to_string());
            response.resolved_identifiers = resolved_identifiers.into_iter().collect();
            response.resolved_static_fields = resolved_static_fields.into_iter().collect();
            response.generated_sql = Some(sql);
            ApiResponse::ok(&response)
        }
        Err(err @ AgentError::InvalidInput(_)) => ApiResponse::failure(&err),
        Err(err) => {
            warn!(error = %err, "sql generation failed");
            if matches!(err, AgentError::ResolutionEmpty) {
                response.generated_sql = Some(RESOLUTION_EMPTY_SQL.to_string());
            }
            response.detected_mode = Some(agent.classify(&question.text).to_string());
            response.status = "error";
            response.error_kind = Some(err.kind());
            response.error = Some(err.to_string());
            let status = ApiResponse::failure(&err).status;
            let mut rendered = ApiResponse::ok(&response);
            rendered.status = status;
            rendered
        }
    }
}

fn report(result: crate::error::Result<ReportResult>) -> ApiResponse {
    match result {
        Ok(result) => ApiResponse::ok(&ReportResponse::from(result)),
        Err(err) => {
            warn!(error = %err, "report failed");
            ApiResponse::failure(&err)
        }
    }
}

fn query_param(url: &reqwest::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_status_codes() {
        assert_eq!(ApiResponse::failure(&AgentError::InvalidInput("x".into())).status, 400);
        assert_eq!(ApiResponse::failure(&AgentError::ResolutionEmpty).status, 200);
        assert_eq!(ApiResponse::failure(&AgentError::Config("x".into())).status, 500);
    }

    #[test]
    fn test_failure_payload_shape() {
        let response = ApiResponse::failure(&AgentError::NoSubjectData("Safety".into()));
        assert_eq!(response.body["status"], "error");
        assert_eq!(response.body["error_kind"], "no_subject_data");
    }
}
