//! HTTP request step.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use runnel_state::StateType;
use runnel_step::{
  FieldError, Output, Step, StepCategory, StepContext, StepError, StepInfo, StepOutcome,
  check_range, is_template, parse_config, require_str,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::security::validate_safe_url;
use crate::{Builtin, value};

const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];
const MIN_TIMEOUT_SECS: f64 = 1.0;
const MAX_TIMEOUT_SECS: f64 = 300.0;

/// Expected config for HTTP requests, after reference resolution.
#[derive(Debug, Deserialize)]
struct RequestConfig {
  url: String,
  #[serde(default = "default_method")]
  method: String,
  #[serde(default)]
  headers: HashMap<String, Value>,
  #[serde(default)]
  body: Option<Value>,
  #[serde(default = "default_timeout", deserialize_with = "value::number")]
  timeout: f64,
}

fn default_method() -> String {
  "GET".to_string()
}

fn default_timeout() -> f64 {
  30.0
}

/// Calls an external HTTP service.
///
/// Activates `success` for responses below 400 and `error` otherwise; both
/// count as a successful step. Refused URLs, timeouts and transport errors
/// fail the step through `error`.
#[derive(Debug, Clone)]
pub struct Request {
  client: Client,
}

impl Builtin for Request {
  const TAG: &'static str = "request";

  fn describe() -> StepInfo {
    StepInfo::new(
      "HTTP Request",
      "Make HTTP requests to external services",
      StepCategory::Integration,
    )
    .with_icon("http")
    .with_color("#2196F3")
  }

  fn from_config(config: &Value) -> Result<Self, Vec<FieldError>> {
    let mut errors = Vec::new();
    if let Some(url) = require_str(config, "url", &mut errors) {
      if !is_template(&json!(url)) {
        if let Err(e) = validate_safe_url(url) {
          errors.push(FieldError::new("url", e.to_string()));
        }
      }
    }
    if let Some(method) = config.get("method") {
      let known = method
        .as_str()
        .is_some_and(|m| METHODS.contains(&m.to_uppercase().as_str()));
      if !known && !is_template(method) {
        errors.push(FieldError::new(
          "method",
          format!("must be one of {}", METHODS.join(", ")),
        ));
      }
    }
    if let Some(headers) = config.get("headers") {
      if !headers.is_object() && !headers.is_null() {
        errors.push(FieldError::new("headers", "must be a mapping"));
      }
    }
    check_range(config, "timeout", MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, &mut errors);

    if errors.is_empty() {
      Ok(Self {
        client: Client::new(),
      })
    } else {
      Err(errors)
    }
  }
}

fn parse_method(method: &str) -> Result<Method, StepError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "PATCH" => Ok(Method::PATCH),
    "DELETE" => Ok(Method::DELETE),
    other => Err(StepError::InvalidConfig {
      message: format!("unsupported HTTP method '{}'", other),
    }),
  }
}

fn header_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

impl Request {
  async fn send(&self, config: RequestConfig) -> Result<StepOutcome, StepError> {
    let method = parse_method(&config.method)?;
    if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&config.timeout) {
      return Err(StepError::InvalidConfig {
        message: format!(
          "timeout must be between {} and {} seconds",
          MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS
        ),
      });
    }

    let url = match validate_safe_url(&config.url) {
      Ok(url) => url,
      Err(e) => {
        return Ok(
          StepOutcome::failure(e.to_string())
            .with_code("invalid_url")
            .with_details(json!({ "url": config.url }))
            .on_port("error"),
        );
      }
    };

    let has_body = method == Method::POST || method == Method::PUT || method == Method::PATCH;
    let mut request = self
      .client
      .request(method, url)
      .timeout(Duration::from_secs_f64(config.timeout));

    let mut has_content_type = false;
    for (key, value) in &config.headers {
      has_content_type |= key.eq_ignore_ascii_case("content-type");
      request = request.header(key, header_value(value));
    }

    if has_body {
      match config.body {
        Some(Value::Null) | None => {}
        Some(Value::String(text)) => {
          if !has_content_type {
            request = request.header("Content-Type", "application/json");
          }
          request = request.body(text);
        }
        Some(body) => request = request.json(&body),
      }
    }

    let response = match request.send().await {
      Ok(response) => response,
      Err(e) => return Ok(transport_failure(e)),
    };

    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_string(), val.to_string()))
      })
      .collect();

    let text = match response.text().await {
      Ok(text) => text,
      Err(e) => return Ok(transport_failure(e)),
    };
    // Try to parse body as JSON, fall back to string
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    let port = if status >= 400 { "error" } else { "success" };
    debug!(status, port, "request completed");

    Ok(
      StepOutcome::success(json!({
        "response": body,
        "status_code": status,
        "response_headers": headers,
      }))
      .on_port(port),
    )
  }
}

fn transport_failure(e: reqwest::Error) -> StepOutcome {
  let details = json!({ "url": e.url().map(|url| url.as_str()) });
  if e.is_timeout() {
    warn!(error = %e, "request timed out");
    StepOutcome::failure("request timed out")
      .with_code("timeout")
      .with_details(details)
      .on_port("error")
  } else {
    warn!(error = %e, "request failed");
    StepOutcome::failure(format!("request failed: {}", e))
      .with_code("request_error")
      .with_details(details)
      .on_port("error")
  }
}

#[async_trait]
impl Step for Request {
  fn info(&self) -> StepInfo {
    Self::describe()
  }

  fn ports(&self) -> Vec<String> {
    vec!["success".to_string(), "error".to_string()]
  }

  fn outputs(&self) -> Vec<Output> {
    vec![
      Output::new("response", StateType::Any, "Response body"),
      Output::new("status_code", StateType::Number, "HTTP status code"),
      Output::new("response_headers", StateType::Object, "Response headers"),
    ]
  }

  async fn run(&self, ctx: &StepContext, config: Value) -> Result<StepOutcome, StepError> {
    let config: RequestConfig = parse_config(config)?;
    tokio::select! {
      outcome = self.send(config) => outcome,
      _ = ctx.cancel.cancelled() => Err(StepError::Cancelled),
    }
  }
}
