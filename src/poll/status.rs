//! Operation status model and the JSON status-query adapter.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{OperationReference, ProductScope},
	gateway::{GatewayRequest, GatewayResponse},
};

const PENDING_LABELS: [&str; 8] =
	["PENDING", "CREATED", "INITIATED", "SUBMITTED", "ACCEPTED", "ONGOING", "PROCESSING", "IN_PROGRESS"];
const SUCCESS_LABELS: [&str; 5] = ["SUCCESSFUL", "SUCCESS", "SUCCEEDED", "COMPLETED", "COMPLETE"];
const FAILURE_LABELS: [&str; 8] =
	["FAILED", "FAILURE", "REJECTED", "DECLINED", "CANCELLED", "CANCELED", "EXPIRED", "TIMEOUT"];

/// State of a submitted asynchronous operation.
///
/// `Pending` is the only non-terminal state. `Unknown` carries a label that maps to no known
/// state and aborts polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationStatus {
	/// Still being processed.
	Pending,
	/// Completed successfully.
	Successful,
	/// Declined or failed, with the provider's reason.
	Failed(String),
	/// Unrecognized label.
	Unknown(String),
}
impl OperationStatus {
	/// Maps a provider label onto a status; failed labels use `reason` or fall back to the label.
	pub fn from_label(label: &str, reason: Option<String>) -> Self {
		let normalized = label.trim().to_ascii_uppercase().replace(['-', ' '], "_");
		let normalized = normalized.as_str();

		if PENDING_LABELS.contains(&normalized) {
			OperationStatus::Pending
		} else if SUCCESS_LABELS.contains(&normalized) {
			OperationStatus::Successful
		} else if FAILURE_LABELS.contains(&normalized) {
			OperationStatus::Failed(reason.unwrap_or_else(|| normalized.to_owned()))
		} else {
			OperationStatus::Unknown(label.to_owned())
		}
	}

	/// Returns `true` for `Successful` and `Failed`.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OperationStatus::Successful | OperationStatus::Failed(_))
	}
}

/// One status answer: the classified status plus the decoded body for callers that need more
/// fields (amounts, payer details, provider transaction ids).
#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
	/// Classified status.
	pub status: OperationStatus,
	/// Decoded response body, or `Value::Null` when the source had none.
	pub details: Value,
}
impl StatusReport {
	/// Creates a report without details.
	pub fn new(status: OperationStatus) -> Self {
		Self { status, details: Value::Null }
	}
}

/// Builds the status request for a reference and interprets the answer.
pub trait StatusQuery: Send + Sync {
	/// Request that fetches the current status of `reference`.
	fn request(&self, reference: &OperationReference) -> GatewayRequest;

	/// Interprets a 2xx status response.
	fn parse(&self, response: &GatewayResponse) -> Result<StatusReport>;
}

/// Status query for JSON endpoints that expose the state under one field.
///
/// The path template substitutes `{reference}`. The reason of a failed operation is read from
/// the first present reason field; values may be strings or `{code, message}` objects.
#[derive(Clone, Debug)]
pub struct JsonStatusQuery {
	/// Product whose token and headers apply.
	pub product: ProductScope,
	/// Path template containing `{reference}`.
	pub path_template: String,
	/// Field holding the status label.
	pub status_field: String,
	/// Fields checked, in order, for a failure reason.
	pub reason_fields: Vec<String>,
	/// Sends the reference header along with the query.
	pub send_reference_header: bool,
}
impl JsonStatusQuery {
	/// Creates a query reading `status` and `reason`.
	pub fn new(product: ProductScope, path_template: impl Into<String>) -> Self {
		Self {
			product,
			path_template: path_template.into(),
			status_field: "status".into(),
			reason_fields: vec!["reason".into(), "failureReason".into(), "error".into()],
			send_reference_header: false,
		}
	}

	/// Overrides the status field.
	pub fn status_field(mut self, field: impl Into<String>) -> Self {
		self.status_field = field.into();

		self
	}

	/// Overrides the reason fields.
	pub fn reason_fields<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.reason_fields = fields.into_iter().map(Into::into).collect();

		self
	}

	/// Sends the reference header with each query.
	pub fn with_reference_header(mut self) -> Self {
		self.send_reference_header = true;

		self
	}

	fn reason(&self, body: &Value) -> Option<String> {
		self.reason_fields.iter().find_map(|field| match body.get(field)? {
			Value::String(text) if !text.is_empty() => Some(text.clone()),
			Value::Object(object) => ["code", "message"]
				.iter()
				.find_map(|key| object.get(*key).and_then(Value::as_str))
				.map(str::to_owned),
			_ => None,
		})
	}
}
impl StatusQuery for JsonStatusQuery {
	fn request(&self, reference: &OperationReference) -> GatewayRequest {
		let path = self.path_template.replace("{reference}", reference);
		let request = GatewayRequest::get(self.product.clone(), path);

		if self.send_reference_header { request.reference(reference.clone()) } else { request }
	}

	fn parse(&self, response: &GatewayResponse) -> Result<StatusReport> {
		let body = response.json::<Value>()?;
		let status = match body.get(&self.status_field) {
			Some(Value::String(label)) => OperationStatus::from_label(label, self.reason(&body)),
			Some(other) => OperationStatus::Unknown(other.to_string()),
			None => OperationStatus::Unknown(String::new()),
		};

		Ok(StatusReport { status, details: body })
	}
}
