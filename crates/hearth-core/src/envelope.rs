//! Response envelope builder for the Smart Home API v3 wire format.
//!
//! Every builder method runs its options through the same default-substitution
//! rule: an unsupplied, empty-string, or empty-map field falls back to its
//! documented default. The builder never rejects options; defaulting is the
//! contract.

use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::capability::CapabilityDescriptor;

/// Response names that structurally never carry an `endpoint` block.
const ENDPOINTLESS_NAMES: [&str; 2] = ["AcceptGrant.Response", "Discover.Response"];

/// Substitute the default when a string option is unsupplied or empty.
fn check_value(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Same rule for optional fields that stay absent when unsupplied.
fn check_optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Same rule for JSON values: null, empty object, or empty string count as unsupplied.
fn check_json(value: Option<Value>, default: Value) -> Value {
    match value {
        Some(Value::Null) | None => default,
        Some(Value::Object(m)) if m.is_empty() => default,
        Some(Value::String(s)) if s.is_empty() => default,
        Some(v) => v,
    }
}

fn fresh_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn time_of_sample() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Options for [`ResponseEnvelope::new`]. Unset fields take the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct ResponseOptions {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub message_id: Option<String>,
    pub correlation_token: Option<String>,
    pub payload_version: Option<String>,
    pub token_type: Option<String>,
    pub token: Option<String>,
    pub endpoint_id: Option<String>,
    pub payload: Option<Value>,
}

/// Options for [`ResponseEnvelope::add_context_property`]. Defaults build a
/// valid `Alexa.EndpointHealth` connectivity property.
#[derive(Debug, Clone, Default)]
pub struct ContextPropertyOptions {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub instance: Option<String>,
    pub value: Option<Value>,
    pub uncertainty_in_milliseconds: Option<u64>,
}

/// Options for [`ResponseEnvelope::add_payload_endpoint`].
///
/// `additional_attributes` and `cookie` use presence-of-key semantics: they
/// appear in the descriptor only when supplied, even as an empty map.
#[derive(Debug, Clone, Default)]
pub struct EndpointOptions {
    pub endpoint_id: Option<String>,
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub manufacturer_name: Option<String>,
    pub display_categories: Option<Vec<String>>,
    pub capabilities: Option<Vec<CapabilityDescriptor>>,
    pub additional_attributes: Option<Value>,
    pub cookie: Option<Value>,
}

/// One reported state fact attached to a response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextProperty {
    pub namespace: String,
    pub name: String,
    pub value: Value,
    pub time_of_sample: String,
    pub uncertainty_in_milliseconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseContext {
    pub properties: Vec<ContextProperty>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeader {
    pub namespace: String,
    pub name: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<String>,
    pub payload_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseScope {
    #[serde(rename = "type")]
    pub token_type: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEndpoint {
    pub scope: ResponseScope,
    pub endpoint_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseEvent {
    pub header: ResponseHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<ResponseEndpoint>,
    pub payload: Value,
}

/// Discovery payload entry describing one controllable device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub endpoint_id: String,
    pub friendly_name: String,
    pub description: String,
    pub manufacturer_name: String,
    pub display_categories: Vec<String>,
    pub capabilities: Vec<CapabilityDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_attributes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<Value>,
}

/// Outbound structured message: optional context plus the event block.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ResponseContext>,
    pub event: ResponseEvent,
}

impl ResponseEnvelope {
    /// Build an envelope from options, filling defaults per field.
    ///
    /// `AcceptGrant.Response` and `Discover.Response` events drop the endpoint
    /// block after construction.
    pub fn new(opts: ResponseOptions) -> Self {
        let name = check_value(opts.name, "Response");
        let endpoint = if ENDPOINTLESS_NAMES.contains(&name.as_str()) {
            None
        } else {
            Some(ResponseEndpoint {
                scope: ResponseScope {
                    token_type: check_value(opts.token_type, "BearerToken"),
                    token: check_value(opts.token, "INVALID"),
                },
                endpoint_id: check_value(opts.endpoint_id, "INVALID"),
            })
        };

        ResponseEnvelope {
            context: None,
            event: ResponseEvent {
                header: ResponseHeader {
                    namespace: check_value(opts.namespace, "Alexa"),
                    name,
                    message_id: check_value(opts.message_id, &fresh_message_id()),
                    correlation_token: check_optional(opts.correlation_token),
                    payload_version: check_value(opts.payload_version, "3"),
                },
                endpoint,
                payload: check_json(opts.payload, Value::Object(Map::new())),
            },
        }
    }

    /// Shorthand for a protocol `ErrorResponse` envelope.
    pub fn error(error_type: &str, message: &str) -> Self {
        ResponseEnvelope::new(ResponseOptions {
            name: Some("ErrorResponse".to_string()),
            payload: Some(json!({
                "type": error_type,
                "message": message,
            })),
            ..Default::default()
        })
    }

    /// Append one context property, lazily creating the context block.
    /// `timeOfSample` is always stamped at call time, never user-supplied.
    pub fn add_context_property(&mut self, opts: ContextPropertyOptions) {
        let property = ContextProperty {
            namespace: check_value(opts.namespace, "Alexa.EndpointHealth"),
            name: check_value(opts.name, "connectivity"),
            value: check_json(opts.value, json!({ "value": "OK" })),
            time_of_sample: time_of_sample(),
            uncertainty_in_milliseconds: opts.uncertainty_in_milliseconds.unwrap_or(0),
            instance: check_optional(opts.instance),
        };

        self.context
            .get_or_insert_with(|| ResponseContext { properties: Vec::new() })
            .properties
            .push(property);
    }

    /// Append one endpoint descriptor to `event.payload.endpoints`, lazily
    /// creating the sequence.
    pub fn add_payload_endpoint(&mut self, opts: EndpointOptions) {
        let fallback_id = format!("endpoint_{}", rand::thread_rng().gen_range(10_000..100_000));
        let descriptor = EndpointDescriptor {
            endpoint_id: check_value(opts.endpoint_id, &fallback_id),
            friendly_name: check_value(opts.friendly_name, "Sample Endpoint"),
            description: check_value(opts.description, "Sample Endpoint Description"),
            manufacturer_name: check_value(opts.manufacturer_name, "Sample Manufacturer"),
            display_categories: opts
                .display_categories
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| vec!["OTHER".to_string()]),
            capabilities: opts.capabilities.unwrap_or_default(),
            additional_attributes: opts
                .additional_attributes
                .map(|v| check_json(Some(v), Value::Object(Map::new()))),
            cookie: opts.cookie.map(|v| check_json(Some(v), Value::Object(Map::new()))),
        };

        // Non-object payloads only arise from explicit caller options; reset
        // to an object so the descriptor has somewhere to live.
        if !self.event.payload.is_object() {
            self.event.payload = Value::Object(Map::new());
        }
        if let Some(payload) = self.event.payload.as_object_mut() {
            payload
                .entry("endpoints")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(Value::Array(endpoints)) = payload.get_mut("endpoints") {
                endpoints.push(serde_json::to_value(descriptor).unwrap_or(Value::Null));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_header_and_endpoint_field() {
        let envelope = ResponseEnvelope::new(ResponseOptions::default());
        assert_eq!(envelope.event.header.namespace, "Alexa");
        assert_eq!(envelope.event.header.name, "Response");
        assert_eq!(envelope.event.header.payload_version, "3");
        assert!(envelope.event.header.correlation_token.is_none());
        let endpoint = envelope.event.endpoint.expect("default response keeps endpoint");
        assert_eq!(endpoint.scope.token_type, "BearerToken");
        assert_eq!(endpoint.scope.token, "INVALID");
        assert_eq!(endpoint.endpoint_id, "INVALID");
        assert_eq!(envelope.event.payload, serde_json::json!({}));
        assert!(envelope.context.is_none());
    }

    #[test]
    fn empty_strings_are_treated_as_unsupplied() {
        let envelope = ResponseEnvelope::new(ResponseOptions {
            namespace: Some(String::new()),
            token: Some(String::new()),
            correlation_token: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(envelope.event.header.namespace, "Alexa");
        assert!(envelope.event.header.correlation_token.is_none());
        assert_eq!(envelope.event.endpoint.unwrap().scope.token, "INVALID");
    }

    #[test]
    fn accept_grant_and_discover_responses_drop_the_endpoint() {
        for name in ["AcceptGrant.Response", "Discover.Response"] {
            let envelope = ResponseEnvelope::new(ResponseOptions {
                name: Some(name.to_string()),
                token: Some("tok".to_string()),
                ..Default::default()
            });
            assert!(envelope.event.endpoint.is_none(), "{name} must not carry an endpoint");
        }
        let other = ResponseEnvelope::new(ResponseOptions {
            name: Some("StateReport".to_string()),
            ..Default::default()
        });
        assert!(other.event.endpoint.is_some());
    }

    #[test]
    fn message_ids_are_unique_across_calls() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let envelope = ResponseEnvelope::new(ResponseOptions::default());
            assert!(seen.insert(envelope.event.header.message_id));
        }
    }

    #[test]
    fn context_property_defaults_to_endpoint_health() {
        let mut envelope = ResponseEnvelope::new(ResponseOptions::default());
        envelope.add_context_property(ContextPropertyOptions::default());
        let context = envelope.context.expect("context created on first property");
        let prop = &context.properties[0];
        assert_eq!(prop.namespace, "Alexa.EndpointHealth");
        assert_eq!(prop.name, "connectivity");
        assert_eq!(prop.value, serde_json::json!({ "value": "OK" }));
        assert_eq!(prop.uncertainty_in_milliseconds, 0);
        assert!(prop.instance.is_none());
        assert!(!prop.time_of_sample.is_empty());
    }

    #[test]
    fn context_property_keeps_supplied_instance() {
        let mut envelope = ResponseEnvelope::new(ResponseOptions::default());
        envelope.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.ModeController".to_string()),
            name: Some("mode".to_string()),
            instance: Some("Blinds.Position".to_string()),
            value: Some(serde_json::json!("Position.Up")),
            ..Default::default()
        });
        let prop = &envelope.context.unwrap().properties[0];
        assert_eq!(prop.instance.as_deref(), Some("Blinds.Position"));
        assert_eq!(prop.value, serde_json::json!("Position.Up"));
    }

    #[test]
    fn payload_endpoint_defaults_and_random_id() {
        let mut envelope = ResponseEnvelope::new(ResponseOptions {
            name: Some("Discover.Response".to_string()),
            ..Default::default()
        });
        envelope.add_payload_endpoint(EndpointOptions::default());
        let endpoints = envelope.event.payload["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 1);
        let entry = &endpoints[0];
        assert_eq!(entry["friendlyName"], "Sample Endpoint");
        assert_eq!(entry["description"], "Sample Endpoint Description");
        assert_eq!(entry["manufacturerName"], "Sample Manufacturer");
        assert_eq!(entry["displayCategories"], serde_json::json!(["OTHER"]));
        assert_eq!(entry["capabilities"], serde_json::json!([]));
        let id = entry["endpointId"].as_str().unwrap();
        assert!(id.starts_with("endpoint_"), "fallback id: {id}");
        assert_eq!(id.len(), "endpoint_".len() + 5);
    }

    #[test]
    fn additional_attributes_use_presence_of_key_semantics() {
        let mut envelope = ResponseEnvelope::new(ResponseOptions {
            name: Some("Discover.Response".to_string()),
            ..Default::default()
        });
        envelope.add_payload_endpoint(EndpointOptions::default());
        envelope.add_payload_endpoint(EndpointOptions {
            additional_attributes: Some(serde_json::json!({})),
            cookie: Some(serde_json::json!({})),
            ..Default::default()
        });
        let endpoints = envelope.event.payload["endpoints"].as_array().unwrap();
        assert!(endpoints[0].get("additionalAttributes").is_none());
        assert!(endpoints[0].get("cookie").is_none());
        assert!(endpoints[1].get("additionalAttributes").is_some());
        assert!(endpoints[1].get("cookie").is_some());
    }

    #[test]
    fn error_envelope_carries_type_and_message() {
        let envelope = ResponseEnvelope::error("INVALID_DIRECTIVE", "missing directive wrapper");
        assert_eq!(envelope.event.header.name, "ErrorResponse");
        assert_eq!(envelope.event.payload["type"], "INVALID_DIRECTIVE");
        assert_eq!(envelope.event.payload["message"], "missing directive wrapper");
    }
}
