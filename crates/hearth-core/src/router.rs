//! Directive router: validates inbound directives, dispatches by the
//! (namespace, name, instance) selector, and composes response envelopes.
//!
//! One directive in, one envelope out. Collaborator failures (store, identity
//! resolver) are logged at the call site and never propagated past the router;
//! the caller always receives a structurally valid envelope.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::capability::{self, CapabilityOptions};
use crate::config::AdapterConfig;
use crate::envelope::{ContextPropertyOptions, EndpointOptions, ResponseEnvelope, ResponseOptions};
use crate::identity::IdentityResolver;
use crate::store::{
    DeviceState, DeviceStore, DEFAULT_BLINDS_MODE, DEFAULT_LIGHT_STATE, DEFAULT_THERMOSTAT_MODE,
    DEFAULT_THERMOSTAT_TEMPERATURE,
};

const MANUFACTURER_NAME: &str = "Hearth Home";

/// Inbound command/query from the voice service.
#[derive(Debug, Clone, Deserialize)]
pub struct Directive {
    pub header: DirectiveHeader,
    #[serde(default)]
    pub endpoint: Option<DirectiveEndpoint>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveHeader {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub instance: Option<String>,
    pub payload_version: String,
    #[serde(default)]
    pub correlation_token: Option<String>,
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveEndpoint {
    pub endpoint_id: String,
    pub scope: CredentialScope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialScope {
    #[serde(rename = "type")]
    pub scope_type: String,
    pub token: String,
    #[serde(default)]
    pub partition: Option<String>,
}

/// Enumerated dispatch selector derived from the directive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector {
    AcceptGrant,
    Discover,
    ControlLight,
    ControlThermostat,
    ReportState,
    ControlBlinds,
}

impl Selector {
    fn from_header(header: &DirectiveHeader) -> Option<Self> {
        let instance = header.instance.as_deref();
        match (header.namespace.as_str(), header.name.as_str(), instance) {
            ("Alexa.Authorization", _, _) => Some(Selector::AcceptGrant),
            ("Alexa.Discovery", _, _) => Some(Selector::Discover),
            ("Alexa.PowerController", _, _) => Some(Selector::ControlLight),
            ("Alexa.ThermostatController", _, _) => Some(Selector::ControlThermostat),
            ("Alexa", "ReportState", _) => Some(Selector::ReportState),
            ("Alexa.ModeController", "SetMode", Some("Blinds.Position")) => {
                Some(Selector::ControlBlinds)
            }
            _ => None,
        }
    }
}

/// Replace endpointId-hostile characters in the identity prefix.
fn sanitize(prefix: &str) -> String {
    prefix.replace(['.', '+'], "-")
}

fn selector_label(header: &DirectiveHeader) -> String {
    let mut label = format!(
        "namespace {}, name {}",
        header.namespace, header.name
    );
    if let Some(instance) = &header.instance {
        label.push_str(&format!(", instance {instance}"));
    }
    label
}

/// Numeric payload version from the raw directive, tolerating string or
/// number encodings. `None` when absent or unparseable.
fn payload_version(raw: &Value) -> Option<f64> {
    match raw.pointer("/header/payloadVersion")? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Terminal per invocation: no cross-request state lives here. The external
/// store is the only shared mutable resource.
pub struct DirectiveRouter {
    config: AdapterConfig,
    store: Arc<dyn DeviceStore>,
    identity: Arc<dyn IdentityResolver>,
}

impl DirectiveRouter {
    pub fn new(
        config: AdapterConfig,
        store: Arc<dyn DeviceStore>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            config,
            store,
            identity,
        }
    }

    /// Handle one raw directive to completion.
    pub async fn handle(&self, request: &Value) -> ResponseEnvelope {
        let Some(raw) = request.get("directive") else {
            return ResponseEnvelope::error(
                "INVALID_DIRECTIVE",
                "Missing key: directive. Is the request a valid directive?",
            );
        };

        if payload_version(raw).is_some_and(|v| v < 3.0) {
            return ResponseEnvelope::error(
                "INTERNAL_ERROR",
                "This adapter only supports Smart Home API version 3 and above",
            );
        }

        let directive: Directive = match serde_json::from_value(raw.clone()) {
            Ok(d) => d,
            Err(e) => {
                warn!("directive failed to parse: {e}");
                return ResponseEnvelope::error(
                    "INVALID_DIRECTIVE",
                    &format!("Malformed directive: {e}"),
                );
            }
        };

        let label = selector_label(&directive.header);
        let Some(selector) = Selector::from_header(&directive.header) else {
            return ResponseEnvelope::error(
                "INTERNAL_ERROR",
                &format!("Unsupported directive: {label}"),
            );
        };
        info!("dispatching {label}");

        match selector {
            Selector::AcceptGrant => self.accept_grant(&directive),
            Selector::Discover => self.discover(&directive).await,
            Selector::ControlLight => self.control_light(&directive).await,
            Selector::ControlThermostat => self.control_thermostat(&directive).await,
            Selector::ReportState => self.report_state(&directive).await,
            Selector::ControlBlinds => self.control_blinds(&directive).await,
        }
    }

    /// ACK the authorization grant by echoing the credential back. No
    /// proactive events are sent, so there is nothing else to do.
    fn accept_grant(&self, directive: &Directive) -> ResponseEnvelope {
        let token = directive
            .payload
            .pointer("/scope/token")
            .and_then(Value::as_str)
            .map(str::to_string);
        let token_type = directive
            .payload
            .pointer("/scope/type")
            .and_then(Value::as_str)
            .map(str::to_string);

        ResponseEnvelope::new(ResponseOptions {
            namespace: Some("Alexa.Authorization".to_string()),
            name: Some("AcceptGrant.Response".to_string()),
            token,
            token_type,
            ..Default::default()
        })
    }

    /// Discovery: one light, one blinds, one thermostat per account unit,
    /// with endpointIds segmented by `sanitize(email + partition suffix)`.
    /// Each descriptor's default state is seeded into the store
    /// fire-and-forget.
    async fn discover(&self, directive: &Directive) -> ResponseEnvelope {
        let token = directive
            .payload
            .pointer("/scope/token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let token_type = directive
            .payload
            .pointer("/scope/type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Delegation flow scopes the unit by (account, partition); the
        // authorization flow by account alone.
        let partition_suffix = if token_type == "BearerTokenWithPartition" {
            let partition = directive
                .payload
                .pointer("/scope/partition")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("-{partition}")
        } else {
            String::new()
        };

        let Some(email) = self.identity.resolve(&token).await else {
            warn!("identity resolution failed; cannot segment discovery endpoints");
            return ResponseEnvelope::error(
                "INTERNAL_ERROR",
                "Could not resolve the account identity for discovery",
            );
        };

        let prefix = sanitize(&format!("{email}{partition_suffix}"));

        let mut response = ResponseEnvelope::new(ResponseOptions {
            namespace: Some("Alexa.Discovery".to_string()),
            name: Some("Discover.Response".to_string()),
            token: Some(token),
            token_type: Some(token_type),
            ..Default::default()
        });

        // Shared by every device: the plain Alexa interface and endpoint health.
        let alexa_capability = capability::capability(CapabilityOptions::default());
        let health_capability = capability::capability(CapabilityOptions {
            interface: Some("Alexa.EndpointHealth".to_string()),
            version: Some("3.2".to_string()),
            supported: Some(json!([{ "name": "connectivity" }])),
            retrievable: Some(true),
            proactively_reported: Some(false),
            ..Default::default()
        });

        let light_id = format!("{prefix}-light");
        let light_capability = capability::capability(CapabilityOptions {
            interface: Some("Alexa.PowerController".to_string()),
            supported: Some(json!([{ "name": "powerState" }])),
            retrievable: Some(true),
            proactively_reported: Some(false),
            ..Default::default()
        });
        response.add_payload_endpoint(EndpointOptions {
            endpoint_id: Some(light_id.clone()),
            friendly_name: Some("Light".to_string()),
            description: Some("Smart light".to_string()),
            display_categories: Some(vec!["LIGHT".to_string()]),
            manufacturer_name: Some(MANUFACTURER_NAME.to_string()),
            capabilities: Some(vec![
                alexa_capability.clone(),
                health_capability.clone(),
                light_capability,
            ]),
            additional_attributes: Some(device_attributes("Hearth Light", &light_id)),
            ..Default::default()
        });
        if let Err(e) = self.store.persist_light(&light_id, DEFAULT_LIGHT_STATE).await {
            warn!("failed to seed state for {light_id}: {e}");
        }

        let blinds_id = format!("{prefix}-blinds");
        let blinds_capability = capability::blinds_capability(CapabilityOptions {
            interface: Some("Alexa.ModeController".to_string()),
            version: Some("3".to_string()),
            supported: Some(json!([{ "name": "mode" }])),
            retrievable: Some(true),
            proactively_reported: Some(false),
            ..Default::default()
        });
        response.add_payload_endpoint(EndpointOptions {
            endpoint_id: Some(blinds_id.clone()),
            friendly_name: Some("Blinds".to_string()),
            description: Some("Smart blinds".to_string()),
            display_categories: Some(vec!["INTERIOR_BLIND".to_string()]),
            manufacturer_name: Some(MANUFACTURER_NAME.to_string()),
            capabilities: Some(vec![
                alexa_capability.clone(),
                health_capability.clone(),
                blinds_capability,
            ]),
            additional_attributes: Some(device_attributes("Hearth Blinds", &blinds_id)),
            ..Default::default()
        });
        if let Err(e) = self.store.persist_blinds(&blinds_id, DEFAULT_BLINDS_MODE).await {
            warn!("failed to seed state for {blinds_id}: {e}");
        }

        let thermostat_id = format!("{prefix}-thermostat");
        let thermostat_capability = capability::thermostat_capability(CapabilityOptions {
            interface: Some("Alexa.ThermostatController".to_string()),
            version: Some("3.2".to_string()),
            supported: Some(json!([{ "name": "targetSetpoint" }, { "name": "thermostatMode" }])),
            retrievable: Some(true),
            proactively_reported: Some(false),
            ..Default::default()
        });
        let temp_sensor_capability = capability::temp_sensor_capability(CapabilityOptions {
            interface: Some("Alexa.TemperatureSensor".to_string()),
            version: Some("3".to_string()),
            supported: Some(json!([{ "name": "temperature" }])),
            retrievable: Some(true),
            proactively_reported: Some(false),
            ..Default::default()
        });
        response.add_payload_endpoint(EndpointOptions {
            endpoint_id: Some(thermostat_id.clone()),
            friendly_name: Some("Thermostat".to_string()),
            description: Some("Smart thermostat".to_string()),
            display_categories: Some(vec![
                "THERMOSTAT".to_string(),
                "TEMPERATURE_SENSOR".to_string(),
            ]),
            manufacturer_name: Some(MANUFACTURER_NAME.to_string()),
            capabilities: Some(vec![
                alexa_capability,
                health_capability,
                thermostat_capability,
                temp_sensor_capability,
            ]),
            additional_attributes: Some(device_attributes("Hearth Thermostat", &thermostat_id)),
            ..Default::default()
        });
        if let Err(e) = self
            .store
            .persist_thermostat(
                &thermostat_id,
                DEFAULT_THERMOSTAT_TEMPERATURE,
                DEFAULT_THERMOSTAT_MODE,
            )
            .await
        {
            warn!("failed to seed state for {thermostat_id}: {e}");
        }

        response
    }

    /// PowerController: `TurnOn` maps to "ON", anything else to "OFF".
    async fn control_light(&self, directive: &Directive) -> ResponseEnvelope {
        let endpoint = match require_endpoint(directive) {
            Ok(e) => e,
            Err(error) => return error,
        };
        let light_state = if directive.header.name == "TurnOn" { "ON" } else { "OFF" };

        let mut response = control_response(directive, endpoint);
        response.add_context_property(ContextPropertyOptions::default());
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.PowerController".to_string()),
            name: Some("powerState".to_string()),
            value: Some(json!(light_state)),
            ..Default::default()
        });

        if let Err(e) = self.store.persist_light(&endpoint.endpoint_id, light_state).await {
            warn!("failed to persist light state for {}: {e}", endpoint.endpoint_id);
        }
        response
    }

    /// ThermostatController: reads current state first so relative adjustments
    /// stay decoupled from absolute sets, then writes the merged state back.
    async fn control_thermostat(&self, directive: &Directive) -> ResponseEnvelope {
        let endpoint = match require_endpoint(directive) {
            Ok(e) => e,
            Err(error) => return error,
        };
        let endpoint_id = endpoint.endpoint_id.as_str();

        let current = match self.store.retrieve(endpoint_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to read state for {endpoint_id}: {e}");
                DeviceState::default()
            }
        };

        let mut target_temperature = current
            .thermostat_temperature
            .as_deref()
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0);
        let mut thermostat_mode = current
            .thermostat_mode
            .clone()
            .unwrap_or_else(|| DEFAULT_THERMOSTAT_MODE.to_string());

        match directive.header.name.as_str() {
            "SetTargetTemperature" => {
                target_temperature = directive
                    .payload
                    .pointer("/targetSetpoint/value")
                    .and_then(Value::as_f64)
                    .unwrap_or(target_temperature);
            }
            "AdjustTargetTemperature" => {
                if current.thermostat_temperature.is_none() {
                    warn!("adjusting temperature for {endpoint_id} with no stored value");
                }
                let delta = directive
                    .payload
                    .pointer("/targetSetpointDelta/value")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                target_temperature += delta;
            }
            "SetThermostatMode" => {
                if let Some(mode) = directive
                    .payload
                    .pointer("/thermostatMode/value")
                    .and_then(Value::as_str)
                {
                    thermostat_mode = mode.to_string();
                }
            }
            other => {
                info!("unhandled thermostat directive {other}; state unchanged");
            }
        }

        let temperature_value = json!({
            "value": target_temperature,
            "scale": self.config.temperature_scale.as_str(),
        });

        let mut response = control_response(directive, endpoint);
        response.add_context_property(ContextPropertyOptions::default());
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.ThermostatController".to_string()),
            name: Some("thermostatMode".to_string()),
            value: Some(json!(thermostat_mode)),
            ..Default::default()
        });
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.ThermostatController".to_string()),
            name: Some("targetSetpoint".to_string()),
            value: Some(temperature_value.clone()),
            ..Default::default()
        });
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.TemperatureSensor".to_string()),
            name: Some("temperature".to_string()),
            value: Some(temperature_value),
            ..Default::default()
        });

        if let Err(e) = self
            .store
            .persist_thermostat(endpoint_id, &target_temperature.to_string(), &thermostat_mode)
            .await
        {
            warn!("failed to persist thermostat state for {endpoint_id}: {e}");
        }
        response
    }

    /// ModeController blinds: a stateless set straight from the payload; no
    /// read-before-write needed.
    async fn control_blinds(&self, directive: &Directive) -> ResponseEnvelope {
        let endpoint = match require_endpoint(directive) {
            Ok(e) => e,
            Err(error) => return error,
        };
        let Some(blinds_mode) = directive.payload.get("mode").and_then(Value::as_str) else {
            return ResponseEnvelope::error(
                "INVALID_DIRECTIVE",
                "SetMode directive is missing payload.mode",
            );
        };

        let mut response = control_response(directive, endpoint);
        response.add_context_property(ContextPropertyOptions::default());
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.ModeController".to_string()),
            name: Some("mode".to_string()),
            instance: Some("Blinds.Position".to_string()),
            value: Some(json!(blinds_mode)),
            ..Default::default()
        });

        if let Err(e) = self.store.persist_blinds(&endpoint.endpoint_id, blinds_mode).await {
            warn!("failed to persist blinds state for {}: {e}", endpoint.endpoint_id);
        }
        response
    }

    /// StateReport: one context property per present field of the stored
    /// state; absent fields are simply omitted. No writes.
    async fn report_state(&self, directive: &Directive) -> ResponseEnvelope {
        let endpoint = match require_endpoint(directive) {
            Ok(e) => e,
            Err(error) => return error,
        };
        let endpoint_id = endpoint.endpoint_id.as_str();

        let state = match self.store.retrieve(endpoint_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!("failed to read state for {endpoint_id}: {e}");
                DeviceState::default()
            }
        };

        let mut response = ResponseEnvelope::new(ResponseOptions {
            namespace: Some("Alexa".to_string()),
            name: Some("StateReport".to_string()),
            correlation_token: directive.header.correlation_token.clone(),
            token: Some(endpoint.scope.token.clone()),
            token_type: Some(endpoint.scope.scope_type.clone()),
            endpoint_id: Some(endpoint_id.to_string()),
            ..Default::default()
        });
        response.add_context_property(ContextPropertyOptions::default());

        if let Some(light_state) = &state.light_state {
            response.add_context_property(ContextPropertyOptions {
                namespace: Some("Alexa.PowerController".to_string()),
                name: Some("powerState".to_string()),
                value: Some(json!(light_state)),
                ..Default::default()
            });
        }

        if let Some(blinds_mode) = &state.blinds_mode {
            response.add_context_property(ContextPropertyOptions {
                namespace: Some("Alexa.ModeController".to_string()),
                name: Some("mode".to_string()),
                instance: Some("Blinds.Position".to_string()),
                value: Some(json!(blinds_mode)),
                ..Default::default()
            });
        }

        if let Some(temperature) = &state.thermostat_temperature {
            let parsed = temperature.parse::<f64>().unwrap_or_else(|_| {
                warn!("stored temperature for {endpoint_id} is not numeric: {temperature}");
                0.0
            });
            let temperature_value = json!({
                "value": parsed,
                "scale": self.config.temperature_scale.as_str(),
            });
            response.add_context_property(ContextPropertyOptions {
                namespace: Some("Alexa.ThermostatController".to_string()),
                name: Some("targetSetpoint".to_string()),
                value: Some(temperature_value.clone()),
                ..Default::default()
            });
            response.add_context_property(ContextPropertyOptions {
                namespace: Some("Alexa.TemperatureSensor".to_string()),
                name: Some("temperature".to_string()),
                value: Some(temperature_value),
                ..Default::default()
            });
        }

        if let Some(thermostat_mode) = &state.thermostat_mode {
            response.add_context_property(ContextPropertyOptions {
                namespace: Some("Alexa.ThermostatController".to_string()),
                name: Some("thermostatMode".to_string()),
                value: Some(json!(thermostat_mode)),
                ..Default::default()
            });
        }

        response
    }
}

/// Control and report directives require the endpoint block; without it there
/// is no device to act on, so the caller gets a protocol error envelope.
fn require_endpoint(directive: &Directive) -> Result<&DirectiveEndpoint, ResponseEnvelope> {
    directive.endpoint.as_ref().ok_or_else(|| {
        ResponseEnvelope::error("INVALID_DIRECTIVE", "Directive is missing the endpoint block")
    })
}

/// Base response options for device-control handlers: propagate the
/// correlation token, credential scope, and endpointId from the directive.
fn control_response(directive: &Directive, endpoint: &DirectiveEndpoint) -> ResponseEnvelope {
    ResponseEnvelope::new(ResponseOptions {
        correlation_token: directive.header.correlation_token.clone(),
        token: Some(endpoint.scope.token.clone()),
        token_type: Some(endpoint.scope.scope_type.clone()),
        endpoint_id: Some(endpoint.endpoint_id.clone()),
        ..Default::default()
    })
}

fn device_attributes(model: &str, serial_number: &str) -> Value {
    json!({
        "manufacturer": MANUFACTURER_NAME,
        "model": model,
        "serialNumber": serial_number,
        "firmwareVersion": "1.0",
        "softwareVersion": "1.0",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(namespace: &str, name: &str, instance: Option<&str>) -> DirectiveHeader {
        DirectiveHeader {
            namespace: namespace.to_string(),
            name: name.to_string(),
            instance: instance.map(str::to_string),
            payload_version: "3".to_string(),
            correlation_token: None,
            message_id: "msg-1".to_string(),
        }
    }

    #[test]
    fn selector_table_matches_the_dispatch_contract() {
        assert_eq!(
            Selector::from_header(&header("Alexa.Authorization", "AcceptGrant", None)),
            Some(Selector::AcceptGrant)
        );
        assert_eq!(
            Selector::from_header(&header("Alexa.Discovery", "Discover", None)),
            Some(Selector::Discover)
        );
        assert_eq!(
            Selector::from_header(&header("Alexa.PowerController", "TurnOn", None)),
            Some(Selector::ControlLight)
        );
        assert_eq!(
            Selector::from_header(&header("Alexa.ThermostatController", "SetThermostatMode", None)),
            Some(Selector::ControlThermostat)
        );
        assert_eq!(
            Selector::from_header(&header("Alexa", "ReportState", None)),
            Some(Selector::ReportState)
        );
        assert_eq!(
            Selector::from_header(&header("Alexa.ModeController", "SetMode", Some("Blinds.Position"))),
            Some(Selector::ControlBlinds)
        );
        // Instance gates the blinds route; a different instance must not match.
        assert_eq!(
            Selector::from_header(&header("Alexa.ModeController", "SetMode", Some("Fan.Speed"))),
            None
        );
        assert_eq!(Selector::from_header(&header("Alexa", "Ping", None)), None);
        assert_eq!(Selector::from_header(&header("Alexa.Foo", "Bar", None)), None);
    }

    #[test]
    fn sanitize_replaces_dots_and_pluses() {
        assert_eq!(sanitize("a.b+c@x.com"), "a-b-c@x-com");
        assert_eq!(sanitize("plain@host"), "plain@host");
    }

    #[test]
    fn payload_version_tolerates_string_and_number() {
        let as_string = json!({ "header": { "payloadVersion": "2" } });
        assert_eq!(payload_version(&as_string), Some(2.0));
        let as_number = json!({ "header": { "payloadVersion": 3 } });
        assert_eq!(payload_version(&as_number), Some(3.0));
        let absent = json!({ "header": {} });
        assert_eq!(payload_version(&absent), None);
    }
}
