//! Capability descriptor factory for discovery payloads.
//!
//! The blinds and thermostat variants embed fixed protocol vocabulary
//! (supported modes, friendly-name assets, semantics mappings). Those blocks
//! are wire constants and must round-trip exactly as written.

use serde::Serialize;
use serde_json::{json, Value};

/// Declares what a device endpoint can do; used only during discovery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    #[serde(rename = "type")]
    pub capability_type: String,
    pub interface: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<CapabilityProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantics: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProperties {
    pub supported: Value,
    pub proactively_reported: bool,
    pub retrievable: bool,
}

/// Options for the factory functions. Unset fields take the base defaults
/// (`type = "AlexaInterface"`, `interface = "Alexa"`, `version = "3"`).
#[derive(Debug, Clone, Default)]
pub struct CapabilityOptions {
    pub capability_type: Option<String>,
    pub interface: Option<String>,
    pub version: Option<String>,
    /// Supported property names, e.g. `[{"name": "powerState"}]`. Attaches the
    /// `properties` block when supplied.
    pub supported: Option<Value>,
    pub proactively_reported: Option<bool>,
    pub retrievable: Option<bool>,
    /// Attaches `configuration.supportedIntents` when supplied.
    pub supported_intents: Option<Value>,
}

fn filled(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Base capability: the plain `Alexa` interface unless options say otherwise.
pub fn capability(opts: CapabilityOptions) -> CapabilityDescriptor {
    let properties = opts.supported.filter(non_empty).map(|supported| CapabilityProperties {
        supported,
        proactively_reported: opts.proactively_reported.unwrap_or(false),
        retrievable: opts.retrievable.unwrap_or(false),
    });
    let configuration = opts
        .supported_intents
        .filter(non_empty)
        .map(|intents| json!({ "supportedIntents": intents }));

    CapabilityDescriptor {
        capability_type: filled(opts.capability_type, "AlexaInterface"),
        interface: filled(opts.interface, "Alexa"),
        version: filled(opts.version, "3"),
        instance: None,
        properties,
        configuration,
        capability_resources: None,
        semantics: None,
    }
}

fn non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        Value::Number(_) => true,
    }
}

/// Mode-controller blinds capability with the fixed `Blinds.Position`
/// instance, friendly-name assets, supported modes, and semantics mappings.
pub fn blinds_capability(opts: CapabilityOptions) -> CapabilityDescriptor {
    let mut descriptor = capability(opts);
    descriptor.instance = Some("Blinds.Position".to_string());

    descriptor.capability_resources = Some(json!({
        "friendlyNames": [
            { "@type": "asset", "value": { "assetId": "Alexa.Setting.Opening" } }
        ]
    }));

    descriptor.configuration = Some(json!({
        "ordered": false,
        "supportedModes": [
            {
                "value": "Position.Up",
                "modeResources": {
                    "friendlyNames": [
                        { "@type": "asset", "value": { "assetId": "Alexa.Value.Open" } }
                    ]
                }
            },
            {
                "value": "Position.Down",
                "modeResources": {
                    "friendlyNames": [
                        { "@type": "asset", "value": { "assetId": "Alexa.Value.Close" } }
                    ]
                }
            }
        ]
    }));

    descriptor.semantics = Some(json!({
        "actionMappings": [
            {
                "@type": "ActionsToDirective",
                "actions": ["Alexa.Actions.Close", "Alexa.Actions.Lower"],
                "directive": { "name": "SetMode", "payload": { "mode": "Position.Down" } }
            },
            {
                "@type": "ActionsToDirective",
                "actions": ["Alexa.Actions.Open", "Alexa.Actions.Raise"],
                "directive": { "name": "SetMode", "payload": { "mode": "Position.Up" } }
            }
        ],
        "stateMappings": [
            { "@type": "StatesToValue", "states": ["Alexa.States.Closed"], "value": "Position.Down" },
            { "@type": "StatesToValue", "states": ["Alexa.States.Open"], "value": "Position.Up" }
        ]
    }));

    descriptor
}

/// Thermostat capability with the fixed single-setpoint mode list.
pub fn thermostat_capability(opts: CapabilityOptions) -> CapabilityDescriptor {
    let mut descriptor = capability(opts);
    descriptor.configuration = Some(json!({
        "supportedModes": ["HEAT", "COOL", "AUTO", "ECO", "OFF"]
    }));
    descriptor
}

/// Temperature sensor capability; no extra configuration beyond the base.
pub fn temp_sensor_capability(opts: CapabilityOptions) -> CapabilityDescriptor {
    capability(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_capability_defaults() {
        let cap = capability(CapabilityOptions::default());
        assert_eq!(cap.capability_type, "AlexaInterface");
        assert_eq!(cap.interface, "Alexa");
        assert_eq!(cap.version, "3");
        assert!(cap.properties.is_none());
        assert!(cap.configuration.is_none());
        assert!(cap.instance.is_none());
    }

    #[test]
    fn supported_attaches_properties_block() {
        let cap = capability(CapabilityOptions {
            interface: Some("Alexa.PowerController".to_string()),
            supported: Some(json!([{ "name": "powerState" }])),
            retrievable: Some(true),
            ..Default::default()
        });
        let props = cap.properties.expect("supported implies properties");
        assert_eq!(props.supported, json!([{ "name": "powerState" }]));
        assert!(props.retrievable);
        assert!(!props.proactively_reported);
    }

    #[test]
    fn supported_intents_attach_configuration() {
        let cap = capability(CapabilityOptions {
            supported_intents: Some(json!(["GetStatus"])),
            ..Default::default()
        });
        assert_eq!(
            cap.configuration,
            Some(json!({ "supportedIntents": ["GetStatus"] }))
        );
    }

    #[test]
    fn blinds_capability_reproduces_protocol_constants() {
        let cap = blinds_capability(CapabilityOptions {
            interface: Some("Alexa.ModeController".to_string()),
            supported: Some(json!([{ "name": "mode" }])),
            retrievable: Some(true),
            ..Default::default()
        });
        assert_eq!(cap.instance.as_deref(), Some("Blinds.Position"));

        let config = cap.configuration.unwrap();
        assert_eq!(config["ordered"], json!(false));
        assert_eq!(config["supportedModes"][0]["value"], "Position.Up");
        assert_eq!(config["supportedModes"][1]["value"], "Position.Down");

        let semantics = cap.semantics.unwrap();
        let actions = &semantics["actionMappings"];
        assert_eq!(actions[0]["actions"], json!(["Alexa.Actions.Close", "Alexa.Actions.Lower"]));
        assert_eq!(actions[0]["directive"]["payload"]["mode"], "Position.Down");
        assert_eq!(actions[1]["actions"], json!(["Alexa.Actions.Open", "Alexa.Actions.Raise"]));
        assert_eq!(actions[1]["directive"]["payload"]["mode"], "Position.Up");
        let states = &semantics["stateMappings"];
        assert_eq!(states[0]["states"], json!(["Alexa.States.Closed"]));
        assert_eq!(states[0]["value"], "Position.Down");
        assert_eq!(states[1]["states"], json!(["Alexa.States.Open"]));
        assert_eq!(states[1]["value"], "Position.Up");

        let resources = cap.capability_resources.unwrap();
        assert_eq!(
            resources["friendlyNames"][0]["value"]["assetId"],
            "Alexa.Setting.Opening"
        );
    }

    #[test]
    fn thermostat_capability_lists_the_five_modes() {
        let cap = thermostat_capability(CapabilityOptions {
            interface: Some("Alexa.ThermostatController".to_string()),
            version: Some("3.2".to_string()),
            ..Default::default()
        });
        assert_eq!(cap.version, "3.2");
        assert_eq!(
            cap.configuration.unwrap()["supportedModes"],
            json!(["HEAT", "COOL", "AUTO", "ECO", "OFF"])
        );
    }

    #[test]
    fn temp_sensor_capability_has_no_configuration() {
        let cap = temp_sensor_capability(CapabilityOptions {
            interface: Some("Alexa.TemperatureSensor".to_string()),
            supported: Some(json!([{ "name": "temperature" }])),
            ..Default::default()
        });
        assert!(cap.configuration.is_none());
        assert!(cap.properties.is_some());
    }
}
