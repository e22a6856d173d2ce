//! hearth-core: smart-home directive adapter (envelope builder, capability
//! factory, directive router, device state store, identity resolver).
//!
//! The router takes one raw directive and returns one response envelope;
//! transport glue (the gateway binary) stays outside this crate.

mod capability;
mod config;
mod envelope;
mod identity;
mod router;
mod store;

// Response envelope builder
pub use envelope::{
    ContextProperty, ContextPropertyOptions, EndpointDescriptor, EndpointOptions,
    ResponseContext, ResponseEndpoint, ResponseEnvelope, ResponseEvent, ResponseHeader,
    ResponseOptions, ResponseScope,
};

// Capability descriptor factory
pub use capability::{
    blinds_capability, capability, temp_sensor_capability, thermostat_capability,
    CapabilityDescriptor, CapabilityOptions, CapabilityProperties,
};

// Directive router
pub use router::{
    CredentialScope, Directive, DirectiveEndpoint, DirectiveHeader, DirectiveRouter,
};

// Device state store
pub use store::{
    DeviceState, DeviceStore, MemoryDeviceStore, SledDeviceStore, StoreError,
    DEFAULT_BLINDS_MODE, DEFAULT_LIGHT_STATE, DEFAULT_THERMOSTAT_MODE,
    DEFAULT_THERMOSTAT_TEMPERATURE,
};

// Identity resolver
pub use identity::{IdentityResolver, ProfileResolver};

// Configuration
pub use config::{AdapterConfig, TemperatureScale};
