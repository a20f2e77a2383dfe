//! Capability-driven control core for Yamaha networked AV receivers
//!
//! This library turns a receiver's capability descriptor into host entities
//! (a media player and a remote per zone) and validates every host command
//! against what the zone actually declares before it reaches the device. It
//! supports:
//!
//! - Parsing the `getFeatures` capability descriptor
//! - Table-driven composition of per-zone attributes and commands
//! - Command validation (ranges, enumerated choices) and translation into native requests
//! - Zone state tracking with optimistic updates and device confirmation
//! - Attribute delta subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use yamaha_avr::{AvrController, Command, ReceiverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReceiverConfig::new("AABBCCDDEEFF", "Living Room", "192.168.1.20");
//!     let descriptor: serde_json::Value = serde_json::from_str(&std::fs::read_to_string("features.json")?)?;
//!
//!     let (controller, mut requests) = AvrController::new(config, &descriptor)?;
//!     for entity in controller.entities() {
//!         println!("{} ({})", entity.entity_id, entity.kind);
//!     }
//!
//!     // Hand routed requests to the HTTP transport
//!     tokio::spawn(async move {
//!         while let Some(request) = requests.recv().await {
//!             println!("GET http://192.168.1.20{}", request.path());
//!         }
//!     });
//!
//!     let mut deltas = controller.subscribe();
//!     controller.execute("main", &Command::VolumeUp)?;
//!     controller.apply_event_payload(&serde_json::json!({"main": {"volume": 41}}));
//!
//!     while let Ok(delta) = deltas.recv().await {
//!         println!("Attribute update: {:?}", delta);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Capability**: descriptor parsing into the typed capability model
//! - **Entity**: the capability table and per-zone entity composition
//! - **Router**: command validation and native request construction
//! - **State**: zone state tracking and device event reconciliation
//! - **Controller**: serialized facade tying the above together
//! - **Protocol**: native request structure handed to the transport

mod capability;
mod command;
mod config;
mod controller;
mod entity;
mod error;
pub mod logging;
mod protocol;
mod router;
mod state;
mod subscription;
mod types;

// Public exports
pub use capability::{parse_descriptor, parse_descriptor_str};
pub use command::{Command, CommandBatch, CommandKind};
pub use config::ReceiverConfig;
pub use controller::AvrController;
pub use entity::{
    compose, entity_id, parse_entity_id, Attribute, CapabilityRule, ChoiceSource, CommandSpec,
    EntityDefinition, EntityKind, ZoneEntityDefinition, CAPABILITY_RULES, SLEEP_CHOICES,
};
pub use error::{AvrError, Result};
pub use protocol::{NativeRequest, API_BASE};
pub use router::{CommandRouter, Definitions, RoutedCommand};
pub use state::{
    split_event_payload, AttributeChange, AttributeDelta, DeviceEvent, OptimisticUpdate,
    ZoneState, ZoneStateTracker,
};
pub use subscription::{DeltaReceiver, RequestStream};
pub use types::{
    CapabilityModel, DescriptorWarning, FunctionTag, InputId, PlaybackState, PowerState, Range,
    TriState, Zone, ZoneId,
};
