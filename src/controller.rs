use crate::capability::parse_descriptor;
use crate::command::{Command, CommandBatch};
use crate::config::ReceiverConfig;
use crate::entity::{compose, parse_entity_id, EntityDefinition, ZoneEntityDefinition};
use crate::error::{AvrError, Result};
use crate::protocol::NativeRequest;
use crate::router::{CommandRouter, Definitions, RoutedCommand};
use crate::state::{split_event_payload, AttributeDelta, DeviceEvent, ZoneState, ZoneStateTracker};
use crate::subscription::{DeltaReceiver, RequestStream};
use crate::types::{CapabilityModel, ZoneId};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const DELTA_CHANNEL_CAPACITY: usize = 100;

/// Everything derived from one capability descriptor plus the observed state
struct Session {
    model: CapabilityModel,
    definitions: Definitions,
    tracker: ZoneStateTracker,
}

impl Session {
    fn new(model: CapabilityModel) -> Self {
        let mut session = Self {
            model,
            definitions: Definitions::new(),
            tracker: ZoneStateTracker::new(),
        };
        session.recompose();
        session
    }

    fn recompose(&mut self) {
        self.definitions = self
            .model
            .zones
            .iter()
            .map(|zone| (zone.id.clone(), compose(zone)))
            .collect();

        let zone_ids: BTreeSet<ZoneId> = self.definitions.keys().cloned().collect();
        self.tracker.retain_zones(&zone_ids);
        for definition in self.definitions.values() {
            self.tracker.register(definition);
        }
    }
}

/// Control surface of one receiver
///
/// The controller composes zone entities from the capability descriptor,
/// routes host commands into [`NativeRequest`]s for the transport and keeps
/// zone state in step with device events. It never touches the network: routed
/// requests are queued on the [`RequestStream`] returned by [`AvrController::new`]
/// and device events are fed back through [`AvrController::apply_device_event`].
///
/// All operations on one controller are serialized, so an optimistic update
/// and a device event for the same zone never interleave, and a descriptor
/// refresh never overlaps a routing call.
///
/// # Example
///
/// ```no_run
/// use yamaha_avr::{AvrController, Command, ReceiverConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ReceiverConfig::new("AABBCCDDEEFF", "Living Room", "192.168.1.20");
/// let descriptor = serde_json::json!({
///     "zone": [{
///         "id": "main",
///         "func_list": ["power", "volume", "mute"],
///         "range_step": [{"id": "volume", "min": 0, "max": 161, "step": 1}]
///     }]
/// });
///
/// let (controller, mut requests) = AvrController::new(config, &descriptor)?;
/// controller.execute("main", &Command::VolumeSet(60.0))?;
///
/// let request = requests.try_recv().expect("request queued");
/// assert_eq!(request.path(), "/YamahaExtendedControl/v1/main/setVolume?volume=60");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AvrController {
    config: Arc<ReceiverConfig>,
    router: CommandRouter,
    session: Arc<Mutex<Session>>,
    request_tx: mpsc::UnboundedSender<NativeRequest>,
    delta_tx: broadcast::Sender<AttributeDelta>,
}

impl AvrController {
    /// Parse the descriptor and compose all zones
    ///
    /// Fails with [`AvrError::MalformedDescriptor`] if the descriptor is unusable,
    /// in which case no entities exist.
    pub fn new(config: ReceiverConfig, descriptor: &serde_json::Value) -> Result<(Self, RequestStream)> {
        config.validate()?;
        let model = parse_descriptor(descriptor)?;

        tracing::info!(
            "[{}] Composed {} zone(s) from capability descriptor ({} warning(s))",
            config.log_id(),
            model.zones.len(),
            model.warnings.len()
        );

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (delta_tx, _) = broadcast::channel(DELTA_CHANNEL_CAPACITY);

        let controller = Self {
            router: CommandRouter::new(config.effective_volume_step()),
            config: Arc::new(config),
            session: Arc::new(Mutex::new(Session::new(model))),
            request_tx,
            delta_tx,
        };

        Ok((controller, RequestStream::new(request_rx)))
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Get a copy of the parsed capability model
    pub fn capabilities(&self) -> CapabilityModel {
        self.session.lock().model.clone()
    }

    /// Get the ids of all zones in presentation order
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.session.lock().model.zone_ids()
    }

    /// Get the composed definition of a zone
    pub fn definition(&self, zone_id: &str) -> Option<ZoneEntityDefinition> {
        self.session.lock().definitions.get(zone_id).cloned()
    }

    /// Get all composed definitions in zone order
    pub fn definitions(&self) -> Vec<ZoneEntityDefinition> {
        let session = self.session.lock();
        session
            .model
            .zones
            .iter()
            .filter_map(|zone| session.definitions.get(&zone.id).cloned())
            .collect()
    }

    /// Get the host entities of all zones in zone order
    pub fn entities(&self) -> Vec<EntityDefinition> {
        self.definitions()
            .iter()
            .flat_map(|definition| definition.entities(&self.config))
            .collect()
    }

    /// Get a snapshot of a zone's state
    pub fn zone_state(&self, zone_id: &str) -> Option<ZoneState> {
        self.session.lock().tracker.state(zone_id).cloned()
    }

    /// Subscribe to attribute deltas
    pub fn subscribe(&self) -> DeltaReceiver {
        DeltaReceiver::new(self.delta_tx.subscribe())
    }

    /// Validate a command, queue its native request and apply any optimistic state
    ///
    /// A rejected command leaves state untouched and queues nothing.
    pub fn execute(&self, zone_id: &str, command: &Command) -> Result<NativeRequest> {
        let mut session = self.session.lock();

        let routed = self
            .router
            .route(&session.definitions, &session.tracker, zone_id, command)
            .map_err(|e| {
                tracing::info!("[{}] Rejected {:?} for {}: {}", self.config.log_id(), command, zone_id, e);
                e
            })?;

        self.dispatch(&mut session, zone_id, routed)
    }

    /// Execute several commands for one zone in order
    ///
    /// Every step is validated against the state the earlier steps would
    /// leave behind before anything is queued, so a rejected step queues
    /// nothing. `pause` is attached to each request for the transport.
    pub fn execute_batch(&self, zone_id: &str, batch: &CommandBatch) -> Result<Vec<NativeRequest>> {
        let mut session = self.session.lock();

        let mut scratch = session.tracker.clone();
        let mut routed_steps = Vec::with_capacity(batch.commands.len());
        for command in &batch.commands {
            let mut routed = self
                .router
                .route(&session.definitions, &scratch, zone_id, command)
                .map_err(|e| {
                    tracing::info!("[{}] Rejected {:?} for {}: {}", self.config.log_id(), command, zone_id, e);
                    e
                })?;
            if let Some(update) = routed.optimistic {
                scratch.apply_optimistic(zone_id, update);
            }
            if !batch.delay.is_zero() {
                routed.request.pause_ms = Some(batch.delay.as_millis() as u64);
            }
            routed_steps.push(routed);
        }

        routed_steps
            .into_iter()
            .map(|routed| self.dispatch(&mut session, zone_id, routed))
            .collect()
    }

    /// Execute a host command addressed to one of this receiver's entities
    ///
    /// Sequences (`send_cmd_sequence`) yield one request per step.
    pub fn execute_entity(
        &self,
        entity_id: &str,
        cmd_id: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Vec<NativeRequest>> {
        let (kind, device_id, zone_id) = parse_entity_id(entity_id)?;
        if device_id != self.config.identifier {
            return Err(AvrError::UnknownEntity(entity_id.to_string()));
        }

        tracing::info!(
            "[{}] Got {} command request: {} {}",
            self.config.log_id(),
            entity_id,
            cmd_id,
            params.map(|p| p.to_string()).unwrap_or_default()
        );

        let batch = CommandBatch::from_host(&zone_id, cmd_id, params)?;
        if let Some(command) = batch.commands.iter().find(|c| !kind.accepts(c.kind())) {
            return Err(AvrError::UnsupportedCommand {
                zone: zone_id,
                command: command.kind().to_string(),
            });
        }
        self.execute_batch(&zone_id, &batch)
    }

    /// Apply a device-reported event for one zone
    ///
    /// Deltas reach subscribers in the order they were applied.
    pub fn apply_device_event(&self, zone_id: &str, event: &DeviceEvent) -> Option<AttributeDelta> {
        let mut session = self.session.lock();
        let delta = session.tracker.apply_device_event(zone_id, event)?;
        self.publish(delta.clone());
        Some(delta)
    }

    /// Apply a pushed event document covering any number of zones
    pub fn apply_event_payload(&self, payload: &serde_json::Value) -> Vec<AttributeDelta> {
        let mut session = self.session.lock();
        let Session {
            definitions,
            tracker,
            ..
        } = &mut *session;
        let deltas: Vec<AttributeDelta> = split_event_payload(payload)
            .into_iter()
            .filter(|(zone_id, _)| definitions.contains_key(zone_id))
            .filter_map(|(zone_id, event)| tracker.apply_device_event(&zone_id, &event))
            .collect();

        for delta in &deltas {
            self.publish(delta.clone());
        }
        deltas
    }

    /// Re-derive all zones from a new descriptor, e.g. after a firmware update
    ///
    /// State of zones that still exist is kept, vanished zones are dropped.
    /// On failure the current model stays in place.
    pub fn refresh_capabilities(&self, descriptor: &serde_json::Value) -> Result<()> {
        let model = parse_descriptor(descriptor)?;
        let mut session = self.session.lock();
        session.model = model;
        session.recompose();
        tracing::info!(
            "[{}] Recomposed {} zone(s) after descriptor refresh",
            self.config.log_id(),
            session.definitions.len()
        );
        Ok(())
    }

    /// Start over after a reconnect: discard all state and compose from a fresh descriptor
    pub fn reset(&self, descriptor: &serde_json::Value) -> Result<()> {
        let model = parse_descriptor(descriptor)?;
        *self.session.lock() = Session::new(model);
        tracing::info!("[{}] Session reset", self.config.log_id());
        Ok(())
    }

    /// Queue a routed request and apply its optimistic state
    fn dispatch(&self, session: &mut Session, zone_id: &str, routed: RoutedCommand) -> Result<NativeRequest> {
        self.request_tx
            .send(routed.request.clone())
            .map_err(|_| AvrError::ConnectionClosed)?;

        if let Some(update) = routed.optimistic {
            if let Some(delta) = session.tracker.apply_optimistic(zone_id, update) {
                self.publish(delta);
            }
        }

        Ok(routed.request)
    }

    fn publish(&self, delta: AttributeDelta) {
        // No subscribers is fine
        let _ = self.delta_tx.send(delta);
    }
}
