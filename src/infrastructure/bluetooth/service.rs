//! Session Controller
//!
//! Owns the single detector session: drives discovery, connection and
//! subscription through the state machine and republishes what the detector
//! sends as [`DeviceEvent`]s.
//!
//! All state is mutated on one task. Transport calls that can take a while
//! (connect, subscribe, battery read) run on spawned tasks tagged with the
//! attempt they belong to, so a link loss can cancel them and late results
//! from a superseded attempt are dropped.

use crate::domain::calibration;
use crate::domain::error::SessionError;
use crate::domain::models::{
    BatteryLevel, DeviceEvent, DeviceIdentity, DeviceInfo, DeviceModel, DiscoveredPeripheral,
    PeripheralId, SessionState,
};
use crate::domain::settings::SessionConfig;
use crate::domain::state_machine::StateMachine;
use crate::infrastructure::bluetooth::connection::{self, SessionLink};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{Transport, TransportEvent};
use crate::infrastructure::event_bus::{EventBus, Subscription, SubscriptionId};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Initialize,
    RequestBatteryLevel,
    Rescan,
    Shutdown,
}

/// Read-only view of controller-owned data.
#[derive(Debug, Clone)]
struct SessionSnapshot {
    state: SessionState,
    identity: Option<DeviceIdentity>,
    model: DeviceModel,
}

/// Results reported back by spawned transport work.
enum Completion {
    Setup {
        attempt: u64,
        result: Result<SessionLink, SessionError>,
    },
    Battery {
        attempt: u64,
        result: anyhow::Result<i32>,
    },
}

struct Attempt {
    id: u64,
    peripheral: PeripheralId,
    setup: Option<JoinHandle<()>>,
    link: Option<SessionLink>,
}

/// Cloneable front end to a running [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    events: EventBus<DeviceEvent>,
}

impl SessionHandle {
    /// Arm the controller. Scanning starts once the radio is ready.
    pub fn initialize(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Initialize)
    }

    /// Ask for a battery reading. The answer always arrives as a
    /// [`DeviceEvent::DeviceInfo`], `Unavailable` if the session is not reading.
    pub fn request_battery_level(&self) {
        if self.send(SessionCommand::RequestBatteryLevel).is_err() {
            self.events
                .publish(DeviceEvent::DeviceInfo(DeviceInfo::unavailable()));
        }
    }

    /// Restart discovery from `disconnected` or `error`.
    pub fn rescan(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Rescan)
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown)
    }

    pub fn current_state(&self) -> SessionState {
        self.read(|s| s.state)
    }

    pub fn current_identity(&self) -> Option<DeviceIdentity> {
        self.read(|s| s.identity.clone())
    }

    pub fn current_model(&self) -> DeviceModel {
        self.read(|s| s.model.clone())
    }

    /// Dose divisor for the connected model, if it has one.
    pub fn calibration_factor(&self) -> Option<f64> {
        self.read(|s| calibration::calibration_factor(&s.model))
    }

    pub fn subscribe(&self) -> Subscription<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::ControllerStopped)
    }

    fn read<R>(&self, f: impl FnOnce(&SessionSnapshot) -> R) -> R {
        match self.snapshot.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

pub struct SessionController<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    fsm: StateMachine,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    events: EventBus<DeviceEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    armed: bool,
    radio_ready: bool,
    discovering: bool,
    next_attempt: u64,
    attempt: Option<Attempt>,
}

impl<T: Transport> SessionController<T> {
    pub fn new(
        transport: Arc<T>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        config: SessionConfig,
    ) -> (Self, SessionHandle) {
        let fsm = StateMachine::new();
        let snapshot = Arc::new(RwLock::new(SessionSnapshot {
            state: fsm.state(),
            identity: None,
            model: DeviceModel::default(),
        }));
        let events = EventBus::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            commands: commands_tx,
            snapshot: snapshot.clone(),
            events: events.clone(),
        };

        let controller = Self {
            transport,
            config,
            fsm,
            snapshot,
            events,
            transport_rx,
            commands_rx,
            completion_tx,
            completion_rx,
            armed: false,
            radio_ready: false,
            discovering: false,
            next_attempt: 0,
            attempt: None,
        };

        (controller, handle)
    }

    /// Build a controller and run it on the current tokio runtime.
    pub fn spawn(
        transport: Arc<T>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        config: SessionConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(transport, transport_rx, config);
        (handle, tokio::spawn(controller.run()))
    }

    /// Process commands, transport events and completions until shut down.
    pub async fn run(mut self) {
        info!("Session controller started");
        loop {
            tokio::select! {
                biased;

                command = self.commands_rx.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.transport_rx.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        error!("Transport event stream closed");
                        break;
                    }
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion).await;
                }
            }
        }
        self.teardown().await;
        info!("Session controller stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Initialize => {
                if self.armed {
                    debug!("Already initialized");
                    return;
                }
                self.armed = true;
                info!("Session armed, waiting for radio");
                if self.radio_ready && self.fsm.state() == SessionState::Waiting {
                    self.enter_scanning().await;
                }
            }
            SessionCommand::RequestBatteryLevel => self.request_battery_level(),
            SessionCommand::Rescan => match self.fsm.state() {
                SessionState::Disconnected => self.enter_scanning().await,
                SessionState::Error => {
                    self.end_attempt(true).await;
                    if self.set_state(SessionState::Disconnected) {
                        self.enter_scanning().await;
                    }
                }
                state => debug!("Rescan ignored while {}", state),
            },
            SessionCommand::Shutdown => {}
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::RadioReady => {
                self.radio_ready = true;
                match self.fsm.state() {
                    SessionState::Waiting if self.armed => self.enter_scanning().await,
                    SessionState::Scanning if !self.discovering => self.start_discovery().await,
                    _ => {}
                }
            }
            TransportEvent::RadioUnavailable => {
                self.radio_ready = false;
                if self.discovering {
                    warn!("Radio became unavailable while scanning");
                    self.discovering = false;
                }
            }
            TransportEvent::Discovered(peripheral) => self.on_discovered(peripheral).await,
            TransportEvent::Notification {
                characteristic,
                data,
            } => {
                let expected = self
                    .attempt
                    .as_ref()
                    .and_then(|a| a.link.as_ref())
                    .map(|link| &link.rad_count);
                let from_session = expected.is_some_and(|c| {
                    c.peripheral == characteristic.peripheral
                        && protocol::uuid_eq(&c.uuid, &characteristic.uuid)
                });
                if self.fsm.state() != SessionState::Reading || !from_session {
                    trace!("Dropping notification from {}", characteristic.uuid);
                    return;
                }
                match protocol::decode_count(&data) {
                    Ok(count) => {
                        trace!("Count: {}", count);
                        self.events.publish(DeviceEvent::CountReceived(count));
                    }
                    Err(e) => warn!("Dropping notification: {}", e),
                }
            }
            TransportEvent::Disconnected(peripheral) => {
                let ours = self
                    .attempt
                    .as_ref()
                    .is_some_and(|a| a.peripheral == peripheral);
                if !ours {
                    debug!("Ignoring disconnect of {}", peripheral);
                    return;
                }
                info!("Disconnected from {}", peripheral);
                if let Err(e) = self.transport.forget(&peripheral).await {
                    warn!("Failed to clean up {}: {}", peripheral, e);
                }
                self.end_attempt(false).await;
                if self.set_state(SessionState::Disconnected) && self.config.scan_forever {
                    self.enter_scanning().await;
                }
            }
        }
    }

    async fn on_discovered(&mut self, peripheral: DiscoveredPeripheral) {
        if self.fsm.state() != SessionState::Scanning {
            trace!("Ignoring late discovery of {}", peripheral.address);
            return;
        }
        if !self.config.selection.matches(&peripheral) {
            debug!(
                "Skipping {} ({:?})",
                peripheral.address, peripheral.local_name
            );
            return;
        }

        if let Err(e) = self.transport.stop_discovery().await {
            warn!("Failed to stop discovery: {}", e);
        }
        self.discovering = false;

        let name = peripheral.local_name.clone().unwrap_or_default();
        let identity = DeviceIdentity::new(&peripheral.address, &name);
        let model = calibration::resolve_model(&name);
        info!(
            "Connecting to '{}': {} (model {:?})",
            identity.name, identity.address, model.short
        );
        self.update_snapshot(|s| {
            s.identity = Some(identity);
            s.model = model;
        });

        if !self.set_state(SessionState::Connected) {
            return;
        }

        self.next_attempt += 1;
        let id = self.next_attempt;
        let transport = self.transport.clone();
        let config = self.config.clone();
        let completions = self.completion_tx.clone();
        let target = peripheral.id.clone();
        let setup = tokio::spawn(async move {
            let result = connection::establish(transport.as_ref(), &target, &config).await;
            let _ = completions.send(Completion::Setup {
                attempt: id,
                result,
            });
        });

        self.attempt = Some(Attempt {
            id,
            peripheral: peripheral.id,
            setup: Some(setup),
            link: None,
        });
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Setup { attempt, result } => {
                if !self.is_current(attempt) {
                    debug!("Discarding setup result of superseded attempt {}", attempt);
                    return;
                }
                if let Some(current) = self.attempt.as_mut() {
                    current.setup = None;
                }
                match result {
                    Ok(link) => {
                        if let Some(current) = self.attempt.as_mut() {
                            current.link = Some(link);
                        }
                        self.set_state(SessionState::Reading);
                    }
                    Err(e @ SessionError::Subscribe(_)) => {
                        error!("{}", e);
                        // Stay in error until the link is released.
                        self.set_state(SessionState::Error);
                        self.release_link().await;
                    }
                    Err(e) => {
                        error!("{}", e);
                        self.end_attempt(true).await;
                        if self.set_state(SessionState::Disconnected) && self.config.scan_forever {
                            self.enter_scanning().await;
                        }
                    }
                }
            }
            Completion::Battery { attempt, result } => {
                let battery = match result {
                    Ok(percent) if self.is_current(attempt) => BatteryLevel::Percent(percent),
                    Ok(_) => {
                        debug!("Battery reading from superseded attempt {}", attempt);
                        BatteryLevel::Unavailable
                    }
                    Err(e) => {
                        warn!("Battery read failed: {}", e);
                        BatteryLevel::Unavailable
                    }
                };
                self.events
                    .publish(DeviceEvent::DeviceInfo(DeviceInfo { battery }));
            }
        }
    }

    fn request_battery_level(&mut self) {
        let target = self.attempt.as_ref().and_then(|a| {
            let battery = a.link.as_ref()?.battery.clone()?;
            Some((a.id, battery))
        });
        let (attempt, characteristic) = match target {
            Some(t) if self.fsm.state() == SessionState::Reading => t,
            _ => {
                debug!("Battery requested while {}", self.fsm.state());
                self.events
                    .publish(DeviceEvent::DeviceInfo(DeviceInfo::unavailable()));
                return;
            }
        };

        let transport = self.transport.clone();
        let timeout = self.config.read_timeout;
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result =
                connection::read_battery_level(transport.as_ref(), &characteristic, timeout).await;
            let _ = completions.send(Completion::Battery { attempt, result });
        });
    }

    async fn enter_scanning(&mut self) {
        if self.set_state(SessionState::Scanning) {
            self.start_discovery().await;
        }
    }

    async fn start_discovery(&mut self) {
        if !self.radio_ready {
            info!("Radio not ready, discovery deferred");
            return;
        }
        info!(
            "Scanning for {:?} / {:?}...",
            self.config.selection.name, self.config.selection.address
        );
        let filter = [self.config.rad_count_service_uuid.clone()];
        match self.transport.start_discovery(&filter).await {
            Ok(()) => self.discovering = true,
            Err(e) => {
                self.discovering = false;
                error!("{}", SessionError::Discovery(e));
                self.set_state(SessionState::Error);
            }
        }
    }

    /// Forget the current attempt: cancel its setup, clear identity and model,
    /// and optionally ask the transport to drop the link.
    async fn end_attempt(&mut self, release: bool) {
        if release {
            self.release_link().await;
        }
        if let Some(attempt) = self.attempt.take() {
            if let Some(setup) = attempt.setup {
                setup.abort();
            }
        }
        self.update_snapshot(|s| {
            s.identity = None;
            s.model = DeviceModel::default();
        });
    }

    async fn release_link(&mut self) {
        let Some(peripheral) = self.attempt.as_ref().map(|a| a.peripheral.clone()) else {
            return;
        };
        let result = connection::with_timeout(
            "disconnect",
            self.config.connect_timeout,
            self.transport.disconnect(&peripheral),
        )
        .await;
        if let Err(e) = result {
            warn!("Failed to release {}: {}", peripheral, e);
        }
    }

    async fn teardown(&mut self) {
        if self.discovering {
            if let Err(e) = self.transport.stop_discovery().await {
                warn!("Failed to stop discovery: {}", e);
            }
            self.discovering = false;
        }
        self.end_attempt(true).await;
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.id == attempt)
    }

    /// Apply a transition; publish it if the table allows it.
    fn set_state(&mut self, to: SessionState) -> bool {
        match self.fsm.transition(to) {
            Ok(state) => {
                self.update_snapshot(|s| s.state = state);
                info!("Detector state: {}", state);
                self.events.publish(DeviceEvent::StateChanged(state));
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    fn update_snapshot(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        match self.snapshot.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
