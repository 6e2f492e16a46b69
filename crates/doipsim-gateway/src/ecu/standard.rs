//! Lookup-table driven ECU

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::uds::{self, nrc};
use super::{AddressingMode, Ecu, EcuListener, LookupTable, UdsMessage};
use crate::config::EcuConfig;
use crate::display::{Addr, HexDump};
use crate::error::ConfigError;

/// Result of a request hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Not handled, continue with the lookup table
    Continue,
    /// Send this response and finish the request
    Respond(Vec<u8>),
    /// Send this response but keep the request in flight. The next request
    /// is answered with busy-repeat-request and releases the hold.
    RespondAndHold(Vec<u8>),
}

/// Custom request handling consulted before the lookup table
pub type RequestHook = Arc<dyn Fn(&UdsMessage) -> HookAction + Send + Sync>;

struct State {
    running: bool,
    busy: bool,
    /// In-flight request kept by a hook after its response was sent
    held: bool,
    queue: Option<mpsc::UnboundedSender<UdsMessage>>,
    listeners: Vec<EcuListener>,
}

struct Shared {
    name: String,
    physical_address: u16,
    functional_address: u16,
    lookup: LookupTable,
    hook: RwLock<Option<RequestHook>>,
    max_lookup: usize,
    max_logging: usize,
    state: Mutex<State>,
}

/// ECU answering one request at a time
///
/// Requests are processed in order: request hook, lookup table, and finally
/// a general-reject negative response. A request arriving while another is
/// in flight is answered immediately with `7F <sid> 21`.
pub struct StandardEcu {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StandardEcu {
    pub fn new(
        config: &EcuConfig,
        max_lookup: usize,
        max_logging: usize,
    ) -> Result<Self, ConfigError> {
        let lookup = LookupTable::from_config(&config.name, &config.lookup)?;
        Ok(Self {
            shared: Arc::new(Shared {
                name: config.name.clone(),
                physical_address: config.physical_address,
                functional_address: config.functional_address,
                lookup,
                hook: RwLock::new(None),
                max_lookup,
                max_logging,
                state: Mutex::new(State {
                    running: false,
                    busy: false,
                    held: false,
                    queue: None,
                    listeners: Vec::new(),
                }),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn set_hook(&self, hook: RequestHook) {
        *self.shared.hook.write() = Some(hook);
    }

    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().busy
    }

    /// End a request held by the hook; no-op if nothing is held
    pub fn release(&self) {
        let mut state = self.shared.state.lock();
        if state.held {
            state.held = false;
            state.busy = false;
            debug!(ecu = %self.shared.name, "Held request released");
        }
    }
}

impl Shared {
    fn response_to(&self, request: &UdsMessage, data: Vec<u8>) -> UdsMessage {
        UdsMessage {
            source_address: self.physical_address,
            target_address: request.source_address,
            addressing: AddressingMode::Physical,
            data: Bytes::from(data),
        }
    }

    fn emit(&self, state: &mut State, response: UdsMessage) {
        debug!(
            ecu = %self.name,
            target = %Addr(response.target_address),
            data = %HexDump::new(&response.data, self.max_logging),
            "UDS response"
        );
        state
            .listeners
            .retain(|listener| listener.send(response.clone()).is_ok());
    }

    /// Handle one request; the request stays in flight unless the response
    /// finished it
    fn process(&self, request: &UdsMessage) {
        info!(
            ecu = %self.name,
            source = %Addr(request.source_address),
            addressing = ?request.addressing,
            data = %HexDump::new(&request.data, self.max_logging),
            "UDS request"
        );

        let hook = self.hook.read().clone();
        let (data, hold) = match hook.map(|hook| hook(request)) {
            Some(HookAction::Respond(data)) => (data, false),
            Some(HookAction::RespondAndHold(data)) => (data, true),
            Some(HookAction::Continue) | None => (self.lookup_or_reject(request), false),
        };

        let response = self.response_to(request, data);
        let mut state = self.state.lock();
        if hold {
            state.held = true;
        } else {
            state.busy = false;
        }
        self.emit(&mut state, response);
    }

    fn lookup_or_reject(&self, request: &UdsMessage) -> Vec<u8> {
        let key = &request.data[..request.data.len().min(self.max_lookup)];
        match self.lookup.find(key) {
            Some(response) => {
                debug!(ecu = %self.name, "Found matching request pattern");
                response.to_vec()
            }
            None => {
                debug!(ecu = %self.name, "No matching request pattern");
                uds::negative_response(uds::request_sid(&request.data), nrc::GENERAL_REJECT)
            }
        }
    }

    async fn run(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<UdsMessage>) {
        while let Some(request) = queue.recv().await {
            self.process(&request);
        }
        debug!(ecu = %self.name, "ECU worker stopped");
    }
}

impl Ecu for StandardEcu {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn physical_address(&self) -> u16 {
        self.shared.physical_address
    }

    fn functional_address(&self) -> u16 {
        self.shared.functional_address
    }

    fn start(&self) {
        let mut state = self.shared.state.lock();
        if state.running {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.running = true;
        state.busy = false;
        state.held = false;
        state.queue = Some(tx);
        *self.worker.lock() = Some(tokio::spawn(self.shared.clone().run(rx)));
        info!(
            ecu = %self.shared.name,
            physical = %Addr(self.shared.physical_address),
            functional = %Addr(self.shared.functional_address),
            lookup_entries = self.shared.lookup.len(),
            "ECU started"
        );
    }

    fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.busy = false;
            state.held = false;
            state.queue = None;
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        info!(ecu = %self.shared.name, "ECU stopped");
    }

    fn put_request(&self, request: UdsMessage) {
        let mut state = self.shared.state.lock();
        if !state.running {
            warn!(ecu = %self.shared.name, "ECU not running, request dropped");
            return;
        }
        if state.busy {
            info!(ecu = %self.shared.name, "ECU busy, answering busy-repeat-request");
            let sid = uds::request_sid(&request.data);
            let response = self
                .shared
                .response_to(&request, uds::negative_response(sid, nrc::BUSY_REPEAT_REQUEST));
            self.shared.emit(&mut state, response);
            if state.held {
                state.held = false;
                state.busy = false;
                debug!(ecu = %self.shared.name, "Held request released after busy answer");
            }
            return;
        }
        let queued = state
            .queue
            .as_ref()
            .is_some_and(|queue| queue.send(request).is_ok());
        if queued {
            state.busy = true;
        }
    }

    fn add_listener(&self, listener: EcuListener) {
        self.shared.state.lock().listeners.push(listener);
    }
}

impl Drop for StandardEcu {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}
