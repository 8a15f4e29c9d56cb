//! The bridge engine: owns both per-direction client tables, the two
//! acceptor threads, and the currently-installed stream references.
//!
//! Threads are joined, not detached, the way the teacher's `AudioEngine`
//! holds a `JoinHandle` for its audio thread and joins it in `Drop` --
//! here there are two handles, one per acceptor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{error, info};

use zonecast_net::{
    checked_client_id, client_id_from_address, remap_input_client_id, wake_acceptor, InputTable,
    OutputTable, StreamWireConfig, MAX_CLIENTS,
};

use crate::config::{AudioFormat, BridgeConfig, StreamConfig};
use crate::device;
use crate::error::{BridgeError, BridgeResult};
use crate::stream::{InputStream, OutputStream};

/// One `OutputStream` may be installed per client id (§3.1's "exactly one
/// OutputStream per client id"), not one for the whole engine -- a
/// zone-per-client-id bridge must let several zones stay simultaneously
/// open, unlike the original single-output-device driver it generalizes.
type InstalledOutputs = [Option<StreamWireConfig>; MAX_CLIENTS];
type InstalledInputs = [Option<StreamWireConfig>; MAX_CLIENTS];

/// Installs a process-wide SIGPIPE ignore, mirroring the C driver's
/// `signal(SIGPIPE, sighandler)` at device open (§4.8 / §9): a peer that
/// vanishes mid-write must not kill the process.
fn neutralize_sigpipe() {
    use nix::sys::signal::{signal, SigHandler, Signal};
    unsafe {
        if let Err(e) = signal(Signal::SIGPIPE, SigHandler::SigIgn) {
            error!("failed to install SIGPIPE handler: {e}");
        }
    }
}

/// The engine singleton: constructed at device open, dropped at device
/// close. Pass a shared `Arc<AudioBridge>` to anything that needs to open
/// streams concurrently with the acceptor threads.
pub struct AudioBridge {
    config: BridgeConfig,
    output_table: Arc<OutputTable>,
    input_table: Arc<InputTable>,
    installed_output: Arc<Mutex<InstalledOutputs>>,
    installed_input: Arc<Mutex<InstalledInputs>>,
    mic_mute: Arc<AtomicBool>,
    output_shutdown: Arc<AtomicBool>,
    input_shutdown: Arc<AtomicBool>,
    output_acceptor: Option<JoinHandle<()>>,
    input_acceptor: Option<JoinHandle<()>>,
}

impl AudioBridge {
    pub fn new(mut config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        neutralize_sigpipe();

        let output_table = Arc::new(OutputTable::new()?);
        let input_table = Arc::new(InputTable::new()?);
        let installed_output: Arc<Mutex<InstalledOutputs>> = Arc::new(Mutex::new([None; MAX_CLIENTS]));
        let installed_input: Arc<Mutex<InstalledInputs>> = Arc::new(Mutex::new([None; MAX_CLIENTS]));
        let output_shutdown = Arc::new(AtomicBool::new(false));
        let input_shutdown = Arc::new(AtomicBool::new(false));

        let out_port = config.out_port;
        let in_port = config.in_port;
        let num_concurrent_users = config.num_concurrent_users;

        let output_acceptor = {
            let table = output_table.clone();
            let shutdown = output_shutdown.clone();
            let installed = installed_output.clone();
            thread::Builder::new()
                .name("zonecast-out-acceptor".into())
                .spawn(move || {
                    let acceptor_table = table.clone();
                    let on_admit = move |client_id: usize| {
                        let guard = installed.lock();
                        if let Some(wire_config) = guard[client_id] {
                            let _ = table.slot(client_id).send_open(wire_config);
                        }
                    };
                    if let Err(e) = zonecast_net::run_output_acceptor(
                        out_port,
                        num_concurrent_users,
                        acceptor_table,
                        shutdown,
                        on_admit,
                    ) {
                        error!("output acceptor terminated: {e}");
                    }
                })
                .map_err(|_| BridgeError::InvalidConfig("failed to spawn output acceptor thread".into()))?
        };

        let input_acceptor = {
            let table = input_table.clone();
            let shutdown = input_shutdown.clone();
            let installed = installed_input.clone();
            thread::Builder::new()
                .name("zonecast-in-acceptor".into())
                .spawn(move || {
                    let acceptor_table = table.clone();
                    let on_admit = move |client_id: usize| {
                        let slot = table.slot(client_id);
                        if !slot.read_started() {
                            return;
                        }
                        let guard = installed.lock();
                        if let Some(wire_config) = guard[client_id] {
                            let _ = slot.send_open(wire_config);
                        }
                    };
                    if let Err(e) = zonecast_net::run_input_acceptor(
                        in_port,
                        num_concurrent_users,
                        acceptor_table,
                        shutdown,
                        on_admit,
                    ) {
                        error!("input acceptor terminated: {e}");
                    }
                })
                .map_err(|_| BridgeError::InvalidConfig("failed to spawn input acceptor thread".into()))?
        };

        info!(out_port, in_port, num_concurrent_users, "bridge engine started");

        Ok(Self {
            config,
            output_table,
            input_table,
            installed_output,
            installed_input,
            mic_mute: Arc::new(AtomicBool::new(false)),
            output_shutdown,
            input_shutdown,
            output_acceptor: Some(output_acceptor),
            input_acceptor: Some(input_acceptor),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// `open_output_stream`: resolves the client id from `bus_address`,
    /// applies host-contract defaults, installs as that client id's active
    /// output stream, and sends OPEN if a peer already occupies the slot.
    /// A second stream for a client id that already has one installed is
    /// rejected; a different client id may be opened independently, since
    /// each zone routes to its own peer slot.
    pub fn open_output_stream(
        &self,
        bus_address: &str,
        sample_rate: u32,
        channel_mask: u32,
        format: Option<AudioFormat>,
    ) -> BridgeResult<OutputStream> {
        let client_id = checked_client_id(client_id_from_address(bus_address))?;
        let stream_config = StreamConfig::new(sample_rate, channel_mask, format, 10);
        let stream = OutputStream::new(
            stream_config,
            bus_address.to_string(),
            client_id,
            self.output_table.clone(),
            self.config.channel_mask_mode,
        );

        let mut guard = self.installed_output.lock();
        if guard[client_id].is_some() {
            return Err(BridgeError::StreamAlreadyOpen);
        }
        let wire_config = stream.wire_config();
        guard[client_id] = Some(wire_config);
        drop(guard);

        if self.output_table.slot(client_id).has_peer() {
            self.output_table.slot(client_id).send_open(wire_config)?;
        }

        Ok(stream)
    }

    /// `close_output_stream`: best-effort CLOSE to the slot peer, then
    /// frees that client id's installed-stream reference.
    pub fn close_output_stream(&self, stream: OutputStream) {
        let client_id = stream.client_id();
        stream.send_close();
        let mut guard = self.installed_output.lock();
        guard[client_id] = None;
    }

    /// `open_input_stream`: the OPEN frame is deferred to the first read
    /// (§4.6), so opening only installs state.
    pub fn open_input_stream(
        &self,
        bus_address: &str,
        sample_rate: u32,
        channel_mask: u32,
        format: Option<AudioFormat>,
    ) -> BridgeResult<InputStream> {
        let raw_id = client_id_from_address(bus_address);
        let client_id = checked_client_id(remap_input_client_id(raw_id))?;
        let stream_config =
            StreamConfig::new(sample_rate, channel_mask, format, self.config.input_buffer_ms);
        let stream = InputStream::new(
            stream_config,
            bus_address.to_string(),
            client_id,
            self.input_table.clone(),
            self.config.channel_mask_mode,
            self.mic_mute.clone(),
        );

        let mut guard = self.installed_input.lock();
        if guard[client_id].is_some() {
            return Err(BridgeError::StreamAlreadyOpen);
        }
        guard[client_id] = Some(stream.config().to_wire(self.config.channel_mask_mode));

        Ok(stream)
    }

    /// `close_input_stream`: sends CLOSE only if reads were ever started,
    /// matching the original's `in_socket_server_thread` contract.
    pub fn close_input_stream(&self, stream: InputStream) {
        let client_id = stream.client_id();
        stream.send_close_if_started();
        let mut guard = self.installed_input.lock();
        guard[client_id] = None;
    }

    pub fn get_input_buffer_size(&self, sample_rate: u32, channel_count: u32, format: AudioFormat) -> u32 {
        crate::config::input_buffer_size_bytes(self.config.input_buffer_ms, sample_rate, channel_count, format)
    }

    pub fn set_mic_mute(&self, muted: bool) {
        self.mic_mute.store(muted, Ordering::Release);
    }

    pub fn get_mic_mute(&self) -> bool {
        self.mic_mute.load(Ordering::Acquire)
    }

    pub fn init_check(&self) -> device::HalStatus {
        device::HalStatus::Ok
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.output_shutdown.store(true, Ordering::Release);
        self.input_shutdown.store(true, Ordering::Release);
        wake_acceptor(self.config.out_port);
        wake_acceptor(self.config.in_port);

        if let Some(handle) = self.output_acceptor.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.input_acceptor.take() {
            let _ = handle.join();
        }

        self.output_table.teardown();
        self.input_table.teardown();
        info!("bridge engine shut down");
    }
}
