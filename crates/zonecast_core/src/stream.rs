//! Output and input stream engines: the host-facing write/read contract.
//!
//! Each stream owns its own resolved client id, its direction's slot
//! table, and a pacing clock. Pacing mirrors the synthetic ALSA-ring-buffer
//! timing of the original driver: `frame_us` is how long the requested byte
//! count should take to drain at the configured sample rate, and the
//! engine sleeps off whatever of that budget the actual I/O didn't consume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use zonecast_net::{InputTable, OutputTable, ReadOutcome, WriteOutcome};

use crate::config::StreamConfig;
use crate::error::BridgeResult;

fn frame_micros(bytes: usize, frame_size: u32, sample_rate: u32) -> i64 {
    if frame_size == 0 || sample_rate == 0 {
        return 0;
    }
    (bytes as i64) * 1_000_000 / frame_size as i64 / sample_rate as i64
}

fn epoll_timeout_ms(sleep_us: i64, frame_us: i64) -> u32 {
    let upper = (frame_us / 1000).max(1);
    (sleep_us / 1000).clamp(1, upper) as u32
}

/// An open output stream: one per `open_output_stream` call, routed to the
/// client id its bus address resolves to.
pub struct OutputStream {
    config: StreamConfig,
    bus_address: String,
    client_id: usize,
    table: Arc<OutputTable>,
    channel_mask_mode: bool,
    last_write_time: Instant,
}

impl OutputStream {
    pub(crate) fn new(
        config: StreamConfig,
        bus_address: String,
        client_id: usize,
        table: Arc<OutputTable>,
        channel_mask_mode: bool,
    ) -> Self {
        Self {
            config,
            bus_address,
            client_id,
            table,
            channel_mask_mode,
            last_write_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn bus_address(&self) -> &str {
        &self.bus_address
    }

    pub fn client_id(&self) -> usize {
        self.client_id
    }

    /// Write `buf.len()` bytes, paced to the stream's sample rate. Returns
    /// the byte count on a completed transmit, `-1` on not-connected,
    /// timeout, or peer hangup (§4.8).
    pub fn write(&mut self, buf: &[u8]) -> BridgeResult<i64> {
        let frame_us = frame_micros(buf.len(), self.config.frame_size(), self.config.sample_rate);
        let now = Instant::now();
        let elapsed_us = now.duration_since(self.last_write_time).as_micros() as i64;
        let sleep_us = frame_us - elapsed_us;
        let timeout_ms = epoll_timeout_ms(sleep_us, frame_us);

        let slot = self.table.slot(self.client_id);
        let outcome = slot.write_frame(buf, timeout_ms)?;

        let result = match outcome {
            WriteOutcome::NotConnected | WriteOutcome::Timeout | WriteOutcome::PeerGone => -1,
            WriteOutcome::Sent(n) => n as i64,
        };

        let after_io = Instant::now();
        let elapsed_total_us = after_io.duration_since(now).as_micros() as i64;
        let remaining_us = sleep_us - elapsed_total_us;
        let actual_sleep_us = if remaining_us > 0 {
            remaining_us.min(frame_us).max(0) as u64
        } else {
            0
        };
        if actual_sleep_us > 0 {
            std::thread::sleep(Duration::from_micros(actual_sleep_us));
        }
        self.last_write_time = after_io + Duration::from_micros(actual_sleep_us);

        Ok(result)
    }

    /// Tells a connected peer to stop consuming; the next `write` re-announces.
    pub fn standby(&self) -> BridgeResult<bool> {
        Ok(self.table.slot(self.client_id).enter_standby()?)
    }

    pub(crate) fn wire_config(&self) -> zonecast_net::StreamWireConfig {
        self.config.to_wire(self.channel_mask_mode)
    }

    /// Best-effort CLOSE to the slot's current peer, called by the engine
    /// on `close_output_stream`.
    pub(crate) fn send_close(&self) {
        let _ = self.table.slot(self.client_id).send_close();
    }
}

/// An open input stream: one per `open_input_stream` call. The OPEN frame
/// is deferred to the first `read` call (§4.6).
pub struct InputStream {
    config: StreamConfig,
    bus_address: String,
    client_id: usize,
    table: Arc<InputTable>,
    channel_mask_mode: bool,
    last_read_time: Instant,
    mic_mute: Arc<AtomicBool>,
}

impl InputStream {
    pub(crate) fn new(
        config: StreamConfig,
        bus_address: String,
        client_id: usize,
        table: Arc<InputTable>,
        channel_mask_mode: bool,
        mic_mute: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            bus_address,
            client_id,
            table,
            channel_mask_mode,
            last_read_time: Instant::now(),
            mic_mute,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn bus_address(&self) -> &str {
        &self.bus_address
    }

    pub fn client_id(&self) -> usize {
        self.client_id
    }

    /// Fill `buf` entirely, from the peer where possible and with silence
    /// for whatever the peer didn't deliver in time. Always returns
    /// `buf.len()` -- per the resolved open question, an EPOLLERR/EPOLLHUP
    /// disconnect is folded into the same silence-fill path as a timeout,
    /// so the buffer-always-fully-written invariant holds unconditionally.
    pub fn read(&mut self, buf: &mut [u8]) -> BridgeResult<i64> {
        let slot = self.table.slot(self.client_id);

        if !slot.read_started() {
            if slot.has_peer() {
                slot.send_open(self.config.to_wire(self.channel_mask_mode))?;
            }
            slot.set_read_started(true);
        }

        let frame_us = frame_micros(buf.len(), self.config.frame_size(), self.config.sample_rate);
        let now = Instant::now();
        let elapsed_us = now.duration_since(self.last_read_time).as_micros() as i64;
        let sleep_us = frame_us - elapsed_us;
        let timeout_ms = epoll_timeout_ms(sleep_us, frame_us);

        let mut filled = 0usize;
        let deadline_start = Instant::now();
        let mut remaining_ms = timeout_ms;
        while filled < buf.len() {
            match slot.read_once(&mut buf[filled..], remaining_ms)? {
                ReadOutcome::Delivered(n) if n > 0 => {
                    filled += n;
                    let elapsed_ms = deadline_start.elapsed().as_millis() as u32;
                    if elapsed_ms >= timeout_ms {
                        break;
                    }
                    remaining_ms = timeout_ms - elapsed_ms;
                }
                _ => break,
            }
        }
        if filled < buf.len() {
            for b in &mut buf[filled..] {
                *b = 0;
            }
            if filled > 0 {
                warn!(filled, requested = buf.len(), "short input read, silence-filled tail");
            }
        }

        let after_io = Instant::now();
        let elapsed_total_us = after_io.duration_since(now).as_micros() as i64;
        let remaining_us = sleep_us - elapsed_total_us;
        let actual_sleep_us = if remaining_us > 0 {
            remaining_us.min(frame_us).max(0) as u64
        } else {
            0
        };
        if actual_sleep_us > 0 {
            std::thread::sleep(Duration::from_micros(actual_sleep_us));
        }
        self.last_read_time = after_io + Duration::from_micros(actual_sleep_us);

        if self.mic_mute.load(Ordering::Acquire) {
            buf.fill(0);
        }

        Ok(buf.len() as i64)
    }

    /// Discards any pacing credit so the next read pays the full frame delay.
    pub fn standby(&mut self) {
        self.last_read_time = Instant::now();
    }

    /// Best-effort CLOSE, sent only if reads were ever started on this
    /// stream, matching `close_input_stream` in the original source.
    pub(crate) fn send_close_if_started(&self) {
        let slot = self.table.slot(self.client_id);
        if slot.read_started() {
            let _ = slot.send_close();
        }
        slot.set_read_started(false);
    }
}
