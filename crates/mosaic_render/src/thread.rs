//! Dedicated render thread
//!
//! Owns the backend and executes commands from a bounded channel in FIFO
//! order. The game thread only ever holds the sending half.

use crate::backend::RenderBackend;
use crate::command::RenderCommand;
use crate::{DeviceCapabilities, RenderError, SlotId};
use mosaic_asset::ThumbnailImage;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

/// Totals reported by the render thread when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub commands: u64,
    pub failures: u64,
    /// Slots still allocated when the thread stopped.
    pub live_slots: usize,
}

pub struct RenderThread {
    sender: SyncSender<RenderCommand>,
    handle: Option<JoinHandle<RenderStats>>,
    capabilities: DeviceCapabilities,
    /// Slots whose `Update` failed on the render thread.
    failed_updates: Receiver<SlotId>,
}

impl RenderThread {
    /// Move `backend` onto a new thread. `queue_capacity` bounds the number of
    /// in-flight commands; submitting to a full queue waits for the render thread.
    pub fn spawn(
        backend: Box<dyn RenderBackend>,
        queue_capacity: usize,
    ) -> Result<Self, RenderError> {
        let capabilities = backend.capabilities();
        let (sender, receiver) = mpsc::sync_channel(queue_capacity.max(1));
        let (failure_sender, failed_updates) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("thumbnail-render".to_string())
            .spawn(move || run(backend, receiver, failure_sender))?;

        tracing::info!(
            backend = ?capabilities.backend,
            adapter = %capabilities.adapter_name,
            max_texture_size = capabilities.max_texture_size,
            "render thread started"
        );

        Ok(Self {
            sender,
            handle: Some(handle),
            capabilities,
            failed_updates,
        })
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn submit(&self, command: RenderCommand) -> Result<(), RenderError> {
        self.sender
            .send(command)
            .map_err(|_| RenderError::Disconnected)
    }

    /// Slots whose updates failed since the last call, in execution order.
    pub fn take_failed_updates(&self) -> Vec<SlotId> {
        self.failed_updates.try_iter().collect()
    }

    /// Block until every command submitted so far has executed.
    pub fn flush(&self) -> Result<(), RenderError> {
        let (ack, done) = mpsc::channel();
        self.submit(RenderCommand::Flush { ack })?;
        done.recv().map_err(|_| RenderError::Disconnected)
    }

    /// Blocking readback of a slot's display texture, ordered after every
    /// earlier command.
    pub fn read_display(&self, slot: SlotId) -> Result<ThumbnailImage, RenderError> {
        let (reply, result) = mpsc::channel();
        self.submit(RenderCommand::ReadBack { slot, reply })?;
        result.recv().map_err(|_| RenderError::Disconnected)?
    }

    /// Drain the queue, stop the thread and return its totals. Later calls
    /// (and every other method) report [`RenderError::Disconnected`].
    pub fn shutdown(&mut self) -> Result<RenderStats, RenderError> {
        let Some(handle) = self.handle.take() else {
            return Err(RenderError::Disconnected);
        };
        // A send error means the thread already exited; join still reports why.
        let _ = self.sender.send(RenderCommand::Shutdown);
        handle.join().map_err(|_| {
            tracing::error!("render thread panicked");
            RenderError::Disconnected
        })
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.shutdown() {
                tracing::error!("render thread did not stop cleanly: {err}");
            }
        }
    }
}

fn run(
    mut backend: Box<dyn RenderBackend>,
    commands: Receiver<RenderCommand>,
    failed_updates: Sender<SlotId>,
) -> RenderStats {
    let mut stats = RenderStats::default();

    while let Ok(command) = commands.recv() {
        stats.commands += 1;
        let label = command.label();
        let slot = command.slot();
        let is_update = matches!(command, RenderCommand::Update { .. });

        let result = match command {
            RenderCommand::Allocate {
                slot,
                width,
                height,
            } => backend.allocate(slot, width, height),
            RenderCommand::Resize {
                slot,
                width,
                height,
            } => backend.resize(slot, width, height),
            RenderCommand::Update { slot, image } => backend.update(slot, &image),
            RenderCommand::Release { slot } => backend.release(slot),
            RenderCommand::ReadBack { slot, reply } => {
                let _ = reply.send(backend.read_display(slot));
                Ok(())
            }
            RenderCommand::Flush { ack } => {
                let _ = ack.send(());
                Ok(())
            }
            RenderCommand::Shutdown => break,
        };

        if let Err(err) = result {
            stats.failures += 1;
            tracing::error!(command = label, slot = ?slot, "render command failed: {err}");
            if let (true, Some(slot)) = (is_update, slot) {
                let _ = failed_updates.send(slot);
            }
        }
    }

    stats.live_slots = backend.live_slots();
    tracing::info!(
        commands = stats.commands,
        failures = stats.failures,
        live_slots = stats.live_slots,
        "render thread stopped"
    );
    stats
}
