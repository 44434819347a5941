use std::sync::Arc;

use crate::adapters::{FfmpegAdapter, FfprobeAdapter, TrimConfig};
use crate::engine::ExportExecutor;
use crate::ports::{ExecutePort, ProbePort};
use crate::utils::locate_tool;

/// Wires the tool adapters and the executor from configuration
pub struct AppContainer {
    probe: Arc<dyn ProbePort>,
    executor: ExportExecutor,
}

impl AppContainer {
    pub fn new(config: &TrimConfig) -> Self {
        let ffprobe = locate_tool("ffprobe", config.tools.ffprobe.as_deref());
        let ffmpeg = locate_tool("ffmpeg", config.tools.ffmpeg.as_deref());

        let probe: Arc<dyn ProbePort> = Arc::new(FfprobeAdapter::new(ffprobe));
        let execute: Arc<dyn ExecutePort> =
            Arc::new(FfmpegAdapter::new(ffmpeg).with_settings(config.export.encode_settings()));
        Self::with_ports(probe, execute, config)
    }

    /// Build around caller-supplied ports
    pub fn with_ports(
        probe: Arc<dyn ProbePort>,
        execute: Arc<dyn ExecutePort>,
        config: &TrimConfig,
    ) -> Self {
        let executor = ExportExecutor::new(Arc::clone(&probe), execute)
            .with_options(config.export.options());
        Self { probe, executor }
    }

    pub fn probe(&self) -> &dyn ProbePort {
        self.probe.as_ref()
    }

    pub fn executor(&self) -> &ExportExecutor {
        &self.executor
    }
}
