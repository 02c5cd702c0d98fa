//! Capture through an external still-capture program (`fswebcam`,
//! `libcamera-still`, ...) that writes one encoded image to stdout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PipelineError, PipelineResult};

use super::device::{CameraBackend, CaptureDevice, Frame, Resolution};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const POLL_STEP: Duration = Duration::from_millis(25);

pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    warmup_frames: u32,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            warmup_frames: 0,
        }
    }

    /// Frames the program itself should skip before saving, substituted for
    /// `{warmup}` in the argument template.
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }
}

impl CameraBackend for CommandBackend {
    /// Runs one capture so a busy or broken device is reported here rather
    /// than on the first session read. That frame is served as the first read.
    fn open(
        &mut self,
        device_id: &str,
        requested: Resolution,
    ) -> PipelineResult<Box<dyn CaptureDevice>> {
        if looks_like_path(device_id) && !Path::new(device_id).exists() {
            return Err(PipelineError::device_unavailable(
                device_id,
                "device node does not exist",
            ));
        }

        let program = which::which(&self.program).map_err(|err| {
            PipelineError::device_unavailable(
                device_id,
                format!("capture program '{}' not found: {err}", self.program),
            )
        })?;

        let args = self
            .args
            .iter()
            .map(|arg| expand_arg(arg, device_id, requested, self.warmup_frames))
            .collect();

        let mut device = CommandDevice {
            device_id: device_id.to_string(),
            program,
            args,
            timeout: self.timeout,
            applied: requested,
            pending: None,
            released: false,
        };
        let first = device.capture().map_err(|reason| {
            PipelineError::device_unavailable(device_id, format!("first capture failed: {reason}"))
        })?;
        device.pending = Some(first);

        Ok(Box::new(device))
    }
}

struct CommandDevice {
    device_id: String,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    applied: Resolution,
    pending: Option<Frame>,
    released: bool,
}

impl CommandDevice {
    fn capture(&mut self) -> Result<Frame, String> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| format!("failed to spawn capture program: {err}"))?;

        let bytes = collect_stdout(child, self.timeout)?;
        if bytes.is_empty() {
            return Err("capture program produced no data".to_string());
        }

        let frame = image::load_from_memory(&bytes)
            .map_err(|err| format!("undecodable capture output: {err}"))?
            .to_rgb8();
        self.applied = Resolution::new(frame.width(), frame.height());
        Ok(frame)
    }
}

impl CaptureDevice for CommandDevice {
    fn resolution(&self) -> Resolution {
        self.applied
    }

    fn read_frame(&mut self) -> PipelineResult<Frame> {
        if self.released {
            return Err(PipelineError::capture_failed(
                &self.device_id,
                "device already released",
            ));
        }
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        self.capture()
            .map_err(|reason| PipelineError::capture_failed(&self.device_id, reason))
    }

    /// Every read is a fresh program run and warm-up happens inside it.
    fn discard_reads(&self, _configured: u32) -> u32 {
        0
    }

    fn release(&mut self) {
        self.pending = None;
        self.released = true;
    }
}

fn collect_stdout(mut child: Child, timeout: Duration) -> Result<Vec<u8>, String> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| "capture program stdout unavailable".to_string())?;

    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                if let Err(err) = child.kill() {
                    log_warn!("failed to kill stalled capture program: {err}");
                }
                let _ = child.wait();
                let _ = reader.join();
                return Err(format!("capture timed out after {}s", timeout.as_secs()));
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(err) => return Err(format!("failed to wait for capture program: {err}")),
        }
    };

    let bytes = reader
        .join()
        .map_err(|_| "stdout reader thread panicked".to_string())?
        .map_err(|err| format!("failed to read capture output: {err}"))?;

    if !status.success() {
        return Err(format!("capture program exited with {status}"));
    }

    Ok(bytes)
}

fn looks_like_path(device_id: &str) -> bool {
    device_id.starts_with('/') || device_id.starts_with("./")
}

fn expand_arg(template: &str, device_id: &str, requested: Resolution, warmup: u32) -> String {
    template
        .replace("{device}", device_id)
        .replace("{width}", &requested.width.to_string())
        .replace("{height}", &requested.height.to_string())
        .replace("{warmup}", &warmup.to_string())
}
