//! Instrumented in-memory camera for tests.

use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};

use crate::error::{PipelineError, PipelineResult};

use super::device::{CameraBackend, CaptureDevice, Frame, Resolution};

#[derive(Debug, Clone)]
pub enum ReadScript {
    AlwaysSucceed,
    /// Zero-based read indices (counted across the backend's lifetime) that fail.
    FailReads(Vec<u64>),
    /// Every read from this index on fails.
    FailFrom(u64),
}

#[derive(Debug, Default)]
struct MockState {
    opens: u64,
    releases: u64,
    reads: u64,
    open: bool,
}

/// Read-only view on the shared counters of a `MockBackend`.
#[derive(Clone)]
pub struct MockProbe(Arc<Mutex<MockState>>);

impl MockProbe {
    pub fn opens(&self) -> u64 {
        self.0.lock().unwrap().opens
    }

    pub fn releases(&self) -> u64 {
        self.0.lock().unwrap().releases
    }

    pub fn reads(&self) -> u64 {
        self.0.lock().unwrap().reads
    }

    pub fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }
}

pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    applied: Resolution,
    fill: Rgb<u8>,
    script: ReadScript,
    fail_open: bool,
}

impl MockBackend {
    pub fn new(applied: Resolution) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            applied,
            fill: Rgb([20, 180, 30]),
            script: ReadScript::AlwaysSucceed,
            fail_open: false,
        }
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe(Arc::clone(&self.state))
    }

    pub fn script(&mut self, script: ReadScript) {
        self.script = script;
    }

    pub fn fill(&mut self, color: Rgb<u8>) {
        self.fill = color;
    }

    pub fn fail_open(&mut self) {
        self.fail_open = true;
    }
}

impl CameraBackend for MockBackend {
    fn open(
        &mut self,
        device_id: &str,
        _requested: Resolution,
    ) -> PipelineResult<Box<dyn CaptureDevice>> {
        if self.fail_open {
            return Err(PipelineError::device_unavailable(device_id, "mock open failure"));
        }
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        state.open = true;
        Ok(Box::new(MockDevice {
            state: Arc::clone(&self.state),
            applied: self.applied,
            fill: self.fill,
            script: self.script.clone(),
            released: false,
        }))
    }
}

struct MockDevice {
    state: Arc<Mutex<MockState>>,
    applied: Resolution,
    fill: Rgb<u8>,
    script: ReadScript,
    released: bool,
}

impl CaptureDevice for MockDevice {
    fn resolution(&self) -> Resolution {
        self.applied
    }

    fn read_frame(&mut self) -> PipelineResult<Frame> {
        let mut state = self.state.lock().unwrap();
        let index = state.reads;
        state.reads += 1;

        let fails = match &self.script {
            ReadScript::AlwaysSucceed => false,
            ReadScript::FailReads(indices) => indices.contains(&index),
            ReadScript::FailFrom(first) => index >= *first,
        };
        if fails {
            return Err(PipelineError::capture_failed(
                format!("mock read #{index}"),
                "device returned no data",
            ));
        }

        Ok(RgbImage::from_pixel(
            self.applied.width,
            self.applied.height,
            self.fill,
        ))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = self.state.lock().unwrap();
        state.releases += 1;
        state.open = false;
    }
}
