//! Frame scheduling for the render loop.
//!
//! The loop asks a [`FrameScheduler`] for one frame at a time and re-submits
//! after each frame only while its running flag is set. Platforms plug in
//! their own frame callback; [`ManualScheduler`] is a queue the caller drains.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

impl FrameRequest {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Scheduler whose frames fire when the caller pops them.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: VecDeque<FrameRequest>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest outstanding request, removed from the queue.
    pub fn next_due(&mut self) -> Option<FrameRequest> {
        self.pending.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequest {
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        self.pending.push_back(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.pending.retain(|pending| *pending != request);
    }
}

/// Running flag that can be cleared from outside the loop.
#[derive(Clone, Debug, Default)]
pub struct RunningFlag {
    running: Arc<AtomicBool>,
}

impl RunningFlag {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn set(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

pub struct RenderLoop<S> {
    scheduler: S,
    running: RunningFlag,
    pending: Option<FrameRequest>,
    frames: u64,
}

impl<S: FrameScheduler> RenderLoop<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            running: RunningFlag::default(),
            pending: None,
            frames: 0,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn running_flag(&self) -> RunningFlag {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.running.set(true);
        if self.pending.is_none() {
            self.pending = Some(self.scheduler.request_frame());
        }
        log::debug!("Render loop started");
    }

    /// Clear the running flag and cancel the outstanding frame.
    pub fn stop(&mut self) {
        self.running.stop();
        if let Some(request) = self.pending.take() {
            self.scheduler.cancel_frame(request);
        }
        log::debug!("Render loop stopped after {} frames", self.frames);
    }

    /// Accept a fired frame. Stale or cancelled requests and frames arriving
    /// after a stop are refused.
    pub fn begin_frame(&mut self, request: FrameRequest) -> bool {
        if !self.is_running() || self.pending != Some(request) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Count the frame and request the next one if still running.
    pub fn end_frame(&mut self) {
        self.frames += 1;
        if self.is_running() {
            self.pending = Some(self.scheduler.request_frame());
        } else if let Some(request) = self.pending.take() {
            self.scheduler.cancel_frame(request);
        }
    }
}
