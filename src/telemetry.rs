//! Per-frame telemetry shared by the renderer, the reconstructors and the LOD
//! controller.

use std::fmt;

/// The three kinds of problem a frame can run into. None of them stops the
/// render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueClass {
    /// GPU context, pipeline or texture creation failed.
    Resource,
    /// Malformed input such as a degenerate plane, path or camera.
    DataShape,
    /// A numeric fallback was taken, e.g. a zero range or a zero-length path.
    Numeric,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderIssue {
    pub class: IssueClass,
    pub message: String,
}

impl RenderIssue {
    pub fn new(class: IssueClass, message: impl Into<String>) -> Self {
        let issue = Self {
            class,
            message: message.into(),
        };
        log::warn!("{issue}");
        issue
    }
}

impl fmt::Display for RenderIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} issue: {}", self.class, self.message)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderingStats {
    pub frame_time_ms: f64,
    pub rays_cast: u64,
    pub samples_processed: u64,
    pub rays_terminated_early: u64,
    pub memory_usage_bytes: u64,
    pub lod_level: usize,
    pub issues: Vec<RenderIssue>,
}

impl RenderingStats {
    pub fn record(&mut self, class: IssueClass, message: impl Into<String>) {
        self.issues.push(RenderIssue::new(class, message));
    }

    pub fn has_issue(&self, class: IssueClass) -> bool {
        self.issues.iter().any(|issue| issue.class == class)
    }
}
