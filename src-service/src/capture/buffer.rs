//! Bounded retention of the most recent captured frames.
//!
//! Frames are kept oldest-first. When the limit is reached the oldest frames
//! are evicted (and their pixel memory released) to make room for the new one.

use std::collections::VecDeque;

use super::types::Frame;

/// Eviction policy of a [`FrameRetentionBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionLimit {
    /// Keep at most this many frames
    Frames(usize),
    /// Keep at most this many bytes of pixel data
    Bytes(usize),
}

impl RetentionLimit {
    /// Limit for a start request, where size-budget capacities are in megabytes.
    pub fn from_request(capacity: usize, size_budget: bool) -> Self {
        if size_budget {
            RetentionLimit::Bytes(capacity.saturating_mul(1024 * 1024))
        } else {
            RetentionLimit::Frames(capacity)
        }
    }
}

/// Ordered collection of frames with count or byte-size eviction.
///
/// In byte mode a single frame larger than the whole budget is still admitted
/// after evicting everything else.
#[derive(Debug)]
pub struct FrameRetentionBuffer {
    frames: VecDeque<Frame>,
    limit: RetentionLimit,
    /// Sum of `Frame::size` over `frames`
    total_bytes: usize,
}

impl FrameRetentionBuffer {
    pub fn new(limit: RetentionLimit) -> Self {
        let frames = match limit {
            RetentionLimit::Frames(capacity) => VecDeque::with_capacity(capacity.min(1024)),
            RetentionLimit::Bytes(_) => VecDeque::new(),
        };
        Self {
            frames,
            limit,
            total_bytes: 0,
        }
    }

    /// Whether every insert is discarded (`Frames(0)`).
    pub fn retains_nothing(&self) -> bool {
        self.limit == RetentionLimit::Frames(0)
    }

    /// Append `frame`, evicting from the front as the limit requires.
    ///
    /// Returns the number of frames evicted, or `None` if the frame was not
    /// admitted at all.
    pub fn insert(&mut self, frame: Frame) -> Option<usize> {
        let mut evicted = 0;
        match self.limit {
            RetentionLimit::Bytes(capacity) => {
                while !self.frames.is_empty() && self.total_bytes + frame.size > capacity {
                    self.pop_front();
                    evicted += 1;
                }
            }
            RetentionLimit::Frames(0) => return None,
            RetentionLimit::Frames(capacity) => {
                if self.frames.len() >= capacity {
                    self.pop_front();
                    evicted += 1;
                }
            }
        }

        self.total_bytes += frame.size;
        self.frames.push_back(frame);
        Some(evicted)
    }

    fn pop_front(&mut self) {
        if let Some(frame) = self.frames.pop_front() {
            self.total_bytes -= frame.size;
        }
    }

    /// Retained frames, oldest first. The buffer is left untouched.
    pub fn drain_in_order(&self) -> impl ExactSizeIterator<Item = &Frame> + '_ {
        self.frames.iter()
    }

    /// Release every retained frame.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn limit(&self) -> RetentionLimit {
        self.limit
    }
}
