use melodex_model::Track;

/// Largest batch the ramp converges to.
const BATCH_CAP: usize = 50;

/// Adaptive batch of confirmed tracks awaiting emission.
///
/// The flush threshold starts at one and ramps quadratically up to
/// [`BATCH_CAP`], so the first discoveries of a scan reach the consumer
/// almost immediately while long scans settle into coarse batches. The ramp
/// persists across refreshes within an engine instance.
#[derive(Debug)]
pub struct EmissionBatcher {
    pending: Vec<Track>,
    threshold: usize,
}

impl Default for EmissionBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EmissionBatcher {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            threshold: 1,
        }
    }

    /// Queue one confirmed track. Returns the whole pending batch when the
    /// push made it exceed the current threshold.
    pub fn push(&mut self, track: Track) -> Option<Vec<Track>> {
        self.pending.push(track);
        if self.pending.len() > self.threshold {
            self.threshold = BATCH_CAP.min(1 + self.threshold * self.threshold);
            return Some(std::mem::take(&mut self.pending));
        }
        None
    }

    /// Hand back whatever is pending, if anything. Called at the end of a
    /// completed tree scan.
    pub fn drain(&mut self) -> Option<Vec<Track>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Throw away the pending batch. Called when a stop unwinds a scan; the
    /// discarded tracks stay stale and are re-derived by the next refresh.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
