use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Tally {
    pub accepted: u64,
    pub skipped: u64,
    pub rows: u64,
    t0: Instant,
}

impl Tally {
    pub fn new() -> Self {
        Self {
            accepted: 0,
            skipped: 0,
            rows: 0,
            t0: Instant::now(),
        }
    }
    pub fn inc_accepted(&mut self, rows: usize) {
        self.accepted += 1;
        self.rows += rows as u64;
    }
    pub fn inc_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn log(&self) {
        log::info!(
            "[data] accepted={} skipped={} rows={} over {:.3}s",
            self.accepted,
            self.skipped,
            self.rows,
            self.t0.elapsed().as_secs_f64(),
        );
    }
}
