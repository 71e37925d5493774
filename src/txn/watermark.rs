use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::errors::Error;

use super::Timestamp;

/// Multiset of live read timestamps. The watermark is the smallest live
/// read ts, or the committed baseline when no reader is live; garbage
/// collection never reclaims versions a reader at the watermark could
/// still need.
#[derive(Debug, Default)]
pub struct Watermark {
    commit_ts: Timestamp,
    watermark: Timestamp,
    current_reads: BTreeMap<Timestamp, u32>,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_commit_ts(&mut self, commit_ts: Timestamp) {
        self.commit_ts = commit_ts;
        if self.current_reads.is_empty() {
            self.watermark = commit_ts;
        }
    }

    pub fn add_txn(&mut self, read_ts: Timestamp) -> Result<()> {
        if read_ts < self.commit_ts {
            bail!(Error::Internal(format!(
                "read ts {read_ts} is below the committed baseline {}",
                self.commit_ts
            )));
        }
        *self.current_reads.entry(read_ts).or_insert(0) += 1;
        self.recompute();
        Ok(())
    }

    pub fn remove_txn(&mut self, read_ts: Timestamp) {
        match self.current_reads.get_mut(&read_ts) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.current_reads.remove(&read_ts);
            }
            None => unreachable!("removed a reader that was never added"),
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        self.watermark = match self.current_reads.keys().next() {
            Some(&smallest) => smallest,
            None => self.commit_ts,
        };
    }

    pub fn watermark(&self) -> Timestamp {
        self.watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_smallest_live_reader() -> Result<()> {
        let mut w = Watermark::new();
        w.update_commit_ts(2);
        assert_eq!(w.watermark(), 2);

        w.add_txn(2)?;
        w.add_txn(3)?;
        assert_eq!(w.watermark(), 2);

        w.remove_txn(2);
        assert_eq!(w.watermark(), 3);

        w.remove_txn(3);
        assert_eq!(w.watermark(), 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_read_ts_counted() -> Result<()> {
        let mut w = Watermark::new();
        w.add_txn(5)?;
        w.add_txn(5)?;
        w.remove_txn(5);
        assert_eq!(w.watermark(), 5);
        w.remove_txn(5);
        assert_eq!(w.watermark(), 0);
        Ok(())
    }

    #[test]
    fn test_rejects_stale_reader() {
        let mut w = Watermark::new();
        w.update_commit_ts(4);
        assert!(w.add_txn(3).is_err());
    }

    #[test]
    fn test_snaps_to_commit_ts_when_idle() -> Result<()> {
        let mut w = Watermark::new();
        w.add_txn(0)?;
        w.update_commit_ts(7);
        assert_eq!(w.watermark(), 0);
        w.remove_txn(0);
        assert_eq!(w.watermark(), 7);
        Ok(())
    }
}
