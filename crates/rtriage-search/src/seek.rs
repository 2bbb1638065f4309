//! Binary time-window seek over timestamped log files.
//!
//! Given a file and a cutoff timestamp, [`TimeWindowSeeker`] finds the byte
//! offset of the first line whose timestamp is at or after the cutoff, so a
//! full-text search can skip everything older without scanning it. The file's
//! line → offset index is built once (O(n)); the bisection itself probes at
//! most 64 bytes per step.
//!
//! Log files are messy: multi-line records, truncated writes, and binary
//! garbage all produce lines with no parsable timestamp. The seeker steps
//! around such lines (backward first, then forward) and keeps track of the
//! skipped set; if a step walks back into a region already skipped in the
//! opposite direction the bisection has looped and the seek recovers to the
//! last known-good line. All failure modes degrade to "scan the whole file".

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{Datelike, NaiveDateTime};

use crate::timestamp::extract_timestamp;

/// Hard cap on contiguous unparsable lines before the file is treated as
/// unseekable.
pub const MAX_SEEK_SKIP: usize = 1000;

/// Bytes probed per line; enough for every supported timestamp format.
const PROBE_BYTES: usize = 64;

/// Set of line numbers currently being skipped in one direction.
///
/// Invariant: the current set and the previous set must never intersect —
/// an intersection means the seek has looped back on itself.
#[derive(Debug, Default)]
struct SkipRange {
    current: BTreeSet<usize>,
    previous: BTreeSet<usize>,
    backward: bool,
}

enum SkipFault {
    /// Current and previous skip sets intersect.
    Overlap,
    /// The contiguous-skip cap was reached.
    Exhausted,
}

impl SkipRange {
    fn new() -> Self {
        SkipRange {
            backward: true,
            ..Default::default()
        }
    }

    fn push(&mut self, line: usize) -> Result<(), SkipFault> {
        if self.previous.contains(&line) {
            return Err(SkipFault::Overlap);
        }
        self.current.insert(line);
        if self.current.len() >= MAX_SEEK_SKIP {
            return Err(SkipFault::Exhausted);
        }
        Ok(())
    }

    /// Next line to try within `(start, end]`, or `None` when both directions
    /// are exhausted. `start` itself is excluded: it has already been probed
    /// and found too old (or unparsable), so stepping onto it again would
    /// only loop.
    fn next_line(&mut self, start: usize, end: usize) -> Option<usize> {
        if self.backward {
            let lo = *self.current.iter().next()?;
            if lo > start + 1 {
                return Some(lo - 1);
            }
            self.backward = false;
        }
        let hi = *self.current.iter().next_back()?;
        if hi < end { Some(hi + 1) } else { None }
    }

    /// A parsable line was found: the current skip set becomes the previous
    /// one and a new episode starts backward.
    fn archive(&mut self) {
        self.previous = std::mem::take(&mut self.current);
        self.backward = true;
    }
}

/// Binary seeker bounding a search to lines at or after a cutoff timestamp.
pub struct TimeWindowSeeker<R> {
    reader: R,
    cutoff: NaiveDateTime,
    /// Byte offset of the start of each line.
    offsets: Vec<u64>,
    file_len: u64,
}

impl<R: Read + Seek> TimeWindowSeeker<R> {
    /// Index the file's lines and prepare to seek. One full pass over the
    /// file; subsequent probes are O(1) seeks.
    pub fn new(mut reader: R, cutoff: NaiveDateTime) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut offsets = Vec::new();
        let mut buf = [0u8; 8192];
        let mut pos = 0u64;
        let mut at_line_start = true;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            for &b in &buf[..n] {
                if at_line_start {
                    offsets.push(pos);
                    at_line_start = false;
                }
                if b == b'\n' {
                    at_line_start = true;
                }
                pos += 1;
            }
        }
        Ok(TimeWindowSeeker {
            reader,
            cutoff,
            offsets,
            file_len: pos,
        })
    }

    /// Number of indexed lines.
    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    /// Find the byte offset of the first line whose timestamp is at or after
    /// the cutoff.
    ///
    /// Returns 0 when undeterminable (scan everything) and the file length
    /// when every timestamped line is older than the cutoff (scan nothing).
    pub fn run(&mut self) -> io::Result<u64> {
        if self.offsets.is_empty() {
            return Ok(0);
        }

        // First line already in range: no seeking needed.
        if let Some(ts) = self.timestamp_at(0)?
            && ts >= self.cutoff
        {
            return Ok(0);
        }
        if self.offsets.len() == 1 {
            // Single line, known or presumed out of range.
            return match self.timestamp_at(0)? {
                Some(_) => Ok(self.file_len),
                None => Ok(0),
            };
        }

        let last = self.offsets.len() - 1;
        let mut start = 0usize;
        let mut end = last;
        let mut cur = end / 2;
        let mut last_good: Option<usize> = None;
        let mut skip = SkipRange::new();

        // The iteration cap guarantees termination on adversarial input.
        for _ in 0..=self.offsets.len() {
            match self.timestamp_at(cur)? {
                None => {
                    match skip.push(cur) {
                        Ok(()) => {}
                        Err(SkipFault::Overlap) => {
                            return Ok(last_good.map_or(0, |l| self.offsets[l]));
                        }
                        Err(SkipFault::Exhausted) => return Ok(0),
                    }
                    match skip.next_line(start, end) {
                        Some(next) => cur = next,
                        None => return Ok(0),
                    }
                }
                Some(ts) if ts >= self.cutoff => {
                    last_good = Some(cur);
                    if cur == 0 {
                        // Whole file is within range.
                        return Ok(0);
                    }
                    if end - start <= 1 {
                        return Ok(self.offsets[cur]);
                    }
                    end = cur;
                    skip.archive();
                    cur = start + (end - start) / 2;
                }
                Some(_) => {
                    if cur == 0 {
                        // Maybe only the tail of the file is recent enough.
                        skip.archive();
                        cur = last;
                        continue;
                    }
                    if cur == end {
                        // Range collapsed onto the final line and it is still
                        // too old: nothing in this file is in range.
                        return Ok(self.file_len);
                    }
                    start = cur;
                    skip.archive();
                    cur = if end - start <= 1 {
                        end
                    } else {
                        start + (end - start) / 2
                    };
                }
            }
        }

        Ok(0)
    }

    /// Probe up to 64 bytes of the given line and attempt timestamp
    /// extraction.
    fn timestamp_at(&mut self, line: usize) -> io::Result<Option<NaiveDateTime>> {
        let offset = self.offsets[line];
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = [0u8; PROBE_BYTES];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let raw = &buf[..filled];
        let line_bytes = match raw.iter().position(|&b| b == b'\n') {
            Some(nl) => &raw[..nl],
            None => raw,
        };
        let text = String::from_utf8_lossy(line_bytes);
        Ok(extract_timestamp(&text, self.cutoff.year()))
    }
}

/// Open `path` and seek it against `cutoff`. IO failures and unseekable files
/// both degrade to offset 0.
pub fn seek_file_since(path: &Path, cutoff: NaiveDateTime) -> io::Result<u64> {
    let file = File::open(path)?;
    TimeWindowSeeker::new(file, cutoff)?.run()
}
