use std::fmt;

use thiserror::Error;

/// Column layout of the data dump, fixed by the first line with 2 or 3 cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `index,value`
    Plain,
    /// `index,ticks,value`
    Timed,
}

impl Layout {
    fn from_cols(cols: usize) -> Option<Self> {
        match cols {
            2 => Some(Layout::Plain),
            3 => Some(Layout::Timed),
            _ => None,
        }
    }

    pub fn cols(self) -> usize {
        match self {
            Layout::Plain => 2,
            Layout::Timed => 3,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("Got {found} column(s) for line {line_no} (\"{line}\"), while expected 2 or 3")]
    UnsupportedColumns {
        found: usize,
        line_no: u64,
        line: String,
    },
    #[error("Got {found} column(s) for line {line_no} (\"{line}\"), while expected {expected}")]
    ColumnMismatch {
        found: usize,
        expected: usize,
        line_no: u64,
        line: String,
    },
    #[error("Can't treat \"{cell}\" in line {line_no} as a sample index")]
    BadIndex { cell: String, line_no: u64 },
    #[error("Can't treat \"{cell}\" in line {line_no} as a number of ticks")]
    BadTicks { cell: String, line_no: u64 },
    #[error("Can't treat \"{cell}\" in line {line_no} as a valid measurement value")]
    BadValue { cell: String, line_no: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSample {
    Plain { index: i64, value: i64 },
    Timed { index: i64, ticks: i64, value: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn of(value: i64) -> Self {
        if value < 2 { Level::Low } else { Level::High }
    }

    fn flip(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "0"),
            Level::High => write!(f, "1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRow {
    Plain { n: u64, level: Level },
    Timed { n: u64, elapsed: i64, level: Level },
}

impl fmt::Display for OutputRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputRow::Plain { n, level } => write!(f, "{},{}", n, level),
            OutputRow::Timed { n, elapsed, level } => write!(f, "{},{},{}", n, elapsed, level),
        }
    }
}

/// Rows for one sample plus the counters to carry into the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub rows: [OutputRow; 2],
    pub next_index: u64,
    pub baseline: Option<i64>,
}

/// Turn one sample into its edge pair. A plain pair shares one row number;
/// a timed pair takes two consecutive numbers at the same elapsed tick.
pub fn expand(raw: RawSample, running_index: u64, baseline: Option<i64>) -> Expansion {
    match raw {
        RawSample::Plain { value, .. } => {
            let level = Level::of(value);
            let n = running_index + 1;
            Expansion {
                rows: [
                    OutputRow::Plain { n, level },
                    OutputRow::Plain {
                        n,
                        level: level.flip(),
                    },
                ],
                next_index: n,
                baseline,
            }
        }
        RawSample::Timed { ticks, value, .. } => {
            let level = Level::of(value);
            let base = baseline.unwrap_or(ticks);
            // ticks count down on the device; not clamped
            let elapsed = base.saturating_sub(ticks);
            Expansion {
                rows: [
                    OutputRow::Timed {
                        n: running_index + 1,
                        elapsed,
                        level,
                    },
                    OutputRow::Timed {
                        n: running_index + 2,
                        elapsed,
                        level: level.flip(),
                    },
                ],
                next_index: running_index + 2,
                baseline: Some(base),
            }
        }
    }
}

/// Per-run counters threaded through the data loop.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    layout: Option<Layout>,
    baseline: Option<i64>,
    index: u64,
}

impl SessionState {
    pub fn layout(&self) -> Option<Layout> {
        self.layout
    }

    pub fn baseline(&self) -> Option<i64> {
        self.baseline
    }

    pub fn running_index(&self) -> u64 {
        self.index
    }

    /// Split and validate one data line. The layout locks on the first line
    /// with 2 or 3 cells, even if its cells later fail to parse.
    pub fn parse(&mut self, line_no: u64, line: &str) -> Result<RawSample, SampleError> {
        let cells: Vec<&str> = line.split(',').collect();
        let layout = match self.layout {
            Some(l) => l,
            None => {
                let l = Layout::from_cols(cells.len()).ok_or_else(|| {
                    SampleError::UnsupportedColumns {
                        found: cells.len(),
                        line_no,
                        line: line.to_string(),
                    }
                })?;
                self.layout = Some(l);
                l
            }
        };
        if cells.len() != layout.cols() {
            return Err(SampleError::ColumnMismatch {
                found: cells.len(),
                expected: layout.cols(),
                line_no,
                line: line.to_string(),
            });
        }

        let index = parse_cell(cells[0])
            .ok_or_else(|| SampleError::BadIndex { cell: cells[0].to_string(), line_no })?;
        match layout {
            Layout::Plain => {
                let value = parse_cell(cells[1])
                    .ok_or_else(|| SampleError::BadValue { cell: cells[1].to_string(), line_no })?;
                Ok(RawSample::Plain { index, value })
            }
            Layout::Timed => {
                let ticks = parse_cell(cells[1])
                    .ok_or_else(|| SampleError::BadTicks { cell: cells[1].to_string(), line_no })?;
                let value = parse_cell(cells[2])
                    .ok_or_else(|| SampleError::BadValue { cell: cells[2].to_string(), line_no })?;
                Ok(RawSample::Timed {
                    index,
                    ticks,
                    value,
                })
            }
        }
    }

    pub fn expand(&mut self, raw: RawSample) -> [OutputRow; 2] {
        let Expansion {
            rows,
            next_index,
            baseline,
        } = expand(raw, self.index, self.baseline);
        self.index = next_index;
        self.baseline = baseline;
        rows
    }

    /// Parse then expand; a rejected line leaves the counters untouched.
    pub fn accept(&mut self, line_no: u64, line: &str) -> Result<[OutputRow; 2], SampleError> {
        let raw = self.parse(line_no, line)?;
        Ok(self.expand(raw))
    }
}

fn parse_cell(cell: &str) -> Option<i64> {
    cell.trim().parse::<i64>().ok()
}
