//! Stream scanning: feeds files and pipes through the engine
//!
//! Input is read one memory page at a time. A read is never allowed to
//! cross a block boundary or the size limit, so each block's context sees
//! exactly its own bytes.

use crate::algorithm::{Algorithm, AlgorithmResult};
use crate::batch::{BatchRecord, BatchRequest, Measurement};
use crate::config::ScanOptions;
use crate::error::Result;
use crate::frequency::FrequencyContext;
use crate::report::ReportWriter;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Used when the page size cannot be queried
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// System memory page size
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // sysconf has no preconditions; -1 means the value is unavailable
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    FALLBACK_PAGE_SIZE
}

/// Metrics computed per unit: the requested ones first, then any that only
/// the filters need
#[derive(Debug, Clone)]
pub struct MetricPlan {
    request: BatchRequest,
    shown: usize,
    min_entropy: Option<f64>,
    max_chi_square: Option<f64>,
}

impl MetricPlan {
    pub fn new(options: &ScanOptions) -> Result<Self> {
        let mut algorithms = options.metrics.clone();
        let shown = algorithms.len();

        if options.min_entropy.is_some() && !algorithms.contains(&Algorithm::Shannon) {
            algorithms.push(Algorithm::Shannon);
        }
        if options.max_chi_square.is_some() && !algorithms.contains(&Algorithm::ChiSquare) {
            algorithms.push(Algorithm::ChiSquare);
        }

        Ok(MetricPlan {
            request: BatchRequest::new(&algorithms)?,
            shown,
            min_entropy: options.min_entropy,
            max_chi_square: options.max_chi_square,
        })
    }

    pub fn request(&self) -> &BatchRequest {
        &self.request
    }

    /// Compute the plan against `ctx`
    ///
    /// Returns `None` when a filter suppresses the unit, otherwise the
    /// requested measurements in order.
    ///
    /// # Errors
    ///
    /// The first failed metric, e.g. `FloatingPoint` for an empty context.
    pub fn evaluate<'a>(&self, ctx: &'a FrequencyContext) -> Result<Option<Vec<Measurement<'a>>>> {
        let mut measurements = ctx
            .batch_calculate(&self.request)
            .into_iter()
            .map(BatchRecord::into_measurement)
            .collect::<Result<Vec<_>>>()?;

        if let Some(min) = self.min_entropy {
            if scalar_of(&measurements, Algorithm::Shannon).is_some_and(|entropy| entropy < min) {
                return Ok(None);
            }
        }
        if let Some(max) = self.max_chi_square {
            if scalar_of(&measurements, Algorithm::ChiSquare).is_some_and(|chisq| chisq > max) {
                return Ok(None);
            }
        }

        measurements.truncate(self.shown);
        Ok(Some(measurements))
    }
}

fn scalar_of(measurements: &[Measurement<'_>], algorithm: Algorithm) -> Option<f64> {
    measurements
        .iter()
        .find(|m| m.algorithm == algorithm)
        .and_then(|m| match m.value {
            AlgorithmResult::Scalar(value) => Some(value),
            AlgorithmResult::Distribution(_) => None,
        })
}

/// Counters for one scanned input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Bytes measured (after the skip offset)
    pub bytes_read: u64,
    /// Units computed
    pub units: u64,
    /// Units written after filtering
    pub reported: u64,
}

/// Drives byte streams through the engine according to [`ScanOptions`]
#[derive(Debug, Clone)]
pub struct FileScanner {
    options: ScanOptions,
    plan: MetricPlan,
    page_size: usize,
}

impl FileScanner {
    pub fn new(options: ScanOptions) -> Result<Self> {
        options.validate()?;
        let plan = MetricPlan::new(&options)?;
        Ok(FileScanner {
            options,
            plan,
            page_size: page_size(),
        })
    }

    /// Override the read granularity
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan a file, seeking past the skip offset
    pub fn scan_path<P: AsRef<Path>, W: Write>(
        &self,
        path: P,
        report: &mut ReportWriter<W>,
    ) -> Result<ScanSummary> {
        let mut file = File::open(path.as_ref())?;
        let skip = self.options.skip_offset;
        if skip > 0 {
            file.seek(SeekFrom::Start(skip))?;
        }
        advise_sequential(&file, skip);

        debug!("Scanning {:?}", path.as_ref());
        self.scan_stream(file, skip, report)
    }

    /// Scan a non-seekable stream; the skip offset is read and discarded
    pub fn scan_reader<R: Read, W: Write>(
        &self,
        mut reader: R,
        report: &mut ReportWriter<W>,
    ) -> Result<ScanSummary> {
        let skip = self.options.skip_offset;
        if skip > 0 {
            let skipped = io::copy(&mut (&mut reader).take(skip), &mut io::sink())?;
            if skipped < skip {
                debug!(skipped, skip, "Input ended inside the skip offset");
            }
        }
        self.scan_stream(reader, skip, report)
    }

    fn scan_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        start_offset: u64,
        report: &mut ReportWriter<W>,
    ) -> Result<ScanSummary> {
        let block_size = self.options.block_size;
        let size_limit = self.options.size_limit;

        let mut buf = vec![0u8; self.page_size];
        let mut ctx = FrequencyContext::new();
        let mut summary = ScanSummary::default();
        let mut offset = start_offset;
        let mut remaining = 0u64;

        loop {
            if size_limit.is_some_and(|limit| summary.bytes_read >= limit) {
                break;
            }

            let mut read_size = self.page_size as u64;
            if let Some(block) = block_size {
                if remaining == 0 {
                    remaining = block;
                }
                read_size = read_size.min(remaining);
            }
            if let Some(limit) = size_limit {
                read_size = read_size.min(limit - summary.bytes_read);
            }

            let n = read_some(&mut reader, &mut buf[..read_size as usize])?;
            if n == 0 {
                break;
            }

            ctx.update(&buf[..n]);
            offset += n as u64;
            summary.bytes_read += n as u64;

            if block_size.is_some() {
                remaining -= n as u64;
                if remaining == 0 {
                    self.report_unit(&ctx, Some(offset), report, &mut summary)?;
                    ctx.reset();
                }
            }
        }

        if block_size.is_none() {
            if ctx.is_empty() {
                warn!("Input is empty, nothing to measure");
            } else {
                self.report_unit(&ctx, None, report, &mut summary)?;
            }
        } else if !ctx.is_empty() {
            debug!(bytes = ctx.symbol_count(), "Dropping trailing partial block");
        }

        Ok(summary)
    }

    fn report_unit<W: Write>(
        &self,
        ctx: &FrequencyContext,
        position: Option<u64>,
        report: &mut ReportWriter<W>,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        summary.units += 1;
        if let Some(measurements) = self.plan.evaluate(ctx)? {
            report.write_unit(position, &measurements)?;
            summary.reported += 1;
        }
        Ok(())
    }
}

fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(target_os = "linux")]
fn advise_sequential(file: &File, offset: u64) {
    use std::os::unix::io::AsRawFd;

    // Advisory only; a failure changes nothing but read-ahead
    let rc = unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            offset as libc::off_t,
            0,
            libc::POSIX_FADV_SEQUENTIAL,
        )
    };
    if rc != 0 {
        debug!(rc, "posix_fadvise failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_sequential(_file: &File, _offset: u64) {}
