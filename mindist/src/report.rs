//! Per-rank status lines.

use {
    crate::validator::Outcome,
    std::io::{self, Write},
};

/// Writes one line per outcome and flushes it right away so the lines of
/// concurrently running ranks interleave whole.
pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write errors are dropped; reporting never fails the process.
    pub fn report(&mut self, rank: usize, outcome: &Outcome) {
        let line = format_outcome(rank, outcome);
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            log::debug!("unable to write report for rank {rank}: {err}");
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_outcome(rank: usize, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success => format!("Success rank - {rank}: only one NUMA node is scheduled"),
        Outcome::Skipped(reason) => format!("Skipped rank - {rank}: {reason}"),
        Outcome::Failed(violation) => format!("Failed rank - {rank}: {violation}"),
        Outcome::Error(err) => format!("Error rank - {rank}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::validator::{CheckError, SkipReason, Violation},
        mindist_cpu_utils::NumaNodeId,
    };

    #[test]
    fn test_format_outcome() {
        assert_eq!(
            format_outcome(3, &Outcome::Success),
            "Success rank - 3: only one NUMA node is scheduled"
        );
        assert_eq!(
            format_outcome(0, &Outcome::Skipped(SkipReason::NoDistPolicy)),
            "Skipped rank - 0: no dist policy specified"
        );
        assert_eq!(
            format_outcome(
                7,
                &Outcome::Failed(Violation::WrongNode {
                    observed: NumaNodeId(0),
                    expected: NumaNodeId(1),
                })
            ),
            "Failed rank - 7: scheduled on wrong NUMA node: observed 0, expected 1"
        );
        assert_eq!(
            format_outcome(2, &Outcome::Error(CheckError::EmptyAffinity)),
            "Error rank - 2: affinity query failed: empty affinity mask"
        );
    }

    #[test]
    fn test_report_writes_single_line() {
        let mut reporter = Reporter::new(Vec::new());
        reporter.report(
            5,
            &Outcome::Skipped(SkipReason::LocalityUnknown {
                device: "mlx5_0".to_string(),
            }),
        );
        let written = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(written, "Skipped rank - 5: locality unknown for device mlx5_0\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_report_ignores_write_errors() {
        let mut reporter = Reporter::new(BrokenPipe);
        reporter.report(1, &Outcome::Success);
    }
}
