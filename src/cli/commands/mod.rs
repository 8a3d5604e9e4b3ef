pub mod decrypt;
pub mod file;
pub mod keygen;
pub mod object;
pub mod recipients;
pub mod target;
pub mod upload;

use crate::cli::output;
use crate::core::services::pipeline::RunReport;

/// Print the outcome of one backup run.
fn report_run(report: &RunReport, quiet: bool) {
    if quiet {
        return;
    }
    output::success(&format!("{} → {}", report.source, report.destination));
    output::detail(&format!(
        "{} plaintext, {} ciphertext in {:.1}s",
        output::bytes(report.plaintext_bytes),
        output::bytes(report.ciphertext_bytes),
        report.elapsed.as_secs_f64()
    ));
}
