use std::sync::atomic::{AtomicBool, Ordering};

use quick::core;
use quick::signals;
use quick::status::ExitStatus;

/// Entry point - catches Ctrl+C and calls core::run()
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    // The first Ctrl+C only sets the flag and fires the cancellation token,
    // so a running benchmark can still print its report
    ctrlc::set_handler(move || {
        signals::set_interrupted();

        // Print newline to clean up interrupted line
        eprintln!("\nInterrupted");

        // On second Ctrl+C, force exit (user really wants out)
        static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);
        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
    .ok();

    let args: Vec<String> = std::env::args().collect();

    let status = core::run(args);

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }

    status
}
