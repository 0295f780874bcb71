//! Subprocess entry point of a subsidiary build.
//!
//! The encoded configuration is the only input and the result envelope the
//! only output. Fatal errors and panics are marshalled into the envelope
//! instead of escaping the process.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use designbuild_core::{BuildConfig, BuildError, BuildResult, FailureReport, Result};
use tracing::{error, info};

use crate::coordinator::BuildCoordinator;

/// Decode `encoded`, run the build and write its result file.
///
/// Returns `Err` only when no result file can be written: the configuration
/// does not decode, names no result file, or the write itself fails.
pub fn run_worker(encoded: &str) -> Result<BuildResult> {
    let config = BuildConfig::decode(encoded)?;
    let result_file = config.paths.result_file.clone().ok_or_else(|| {
        BuildError::InvalidConfig(format!(
            "subsidiary build {} has no result file",
            config.identity.build_id
        ))
    })?;

    let workspace = &config.paths.workspace_root;
    let result = match catch_panic(|| BuildCoordinator::new(&config).run()) {
        Ok(Ok(outcome)) => BuildResult::Completed(outcome.summary),
        Ok(Err(e)) => {
            error!(build_id = %config.identity.build_id, error = %e, "subsidiary build failed");
            BuildResult::Failed(e.to_failure_report(workspace))
        }
        Err(caught) => {
            let report = caught.into_failure_report(workspace);
            error!(build_id = %config.identity.build_id, error = %report, "subsidiary build panicked");
            BuildResult::Failed(report)
        }
    };

    result.write_to(&result_file)?;
    info!(
        build_id = %config.identity.build_id,
        result = %result_file.display(),
        completed = result.is_completed(),
        "wrote build result"
    );
    Ok(result)
}

/// A panic caught by [`catch_panic`].
#[derive(Debug)]
struct CaughtPanic {
    message: String,
    /// Source file and line the panic was raised at.
    location: Option<(PathBuf, u32)>,
}

impl CaughtPanic {
    fn into_failure_report(self, workspace: &Path) -> FailureReport {
        let mut report = BuildError::Panic(self.message).to_failure_report(workspace);
        if let Some((file, line)) = self.location {
            report.origin_path = Some(file);
            report.origin_line = Some(line);
        }
        report
    }
}

/// Run `f`, catching a panic together with its location.
///
/// A panic hook is installed for the duration of the call and the previous
/// hook restored afterwards. Only panics on the calling thread are recorded.
fn catch_panic<T>(f: impl FnOnce() -> T) -> std::result::Result<T, CaughtPanic> {
    let location: Arc<Mutex<Option<(PathBuf, u32)>>> = Arc::default();
    let owner = thread::current().id();
    let slot = Arc::clone(&location);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if thread::current().id() != owner {
            return;
        }
        if let (Some(at), Ok(mut recorded)) = (info.location(), slot.lock()) {
            *recorded = Some((PathBuf::from(at.file()), at.line()));
        }
    }));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(previous);

    outcome.map_err(|payload| CaughtPanic {
        message: panic_message(payload.as_ref()),
        location: location.lock().ok().and_then(|mut recorded| recorded.take()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
