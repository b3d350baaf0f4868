//! Process entry point: resolves configuration from the command line,
//! initializes diagnostics, and runs exactly one session over stdio.
//!
//! Establishing the transport itself (TCP listener, SSH invocation, inetd)
//! is out of scope here (§1, §6) — `lobd` is invoked once per connection by
//! whatever external mechanism owns that, with stdin/stdout already wired
//! to the remote peer, matching §6's "started by an external transport".

#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use lob_core::config::ResolvedConfig;
use lob_core::exit_code::ExitCode;
use lob_daemon::run_session;

/// Server side of the smart LOB transfer protocol (§1, §6).
#[derive(Parser, Debug)]
#[command(about, version)]
struct Cli {
    /// Absolute directory that is the root of the store namespace.
    #[arg(long, value_name = "DIR")]
    base_path: PathBuf,

    /// Repo path for this session, validated against `base-path` (§6).
    #[arg(long, value_name = "PATH")]
    repo_path: String,

    /// Accept an absolute `repo-path` without rewriting it under `base-path`.
    #[arg(long, default_value_t = false)]
    allow_absolute_paths: bool,

    /// Accept `UploadDelta` requests. Disable to force whole-file transfer.
    #[arg(long, default_value_t = true)]
    enable_delta_receive: bool,

    /// Serve `DownloadDeltaPrepare`/`DownloadDeltaStart`. Disable to force
    /// whole-file transfer.
    #[arg(long, default_value_t = true)]
    enable_delta_send: bool,

    /// Root directory of the delta cache. Defaults to `<base-path>/.deltacache`.
    #[arg(long, value_name = "DIR")]
    delta_cache_path: Option<PathBuf>,

    /// Maximum accepted inbound delta size, in bytes.
    #[arg(long, value_name = "BYTES")]
    delta_size_limit: Option<u64>,

    /// Process-wide chunk size, in bytes. Overridable only for testing.
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<u64>,
}

fn main() -> ProcessExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    run(cli).into()
}

fn run(cli: Cli) -> ExitCode {
    let base_path = match cli.base_path.canonicalize() {
        Ok(path) => path,
        Err(err) => {
            tracing::error!(error = %err, path = %cli.base_path.display(), "base-path is not usable");
            return ExitCode::MissingBasePath;
        }
    };

    let mut config = ResolvedConfig::new(base_path, cli.delta_cache_path);
    config.allow_absolute_paths = cli.allow_absolute_paths;
    config.enable_delta_receive = cli.enable_delta_receive;
    config.enable_delta_send = cli.enable_delta_send;
    if let Some(limit) = cli.delta_size_limit {
        config.delta_size_limit = limit;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }

    if let Err(err) = config.resolve_store_root(&cli.repo_path) {
        tracing::error!(error = %err, repo_path = %cli.repo_path, "invalid repo path");
        return ExitCode::InvalidRepoPath;
    }

    if let Err(err) = std::fs::create_dir_all(&config.delta_cache_path) {
        tracing::error!(error = %err, path = %config.delta_cache_path.display(), "cannot create delta cache directory");
        return ExitCode::CannotCreateDeltaCache;
    }

    tracing::info!(repo_path = %cli.repo_path, "session starting");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let config = Arc::new(config);
    let repo_path = cli.repo_path.clone();

    // §7: "Panics at any layer are caught at the session top level, logged
    // with a stack, and produce exit code 99." The dispatch loop never
    // panics deliberately, but a caught panic here still beats an abrupt
    // process abort with no diagnostic.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run_session(stdin.lock(), stdout.lock(), config, &repo_path)
    }));

    match result {
        Ok(Ok(())) => {
            tracing::info!("session ended cleanly");
            ExitCode::Ok
        }
        Ok(Err(err)) => {
            let code = err.exit_code();
            tracing::error!(error = %err, exit_code = code.as_i32(), "session terminated");
            code
        }
        Err(panic) => {
            let message = panic_message(&panic);
            let backtrace = std::backtrace::Backtrace::force_capture();
            tracing::error!(panic = %message, backtrace = %backtrace, "session panicked");
            ExitCode::Internal
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
