use std::{
    collections::BTreeMap,
    env,
    io::{Read, Write},
    path::PathBuf,
    process::{self, Command, Stdio},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use getopts::Options;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use threadpool::ThreadPool;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::{
    compare::{Comparator, Payload},
    config::{load_suites, CaptureSpec, Encoding, TestCase, TestSuite},
    error::{Error, Result},
    fatal, styles,
    textdiff::DiffMode,
};

/// Environment variable naming the directory searched for suite files when
/// the builder leaves it unset.
const CONFIGS_DIR_VAR: &str = "TEST_CONFIGS_DIR";
/// Environment variable naming a directory whose suite files are skipped.
const EXCLUDE_DIR_VAR: &str = "EXCLUDE_CONFIGS_DIR";

const DEFAULT_CONFIGS_DIR: &str = "./test_configs";

pub struct CliTester {
    config_dir: Option<PathBuf>,
    exclude_dir: Option<PathBuf>,
    styles_path: Option<PathBuf>,
    diff_mode: DiffMode,
    use_cmdline_args: bool,
    cmdline_filters: Option<Vec<String>>,
}

impl CliTester {
    /// Create a new `CliTester` with default options: suites are loaded from
    /// `./test_configs` (or `TEST_CONFIGS_DIR`) and diffs are rendered at
    /// word granularity.
    pub fn new() -> Self {
        CliTester {
            config_dir: None,
            exclude_dir: None,
            styles_path: None,
            diff_mode: DiffMode::Word,
            use_cmdline_args: true,
            cmdline_filters: None,
        }
    }

    /// Specify the directory containing suite files. The directory is
    /// searched recursively for `*.yaml`/`*.yml` files.
    pub fn config_dir<P: Into<PathBuf>>(&mut self, config_dir: P) -> &mut Self {
        self.config_dir = Some(config_dir.into());
        self
    }

    /// Suite files under this directory are not loaded.
    pub fn exclude_dir<P: Into<PathBuf>>(&mut self, exclude_dir: P) -> &mut Self {
        self.exclude_dir = Some(exclude_dir.into());
        self
    }

    /// Load report colours from a TOML style file instead of the built-in
    /// ANSI defaults.
    pub fn styles_path<P: Into<PathBuf>>(&mut self, styles_path: P) -> &mut Self {
        self.styles_path = Some(styles_path.into());
        self
    }

    /// The diff granularity used for cases that do not pick their own.
    pub fn diff_mode(&mut self, diff_mode: DiffMode) -> &mut Self {
        self.diff_mode = diff_mode;
        self
    }

    /// If set to `true`, this reads arguments from `std::env::args()` and
    /// interprets them in the same way as normal cargo test files: each free
    /// argument is a substring filter on `suite.case` test names.
    ///
    /// This option defaults to `true`.
    pub fn use_cmdline_args(&mut self, use_cmdline_args: bool) -> &mut Self {
        self.use_cmdline_args = use_cmdline_args;
        self
    }

    /// Run every case in every discovered suite.
    pub fn run(&mut self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();

        if self.use_cmdline_args {
            let args: Vec<String> = env::args().collect();
            let matches = Options::new()
                .optflag("h", "help", "")
                .parse(&args[1..])
                .unwrap_or_else(|_| usage());
            if matches.opt_present("h") {
                usage();
            }
            if !matches.free.is_empty() {
                self.cmdline_filters = Some(matches.free);
            }
        }

        if let Some(path) = &self.styles_path {
            match styles::StyleMap::load(path) {
                Ok(map) => styles::install(map),
                Err(e) => fatal(&format!("Couldn't load styles from {}: {}", path.display(), e)),
            }
        }

        let config_dir = self
            .config_dir
            .clone()
            .or_else(|| env::var_os(CONFIGS_DIR_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIGS_DIR));
        let exclude_dir = self
            .exclude_dir
            .clone()
            .or_else(|| env::var_os(EXCLUDE_DIR_VAR).map(PathBuf::from));

        let suites = load_suites(&config_dir, exclude_dir.as_deref())
            .unwrap_or_else(|e| fatal(&e.to_string()));
        let cases = resolve_suites(suites, self.diff_mode);
        let (cases, num_filtered) = apply_filters(cases, self.cmdline_filters.as_deref());

        eprint!("\nrunning {} tests", cases.len());
        let num_cases = cases.len();
        let (failures, num_ignored) = run_cases(cases);

        self.pp_failures(&failures, num_cases, num_ignored, num_filtered);

        if !failures.is_empty() {
            process::exit(1);
        }
    }

    /// Pretty print any failures to `stderr`.
    fn pp_failures(
        &self,
        failures: &[(String, String)],
        num_cases: usize,
        num_ignored: usize,
        num_filtered: usize,
    ) {
        if !failures.is_empty() {
            eprintln!("\n\nfailures:");
            for (test_name, report) in failures {
                eprintln!("\n---- cli_tests::{} ----\n{}\n", test_name, report);
            }
            eprintln!("\nfailures:");
            for (test_name, _) in failures {
                eprint!("    cli_tests::{}", test_name);
            }
        }

        eprint!("\n\ntest result: ");
        if failures.is_empty() {
            write_with_colour("ok", Color::Green);
        } else {
            write_with_colour("FAILED", Color::Red);
        }
        eprintln!(
            ". {} passed; {} failed; {} ignored; 0 measured; {} filtered out\n",
            num_cases - failures.len() - num_ignored,
            failures.len(),
            num_ignored,
            num_filtered
        );
    }
}

/// One case after merging in its suite's defaults: everything a worker
/// thread needs to run and check it.
struct ResolvedCase {
    name: String,
    binary: PathBuf,
    case: TestCase,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    diff_mode: DiffMode,
    skip: bool,
}

/// Flatten suites into runnable cases. A case's own env entries override the
/// suite's; its cwd and diff mode fall back to the suite's, then to the
/// harness default.
fn resolve_suites(suites: Vec<TestSuite>, default_mode: DiffMode) -> Vec<ResolvedCase> {
    let mut cases = Vec::new();
    for suite in suites {
        let suite_env = suite.env;
        let suite_cwd = suite.cwd;
        let suite_mode = suite.diff_mode;
        for case in suite.tests {
            let mut env = suite_env.clone();
            env.extend(case.env.clone());
            cases.push(ResolvedCase {
                name: format!("{}.{}", suite.name, case.test),
                binary: suite.binary_path.clone(),
                env,
                cwd: case.cwd.clone().or_else(|| suite_cwd.clone()),
                diff_mode: case.diff_mode.or(suite_mode).unwrap_or(default_mode),
                skip: suite.skip || case.skip,
                case,
            });
        }
    }
    cases
}

/// Keep only cases whose name contains one of the filters, counting the rest
/// as filtered out.
fn apply_filters(
    cases: Vec<ResolvedCase>,
    filters: Option<&[String]>,
) -> (Vec<ResolvedCase>, usize) {
    let filters = match filters {
        Some(fs) => fs,
        None => return (cases, 0),
    };
    let mut num_filtered = 0;
    let kept = cases
        .into_iter()
        .filter(|case| {
            if filters.iter().any(|f| case.name.contains(f)) {
                true
            } else {
                num_filtered += 1;
                false
            }
        })
        .collect();
    (kept, num_filtered)
}

impl ResolvedCase {
    /// Spawn the child process and collect its exit code and output. Stdin
    /// feeding and output draining run on their own threads, so a child
    /// producing more than a pipe buffer's worth of output cannot block
    /// against us while we wait on it.
    fn execute(&self) -> Result<(Option<i32>, Vec<u8>, Vec<u8>)> {
        let args = self.case.build_command()?;
        info!(test = %self.name, binary = %self.binary.display(), ?args, "running");

        let mut cmd = if self.case.shell {
            let mut line = vec![shell_quote(&self.binary.display().to_string())];
            line.extend(args.iter().map(|a| shell_quote(a)));
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line.join(" "));
            cmd
        } else {
            let mut cmd = Command::new(&self.binary);
            cmd.args(&args);
            cmd
        };
        cmd.envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            debug!(test = %self.name, cwd = %cwd.display(), "working directory");
            cmd.current_dir(cwd);
        }

        let stdin_bytes = match &self.case.stdin {
            Some(stdin) => Some(stdin.treated()?.into_bytes()),
            None => None,
        };
        let mut child = cmd.spawn()?;

        let stdin_handle = child.stdin.take();
        let stdin_writer = thread::spawn(move || {
            if let (Some(mut handle), Some(bytes)) = (stdin_handle, stdin_bytes) {
                // The child may exit without draining its stdin.
                let _ = handle.write_all(&bytes);
            }
        });
        let stdout_reader = drain_pipe(child.stdout.take());
        let stderr_reader = drain_pipe(child.stderr.take());

        let status = match self.case.timeout {
            Some(secs) => match child.wait_timeout(Duration::from_secs(secs))? {
                Some(status) => status,
                None => {
                    child.kill()?;
                    child.wait()?;
                    let _ = stdin_writer.join();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(Error::Timeout(secs));
                }
            },
            None => child.wait()?,
        };

        let _ = stdin_writer.join();
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok((status.code(), stdout, stderr))
    }

    /// Compare the collected outputs against the case's expectations. Every
    /// mismatch yields one rendered report; an empty vector means the case
    /// passed.
    fn check(&self, code: Option<i32>, stdout: Vec<u8>, stderr: Vec<u8>) -> Vec<String> {
        let comparator = Comparator::new(self.diff_mode, Encoding::Utf8, styles::global());
        let mut reports = Vec::new();

        let expected_code = Payload::Structured(serde_json::Value::from(
            self.case.expected_return_code,
        ));
        let actual_code = Payload::Structured(match code {
            Some(c) => serde_json::Value::from(i64::from(c)),
            None => serde_json::Value::Null,
        });
        push_outcome(
            &mut reports,
            comparator.compare(
                &expected_code,
                &actual_code,
                Some("Return code is different than expected"),
            ),
        );

        self.check_stream(
            &comparator,
            &mut reports,
            stdout,
            self.case.stdout.as_ref(),
            self.case.expected_stdout.as_ref(),
            "Command stdout and expected output are different",
        );
        self.check_stream(
            &comparator,
            &mut reports,
            stderr,
            self.case.stderr.as_ref(),
            self.case.expected_stderr.as_ref(),
            "Stderr and expected error are different",
        );
        reports
    }

    fn check_stream(
        &self,
        comparator: &Comparator,
        reports: &mut Vec<String>,
        captured: Vec<u8>,
        spec: Option<&CaptureSpec>,
        expected: Option<&crate::config::Content>,
        msg: &str,
    ) {
        let default_spec = CaptureSpec::default();
        let spec = spec.unwrap_or(&default_spec);

        if spec.file_path.is_some() && !captured.is_empty() {
            let saved = spec
                .encoding
                .decode(captured.clone())
                .and_then(|text| spec.save(&text));
            push_outcome(reports, saved);
        }

        let expected = match expected {
            Some(content) => content,
            None => return,
        };
        let outcome = expected.treated().and_then(|expected_payload| {
            let actual_payload = spec.treat(captured)?;
            comparator.compare(&expected_payload, &actual_payload, Some(msg))
        });
        push_outcome(reports, outcome);
    }
}

fn push_outcome(reports: &mut Vec<String>, outcome: Result<()>) {
    if let Err(e) = outcome {
        reports.push(e.to_string());
    }
}

/// Read a child pipe to EOF on its own thread.
fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Single-quote one word for `sh -c`, so arguments containing spaces or
/// quotes survive the shell's re-splitting.
fn shell_quote(piece: &str) -> String {
    format!("'{}'", piece.replace('\'', r"'\''"))
}

fn write_with_colour(s: &str, colour: Color) {
    let mut stderr = StandardStream::stderr(ColorChoice::Always);
    stderr.set_color(ColorSpec::new().set_fg(Some(colour))).ok();
    stderr.write_all(s.as_bytes()).ok();
    stderr.reset().ok();
}

fn usage() -> ! {
    eprintln!("Usage: <filter1> [... <filtern>]");
    process::exit(1);
}

/// Run every resolved case on a thread pool, returning a tuple
/// `(failures, num_ignored)`.
fn run_cases(cases: Vec<ResolvedCase>) -> (Vec<(String, String)>, usize) {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let num_ignored = Arc::new(AtomicUsize::new(0));
    let pool = ThreadPool::new(num_cpus::get());
    for case in cases {
        let failures = Arc::clone(&failures);
        let num_ignored = Arc::clone(&num_ignored);
        pool.execute(move || {
            if case.skip {
                num_ignored.fetch_add(1, Ordering::SeqCst);
                // Grab a lock on stderr so that we can avoid the possibility
                // of lines blurring together in confusing ways.
                let stderr = StandardStream::stderr(ColorChoice::Always);
                let mut handle = stderr.lock();
                handle
                    .write_all(format!("\ntest cli_tests::{} ... ", case.name).as_bytes())
                    .ok();
                handle
                    .set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))
                    .ok();
                handle.write_all("ignored".as_bytes()).ok();
                handle.reset().ok();
                return;
            }

            let reports = match case.execute() {
                Ok((code, stdout, stderr)) => case.check(code, stdout, stderr),
                Err(e @ Error::Timeout(_)) => vec![e.to_string()],
                Err(e) => vec![format!("couldn't run {}: {}", case.binary.display(), e)],
            };

            {
                // Grab a lock on stderr so that we can avoid the possibility
                // of lines blurring together in confusing ways.
                let stderr = StandardStream::stderr(ColorChoice::Always);
                let mut handle = stderr.lock();
                handle
                    .write_all(format!("\ntest cli_tests::{} ... ", case.name).as_bytes())
                    .ok();
                if !reports.is_empty() {
                    let mut failures = failures.lock().unwrap();
                    failures.push((case.name.clone(), reports.join("\n\n")));
                    handle
                        .set_color(ColorSpec::new().set_fg(Some(Color::Red)))
                        .ok();
                    handle.write_all("FAILED".as_bytes()).ok();
                    handle.reset().ok();
                } else {
                    handle
                        .set_color(ColorSpec::new().set_fg(Some(Color::Green)))
                        .ok();
                    handle.write_all("ok".as_bytes()).ok();
                    handle.reset().ok();
                }
            }
        });
    }
    pool.join();
    let failures = Mutex::into_inner(Arc::try_unwrap(failures).unwrap()).unwrap();
    let num_ignored = num_ignored.load(Ordering::SeqCst);

    (failures, num_ignored)
}
