use chrono::{DateTime, Local};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser};
use crossterm::{
    cursor, execute,
    style::Stylize,
    terminal::{Clear, ClearType},
};
use notify_rust::{Notification, Urgency};
use std::{
    env, fs, io,
    io::Write,
    path::{Path, PathBuf},
    process,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

// ============================================================================
// Constants
// ============================================================================

const WORK_MINUTES_DEFAULT: u32 = 25;
const BREAK_MINUTES_DEFAULT: u32 = 5;
const TICK: Duration = Duration::from_secs(1);
const STAMP_FMT: &str = "%Y/%m/%d %Hh:%Mm";

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "pomtimer",
    version,
    about = "🍅 pomtimer - A Minimalistic Terminal Pomodoro Timer",
    long_about = "pomtimer is a minimalistic Pomodoro timer that runs in a terminal.\n\
                  The default timer counts to 25 minutes in 1 second intervals, asking\n\
                  you to do work. Then, a break of 5 minutes is recommended. Both\n\
                  intervals can be changed via the options below. Pass a log file to\n\
                  save a line of statistics about how much you got done on exit."
)]
struct Args {
    /// Change the default work time to TIME minutes
    #[arg(short, long, value_name = "TIME", value_parser = parse_minutes)]
    work: Option<u32>,
    /// Change the default break time to TIME minutes
    #[arg(short, long = "break", value_name = "TIME", value_parser = parse_minutes)]
    break_time: Option<u32>,
    /// Path to a log file (without it, no logs are saved)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn parse_minutes(s: &str) -> std::result::Result<u32, String> {
    // atoi semantics: anything unparseable reads as 0 and fails validation
    let n = s.trim().parse::<i64>().unwrap_or(0);
    if n < 1 {
        return Err(format!("bad value {n} (must be int > 0)"));
    }
    Ok(n as u32)
}

/// Lenient argument parsing: bad values are fatal, but unknown options and
/// options missing their value only warn and are dropped from the argument
/// list before parsing is retried.
fn parse_args() -> Args {
    let mut argv: Vec<String> = env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    // A help flag anywhere short-circuits all other processing, even
    // fatally bad option values earlier in the argument list.
    if argv.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        let _ = Args::command().print_help();
        process::exit(0);
    }

    loop {
        match Args::try_parse_from(&argv) {
            Ok(args) => return args,
            Err(err) => match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = err.print();
                    process::exit(0);
                }
                ErrorKind::UnknownArgument => {
                    let bad = offending_arg(&err);
                    eprintln!("{}: Provided bad option {bad}.", "warning".yellow());
                    if !remove_first(&mut argv, &bad) {
                        let _ = err.print();
                        process::exit(1);
                    }
                }
                ErrorKind::InvalidValue => {
                    let arg = offending_arg(&err);
                    let opt = arg.split_whitespace().next().unwrap_or(&arg).to_string();
                    eprintln!("{}: Need value after {opt}.", "warning".yellow());
                    if !remove_first(&mut argv, &opt) {
                        let _ = err.print();
                        process::exit(1);
                    }
                }
                _ => {
                    // bad numeric value and anything else unexpected
                    let _ = err.print();
                    process::exit(1);
                }
            },
        }
    }
}

fn offending_arg(err: &clap::Error) -> String {
    match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Remove the first occurrence of `token` (or its short alias, or its
/// `token=value` form) from `argv`. Returns false if nothing matched.
fn remove_first(argv: &mut Vec<String>, token: &str) -> bool {
    let mut forms = vec![token.to_string()];
    match token {
        "--work" => forms.push("-w".into()),
        "--break" => forms.push("-b".into()),
        "--log-file" => forms.push("-f".into()),
        _ => {}
    }

    let pos = argv.iter().position(|a| {
        forms
            .iter()
            .any(|f| a == f || a.starts_with(&format!("{f}=")))
    });
    match pos {
        Some(i) => {
            argv.remove(i);
            true
        }
        None => false,
    }
}

// ============================================================================
// Data Models
// ============================================================================

struct Config {
    work_minutes: u32,
    break_minutes: u32,
    log_path: Option<PathBuf>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            work_minutes: args.work.unwrap_or(WORK_MINUTES_DEFAULT),
            break_minutes: args.break_time.unwrap_or(BREAK_MINUTES_DEFAULT),
            log_path: args.log_file,
        }
    }
}

/// The clock driving both phases. `seconds` stays in [0, 59]; `minutes`
/// counts up from 0 and is reset at every phase change. The cycle counters
/// only ever grow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TimerClock {
    seconds: u32,
    minutes: u32,
    work_cycles: u32,
    break_cycles: u32,
}

impl TimerClock {
    fn advance(&mut self) {
        if self.seconds == 59 {
            self.minutes += 1;
            self.seconds = 0;
        } else {
            self.seconds += 1;
        }
    }

    fn phase_complete(&self, threshold_minutes: u32) -> bool {
        self.minutes == threshold_minutes
    }

    /// Entering the break marks the preceding work cycle as done.
    fn start_break(&mut self) {
        self.seconds = 0;
        self.minutes = 0;
        self.work_cycles += 1;
    }

    /// Re-entering work marks the preceding break cycle as done.
    fn start_work(&mut self) {
        self.seconds = 0;
        self.minutes = 0;
        self.break_cycles += 1;
    }

    /// Seconds across all completed cycles plus whatever is on the clock.
    fn total_seconds(&self, config: &Config) -> u64 {
        u64::from(self.work_cycles) * u64::from(config.work_minutes) * 60
            + u64::from(self.break_cycles) * u64::from(config.break_minutes) * 60
            + u64::from(self.minutes) * 60
            + u64::from(self.seconds)
    }
}

// ============================================================================
// Timer Loop
// ============================================================================

fn run(config: &Config, clock: &Mutex<TimerClock>) -> ! {
    loop {
        // Work phase
        loop {
            let snapshot = *clock.lock().unwrap();
            if snapshot.phase_complete(config.work_minutes) {
                break;
            }
            render_work(&snapshot);
            tick(clock);
        }
        clock.lock().unwrap().start_break();
        clear_line();
        notify("Break Time! ☕", "Work interval complete. Take a break.");

        // Break phase
        loop {
            let snapshot = *clock.lock().unwrap();
            if snapshot.phase_complete(config.break_minutes) {
                break;
            }
            render_break(&snapshot);
            tick(clock);
        }
        clock.lock().unwrap().start_work();
        clear_line();
        notify("Back to Work! 🎯", "Break is over. Time to focus.");
    }
}

// The lock is never held across the sleep, so the interrupt handler can
// snapshot the clock at any point of a tick.
fn tick(clock: &Mutex<TimerClock>) {
    thread::sleep(TICK);
    clock.lock().unwrap().advance();
}

fn render_work(clock: &TimerClock) {
    let elapsed = format!("{:2}m:{:2}s", clock.minutes, clock.seconds).green();
    let done = clock.work_cycles.to_string().yellow();
    let plural = if clock.work_cycles == 1 { "" } else { "s" };
    eprint!("Time to Work [{elapsed}, done {done} time{plural}]\r");
}

fn render_break(clock: &TimerClock) {
    let elapsed = format!("{:2}m:{:2}s", clock.minutes, clock.seconds).green();
    eprint!("Take a break [{elapsed}]\r");
}

fn clear_line() {
    let _ = execute!(
        io::stderr(),
        Clear(ClearType::CurrentLine),
        cursor::MoveToColumn(0)
    );
}

// ============================================================================
// Stats Persistence
// ============================================================================

fn save_stats(path: &Path, config: &Config, clock: &TimerClock) -> io::Result<()> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let line = format_stats_line(Local::now(), clock.total_seconds(config));
    writeln!(file, "{line}")
}

/// Hours, minutes and seconds are each derived from the same total rather
/// than decomposed; existing logs depend on this format.
fn format_stats_line(now: DateTime<Local>, total_secs: u64) -> String {
    format!(
        "[{}]\t{}hrs\t{}mins ({}secs)",
        now.format(STAMP_FMT),
        total_secs / 3600,
        total_secs / 60,
        total_secs
    )
}

// ============================================================================
// Shutdown
// ============================================================================

/// Runs on ctrlc's handler thread, which fully replaces normal
/// continuation: save if logging is enabled, restore the terminal, exit.
fn shutdown(config: &Config, clock: &Mutex<TimerClock>) -> ! {
    let snapshot = *clock.lock().unwrap();
    if let Some(path) = &config.log_path {
        if let Err(err) = save_stats(path, config, &snapshot) {
            eprintln!(
                "\n{}: Could not write `{}': {err}.",
                "warning".yellow(),
                path.display()
            );
        }
    }
    let _ = execute!(io::stderr(), cursor::Show);
    eprintln!("\n\n{}.", "Done".green());
    process::exit(0);
}

// ============================================================================
// Utilities
// ============================================================================

fn notify(title: &str, body: &str) {
    let _ = Notification::new()
        .summary(title)
        .body(body)
        .appname("pomtimer")
        .icon("alarm-clock")
        .urgency(Urgency::Normal)
        .show();
}

fn print_info(config: &Config) {
    eprintln!(
        "Work time: {}, Break time: {}.",
        format!("{}min{}", config.work_minutes, plural(config.work_minutes)).green(),
        format!("{}min{}", config.break_minutes, plural(config.break_minutes)).red(),
    );
    match &config.log_path {
        Some(path) => eprintln!("Saving logs to `{}'.", path.display().to_string().blue()),
        None => eprintln!("{} saving logs.", "Not".blue()),
    }
    eprintln!("Exit with {}.\n", "ctrl+c".red());
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let args = parse_args();
    let config = Arc::new(Config::from(args));
    let clock = Arc::new(Mutex::new(TimerClock::default()));

    let _ = execute!(io::stderr(), cursor::Hide);

    {
        let config = Arc::clone(&config);
        let clock = Arc::clone(&clock);
        if let Err(err) = ctrlc::set_handler(move || shutdown(&config, &clock)) {
            eprintln!("{}: Failed to catch signal: {err}.", "warning".yellow());
        }
    }

    print_info(&config);
    run(&config, &clock)
}

// ============================================================================
// Tests
// ============================================================================
