//! Check running processes

use std::collections::HashSet;

use nix::unistd::{getpid, getppid, Pid};
use regex::Regex;
use structopt::StructOpt;
use tracing::{debug, warn};

use vigil_plugins::args::CommonArgs;
use vigil_plugins::check::{plugin_exit, CheckResult, MessageOptions};
use vigil_plugins::perfdata::PerfOpts;
use vigil_plugins::procfs::{Process, RunningProcs, State};
use vigil_plugins::threshold::check_threshold;
use vigil_plugins::timeout;
use vigil_plugins::Status;

const SHORT_NAME: &str = "PROCS";

/// Check that an expected number of processes are running.
///
/// The -w and -c ranges apply to the number of matching processes.
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-procs (part of vigil-plugins)",
    raw(setting = "structopt::clap::AppSettings::ColoredHelp"),
    after_help = "Examples:

    Ensure at least two nginx processes are running:

        check-procs -c 2: nginx

    Ensure that there are not more than 5 java processes running MyMainClass
    that are in the zombie *or* waiting states:

        check-procs -c 5 --state zombie --state waiting 'java.*MyMainClass'

    Warn about more than ten zombies of any kind:

        check-procs -w 10 --state zombie

    Count everything except sleeping processes:

        check-procs --ignore-state sleeping -w 500"
)]
struct Args {
    #[structopt(help = "Regex that command and its arguments must match")]
    pattern: Option<String>,

    #[structopt(
        long = "state",
        raw(number_of_values = "1"),
        help = "Filter to only processes in these states. \
                If passed multiple times, processes matching any state are included.\n\
                Choices: running sleeping uninterruptible-sleep waiting stopped zombie"
    )]
    states: Vec<State>,

    #[structopt(
        long = "ignore-state",
        raw(number_of_values = "1"),
        help = "Never count processes in these states, even if --state includes them"
    )]
    ignore_states: Vec<State>,

    #[structopt(flatten)]
    common: CommonArgs,
}

/// Which processes count
#[derive(Debug)]
struct Filter {
    pattern: Option<Regex>,
    states: Vec<State>,
    ignore: HashSet<State>,
    skip: Vec<Pid>,
}

impl Filter {
    fn from_args(args: &Args, skip: Vec<Pid>) -> Result<Filter, regex::Error> {
        let pattern = match args.pattern {
            Some(ref p) => Some(Regex::new(p)?),
            None => None,
        };
        Ok(Filter {
            pattern,
            states: args.states.clone(),
            ignore: args.ignore_states.iter().cloned().collect(),
            skip,
        })
    }

    fn matches(&self, process: &Process) -> bool {
        let state = process.stat.state;
        !self.skip.contains(&process.stat.pid)
            && (self.states.is_empty() || self.states.contains(&state))
            && !self.ignore.contains(&state)
            && self
                .pattern
                .as_ref()
                .map_or(true, |re| re.is_match(&process.useful_cmdline()))
    }

    fn describe(&self) -> String {
        let mut description = match self.pattern {
            Some(ref re) => format!("matching '{}'", re.as_str()),
            None => "in total".to_owned(),
        };
        if !self.states.is_empty() {
            let states: Vec<String> = self.states.iter().map(ToString::to_string).collect();
            description.push_str(&format!(" in state {}", states.join(",")));
        }
        description
    }
}

fn evaluate(mut result: CheckResult, running: &RunningProcs, filter: &Filter, common: &CommonArgs) -> CheckResult {
    let thresholds = common.thresholds();
    let matches: Vec<&Process> = running.procs.iter().filter(|p| filter.matches(p)).collect();
    for process in &matches {
        debug!(pid = process.stat.pid.as_raw(), state = %process.stat.state, "{}", process.useful_cmdline());
    }

    let count = matches.len();
    let status = check_threshold(count as f64, &thresholds);
    result.add_message(status, format!("{} {} {}", count, processes(count), filter.describe()));

    if !running.errors.is_empty() {
        for e in &running.errors {
            warn!("unable to read process: {}", e);
        }
        let unread = running.errors.len();
        result.add_message(
            Status::Unknown,
            format!("{} {} could not be read", unread, processes(unread)),
        );
    }

    result.add_perfdata("procs", count as f64, PerfOpts::new().thresholds(&thresholds).min(0.0));
    result
}

fn processes(count: usize) -> &'static str {
    if count == 1 {
        "process"
    } else {
        "processes"
    }
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let args = Args::from_args();
    args.common.init_logging();
    let _watchdog = timeout::arm(SHORT_NAME, args.common.timeout());

    let filter = Filter::from_args(&args, vec![getpid(), getppid()]).unwrap_or_else(|e| {
        plugin_exit(SHORT_NAME, Status::Unknown, format!("invalid process pattern: {}", e))
    });
    let running = RunningProcs::currently_running().unwrap_or_else(|e| {
        plugin_exit(SHORT_NAME, Status::Unknown, format!("unable to list processes: {}", e))
    });

    evaluate(CheckResult::new(SHORT_NAME), &running, &filter, &args.common)
        .finish(&MessageOptions::join_all(", "))
}
